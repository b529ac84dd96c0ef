use thiserror::Error;

/// Per-symbol upstream failure. Never aborts a batch.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("{provider} connection failed: {source}")]
    Http {
        provider: &'static str,
        #[source]
        source: reqwest::Error,
    },
    #[error("{provider} returned an unexpected payload: {reason}")]
    Payload { provider: &'static str, reason: String },
    #[error("{provider} has no quote for {symbol}")]
    NotFound { provider: &'static str, symbol: String },
    #[error("quote for {symbol} is missing {field}")]
    MissingField { symbol: String, field: &'static str },
    #[error("{provider} requires an API key")]
    MissingApiKey { provider: &'static str },
    #[error("fetch for {symbol} timed out after {secs}s")]
    Timeout { symbol: String, secs: u64 },
}

#[derive(Debug, Error)]
pub enum StoreError {
    /// The database could not be opened. Aborts the rest of an ingestion run.
    #[error("database connection failed: {0}")]
    Connection(#[source] rusqlite::Error),
    #[error("database query failed: {0}")]
    Query(#[from] rusqlite::Error),
    #[error("blocking task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
    #[error("database directory unavailable: {0}")]
    Io(#[from] std::io::Error),
}

impl StoreError {
    pub fn is_connection(&self) -> bool {
        matches!(self, StoreError::Connection(_))
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("unknown provider: {0}")]
    UnknownProvider(String),
    #[error("{0} requires --api-key")]
    MissingApiKey(String),
    #[error("symbol universe is empty")]
    EmptyUniverse,
    #[error("{name} must be greater than zero")]
    Zero { name: &'static str },
}
