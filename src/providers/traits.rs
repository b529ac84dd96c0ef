use crate::error::FetchError;
use chrono::{DateTime, Utc};
use std::sync::OnceLock;

/// Global shared reqwest::Client so every source reuses one connection pool
static SHARED_CLIENT: OnceLock<reqwest::Client> = OnceLock::new();

/// Upstream per-request timeout. The ingestion job applies its own bound on top.
pub const HTTP_TIMEOUT_SECS: u64 = 15;

/// Point-in-time quote as reported upstream. Any field may be missing.
#[derive(Debug, Clone, PartialEq)]
pub struct Quote {
    pub symbol: String,
    pub price: Option<f64>,
    pub previous_close: Option<f64>,
    pub volume: Option<f64>,
    pub previous_volume: Option<f64>,
    pub time: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone)]
pub struct SourceInfo {
    pub id: String,
    pub name: String,
    pub requires_api_key: bool,
}

#[async_trait::async_trait]
pub trait QuoteSource: Send + Sync {
    fn info(&self) -> SourceInfo;
    async fn fetch_quote(&self, symbol: &str) -> Result<Quote, FetchError>;
}

/// Shared HTTP client
pub fn shared_client() -> reqwest::Client {
    SHARED_CLIENT
        .get_or_init(|| {
            reqwest::Client::builder()
                .timeout(std::time::Duration::from_secs(HTTP_TIMEOUT_SECS))
                .user_agent("MarketBoard/1.0")
                .pool_max_idle_per_host(10)
                .build()
                .unwrap_or_default()
        })
        .clone()
}

/// Helper to build a Quote field by field
pub struct QuoteBuilder {
    quote: Quote,
}

impl QuoteBuilder {
    pub fn new(symbol: &str) -> Self {
        Self {
            quote: Quote {
                symbol: symbol.to_string(),
                price: None,
                previous_close: None,
                volume: None,
                previous_volume: None,
                time: None,
            },
        }
    }

    pub fn price(mut self, v: Option<f64>) -> Self { self.quote.price = v; self }
    pub fn previous_close(mut self, v: Option<f64>) -> Self { self.quote.previous_close = v; self }
    pub fn volume(mut self, v: Option<f64>) -> Self { self.quote.volume = v; self }
    pub fn previous_volume(mut self, v: Option<f64>) -> Self { self.quote.previous_volume = v; self }

    /// Unix seconds; zero or out-of-range values are dropped
    pub fn time_secs(mut self, v: Option<i64>) -> Self {
        self.quote.time = v
            .filter(|t| *t > 0)
            .and_then(|t| DateTime::from_timestamp(t, 0));
        self
    }

    pub fn build(self) -> Quote {
        self.quote
    }
}

pub fn all_source_info() -> Vec<SourceInfo> {
    vec![
        si("yahoo", "Yahoo Finance", false),
        si("finnhub", "Finnhub", true),
    ]
}

pub fn get_source_info(id: &str) -> Option<SourceInfo> {
    all_source_info().into_iter().find(|s| s.id == id)
}

fn si(id: &str, name: &str, key: bool) -> SourceInfo {
    SourceInfo {
        id: id.to_string(),
        name: name.to_string(),
        requires_api_key: key,
    }
}
