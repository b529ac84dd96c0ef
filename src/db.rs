use crate::error::StoreError;
use rusqlite::Connection;
use std::path::Path;
use std::time::Duration;

/// MarketBoard DB schema. Timestamps are epoch milliseconds.
pub const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS asset_prices (
    symbol                 TEXT PRIMARY KEY,
    observed_at            INTEGER NOT NULL,
    current_price          REAL NOT NULL,
    previous_close_price   REAL NOT NULL,
    price_change           REAL NOT NULL,
    volume_current_period  REAL NOT NULL DEFAULT 0,
    volume_previous_period REAL NOT NULL DEFAULT 1,
    volume_ratio_pct       REAL NOT NULL,
    market_time            INTEGER,
    preferred              INTEGER NOT NULL DEFAULT 0
);

CREATE INDEX IF NOT EXISTS idx_asset_prices_recent
    ON asset_prices (observed_at DESC, symbol);
"#;

/// Overlapping ingestion runs wait on each other's write lock instead of failing.
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

pub fn open(db_path: &Path) -> Result<Connection, StoreError> {
    let conn = Connection::open(db_path).map_err(StoreError::Connection)?;
    conn.busy_timeout(BUSY_TIMEOUT).map_err(StoreError::Connection)?;
    Ok(conn)
}

/// Creates the parent directory, the database file and the schema if missing.
pub fn ensure_schema(db_path: &Path) -> Result<(), StoreError> {
    if let Some(parent) = db_path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    let conn = open(db_path)?;
    conn.execute_batch(SCHEMA)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn schema_is_idempotent_and_creates_parent_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("marketboard.db");
        ensure_schema(&path).unwrap();
        ensure_schema(&path).unwrap();
        let conn = open(&path).unwrap();
        let n: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = 'asset_prices'",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(n, 1);
    }

    #[test]
    fn parent_that_is_a_file_reports_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("not_a_dir");
        std::fs::write(&blocker, b"x").unwrap();

        let err = ensure_schema(&blocker.join("marketboard.db")).unwrap_err();
        assert!(matches!(err, StoreError::Io(_)), "got {err:?}");
        assert!(err.to_string().contains("database directory unavailable"));
    }

    #[test]
    fn unopenable_path_is_a_connection_error() {
        let dir = tempfile::tempdir().unwrap();
        // A directory cannot be opened as a database file
        let err = ensure_schema(dir.path()).unwrap_err();
        assert!(err.is_connection() || matches!(err, StoreError::Query(_)));
    }
}
