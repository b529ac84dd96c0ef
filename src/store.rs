use crate::db;
use crate::error::StoreError;
use crate::snapshot::QuoteSnapshot;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::{Path, PathBuf};

/// Persistence for the latest snapshot per symbol.
#[async_trait::async_trait]
pub trait SnapshotStore: Send + Sync {
    /// Insert, or update every quote column of an existing row. `preferred` is never touched.
    async fn upsert(&self, snapshot: &QuoteSnapshot) -> Result<(), StoreError>;
    /// Up to `limit` rows, newest `observed_at` first, ties by symbol.
    async fn latest(&self, limit: usize) -> Result<Vec<QuoteSnapshot>, StoreError>;
    async fn get(&self, symbol: &str) -> Result<Option<QuoteSnapshot>, StoreError>;
    /// Returns false when the symbol has no row.
    async fn set_preferred(&self, symbol: &str, preferred: bool) -> Result<bool, StoreError>;
    async fn count(&self) -> Result<u64, StoreError>;
}

const UPSERT_SQL: &str = "
INSERT INTO asset_prices (
    symbol, observed_at, current_price, previous_close_price, price_change,
    volume_current_period, volume_previous_period, volume_ratio_pct, market_time, preferred
) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, 0)
ON CONFLICT (symbol) DO UPDATE SET
    observed_at            = excluded.observed_at,
    current_price          = excluded.current_price,
    previous_close_price   = excluded.previous_close_price,
    price_change           = excluded.price_change,
    volume_current_period  = excluded.volume_current_period,
    volume_previous_period = excluded.volume_previous_period,
    volume_ratio_pct       = excluded.volume_ratio_pct,
    market_time            = excluded.market_time";

const SELECT_COLUMNS: &str = "SELECT symbol, observed_at, current_price, previous_close_price, price_change,
        volume_current_period, volume_previous_period, volume_ratio_pct, market_time, preferred
 FROM asset_prices";

/// SQLite-backed store. Opens a connection per operation on the blocking pool.
#[derive(Debug, Clone)]
pub struct SqliteStore {
    db_path: PathBuf,
}

impl SqliteStore {
    pub fn open(db_path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let db_path = db_path.into();
        db::ensure_schema(&db_path)?;
        Ok(Self { db_path })
    }

    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    async fn with_conn<T, F>(&self, f: F) -> Result<T, StoreError>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> Result<T, StoreError> + Send + 'static,
    {
        let path = self.db_path.clone();
        tokio::task::spawn_blocking(move || {
            let conn = db::open(&path)?;
            f(&conn)
        })
        .await?
    }
}

#[async_trait::async_trait]
impl SnapshotStore for SqliteStore {
    async fn upsert(&self, snapshot: &QuoteSnapshot) -> Result<(), StoreError> {
        let s = snapshot.clone();
        self.with_conn(move |conn| {
            conn.execute(
                UPSERT_SQL,
                params![
                    s.symbol,
                    s.observed_at.timestamp_millis(),
                    s.current_price,
                    s.previous_close_price,
                    s.price_change,
                    s.volume_current_period,
                    s.volume_previous_period,
                    s.volume_ratio_pct,
                    s.market_time.map(|t| t.timestamp_millis()),
                ],
            )?;
            Ok(())
        })
        .await
    }

    async fn latest(&self, limit: usize) -> Result<Vec<QuoteSnapshot>, StoreError> {
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        self.with_conn(move |conn| {
            let mut stmt = conn.prepare_cached(&format!(
                "{} ORDER BY observed_at DESC, symbol ASC LIMIT ?1",
                SELECT_COLUMNS
            ))?;
            let rows = stmt
                .query_map([limit], row_to_snapshot)?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(rows)
        })
        .await
    }

    async fn get(&self, symbol: &str) -> Result<Option<QuoteSnapshot>, StoreError> {
        let symbol = symbol.to_string();
        self.with_conn(move |conn| {
            let row = conn
                .prepare_cached(&format!("{} WHERE symbol = ?1", SELECT_COLUMNS))?
                .query_row([&symbol], row_to_snapshot)
                .optional()?;
            Ok(row)
        })
        .await
    }

    async fn set_preferred(&self, symbol: &str, preferred: bool) -> Result<bool, StoreError> {
        let symbol = symbol.to_string();
        self.with_conn(move |conn| {
            let changed = conn.execute(
                "UPDATE asset_prices SET preferred = ?1 WHERE symbol = ?2",
                params![preferred, symbol],
            )?;
            Ok(changed > 0)
        })
        .await
    }

    async fn count(&self) -> Result<u64, StoreError> {
        self.with_conn(|conn| {
            let n: i64 = conn.query_row("SELECT COUNT(*) FROM asset_prices", [], |row| row.get(0))?;
            Ok(n.max(0) as u64)
        })
        .await
    }
}

fn millis_to_utc(idx: usize, ms: i64) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::from_timestamp_millis(ms).ok_or(rusqlite::Error::IntegralValueOutOfRange(idx, ms))
}

fn row_to_snapshot(row: &Row<'_>) -> rusqlite::Result<QuoteSnapshot> {
    let market_time = match row.get::<_, Option<i64>>(8)? {
        Some(ms) => Some(millis_to_utc(8, ms)?),
        None => None,
    };
    Ok(QuoteSnapshot {
        symbol: row.get(0)?,
        observed_at: millis_to_utc(1, row.get(1)?)?,
        current_price: row.get(2)?,
        previous_close_price: row.get(3)?,
        price_change: row.get(4)?,
        volume_current_period: row.get(5)?,
        volume_previous_period: row.get(6)?,
        volume_ratio_pct: row.get(7)?,
        market_time,
        preferred: row.get(9)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::traits::QuoteBuilder;
    use chrono::{Duration, TimeZone};

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 2, 14, 30, 0).unwrap()
    }

    fn snapshot(symbol: &str, price: f64, observed_at: DateTime<Utc>) -> QuoteSnapshot {
        let quote = QuoteBuilder::new(symbol)
            .price(Some(price))
            .previous_close(Some(100.0))
            .volume(Some(2_000.0))
            .previous_volume(Some(1_000.0))
            .time_secs(Some(observed_at.timestamp()))
            .build();
        QuoteSnapshot::from_quote(&quote, observed_at).unwrap()
    }

    fn temp_store() -> (tempfile::TempDir, SqliteStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = SqliteStore::open(dir.path().join("test.db")).unwrap();
        (dir, store)
    }

    #[tokio::test]
    async fn upsert_inserts_then_updates_one_row() {
        let (_dir, store) = temp_store();
        store.upsert(&snapshot("AAPL", 110.0, t0())).await.unwrap();
        store
            .upsert(&snapshot("AAPL", 120.0, t0() + Duration::seconds(30)))
            .await
            .unwrap();

        assert_eq!(store.count().await.unwrap(), 1);
        let row = store.get("AAPL").await.unwrap().unwrap();
        assert_eq!(row.current_price, 120.0);
        assert_eq!(row.price_change, 20.0);
        assert_eq!(row.volume_ratio_pct, 200.0);
        assert_eq!(row.observed_at, t0() + Duration::seconds(30));
        assert_eq!(row.market_time, Some(t0() + Duration::seconds(30)));
    }

    #[tokio::test]
    async fn upsert_keeps_curated_preferred_flag() {
        let (_dir, store) = temp_store();
        store.upsert(&snapshot("MSFT", 400.0, t0())).await.unwrap();
        assert!(store.set_preferred("MSFT", true).await.unwrap());

        store
            .upsert(&snapshot("MSFT", 401.0, t0() + Duration::minutes(5)))
            .await
            .unwrap();
        let row = store.get("MSFT").await.unwrap().unwrap();
        assert!(row.preferred);
        assert_eq!(row.current_price, 401.0);
    }

    #[tokio::test]
    async fn set_preferred_on_unknown_symbol_reports_false() {
        let (_dir, store) = temp_store();
        assert!(!store.set_preferred("NOPE", true).await.unwrap());
        assert!(store.get("NOPE").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn latest_orders_by_observed_at_desc_then_symbol() {
        let (_dir, store) = temp_store();
        let t = t0();
        store.upsert(&snapshot("A", 1.0, t - Duration::seconds(3))).await.unwrap();
        store.upsert(&snapshot("B", 1.0, t - Duration::seconds(1))).await.unwrap();
        store.upsert(&snapshot("C", 1.0, t - Duration::seconds(2))).await.unwrap();
        store.upsert(&snapshot("D", 1.0, t - Duration::seconds(2))).await.unwrap();

        let symbols: Vec<String> = store
            .latest(50)
            .await
            .unwrap()
            .into_iter()
            .map(|s| s.symbol)
            .collect();
        assert_eq!(symbols, ["B", "C", "D", "A"]);
    }

    #[tokio::test]
    async fn latest_respects_limit() {
        let (_dir, store) = temp_store();
        for i in 0..60 {
            let s = snapshot(&format!("S{:02}", i), 10.0, t0() + Duration::seconds(i));
            store.upsert(&s).await.unwrap();
        }
        let rows = store.latest(50).await.unwrap();
        assert_eq!(rows.len(), 50);
        assert_eq!(rows[0].symbol, "S59");
        assert_eq!(rows[49].symbol, "S10");
    }
}
