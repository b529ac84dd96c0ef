use crate::error::FetchError;
use crate::providers::Quote;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Fallback for an unknown previous-period volume, keeps the ratio finite.
pub const DEFAULT_PREVIOUS_VOLUME: f64 = 1.0;

/// Latest known quote for one symbol, as persisted in `asset_prices`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuoteSnapshot {
    pub symbol: String,
    pub observed_at: DateTime<Utc>,
    pub current_price: f64,
    pub previous_close_price: f64,
    pub price_change: f64,
    pub volume_current_period: f64,
    pub volume_previous_period: f64,
    pub volume_ratio_pct: f64,
    pub market_time: Option<DateTime<Utc>>,
    pub preferred: bool,
}

impl QuoteSnapshot {
    /// Validates an upstream quote and derives the computed columns.
    ///
    /// A missing or non-positive price or previous close rejects the quote.
    /// `preferred` starts out false; the store never overwrites it on update.
    pub fn from_quote(quote: &Quote, observed_at: DateTime<Utc>) -> Result<Self, FetchError> {
        let current_price = required_price(quote, quote.price, "price")?;
        let previous_close_price = required_price(quote, quote.previous_close, "previous close")?;

        let volume_current_period = quote
            .volume
            .filter(|v| v.is_finite() && *v >= 0.0)
            .unwrap_or(0.0);
        let volume_previous_period = quote
            .previous_volume
            .filter(|v| v.is_finite() && *v > 0.0)
            .unwrap_or(DEFAULT_PREVIOUS_VOLUME);

        Ok(Self {
            symbol: quote.symbol.clone(),
            observed_at,
            current_price,
            previous_close_price,
            price_change: current_price - previous_close_price,
            volume_current_period,
            volume_previous_period,
            volume_ratio_pct: volume_current_period / volume_previous_period * 100.0,
            market_time: quote.time,
            preferred: false,
        })
    }
}

fn required_price(quote: &Quote, value: Option<f64>, field: &'static str) -> Result<f64, FetchError> {
    value
        .filter(|v| v.is_finite() && *v > 0.0)
        .ok_or_else(|| FetchError::MissingField {
            symbol: quote.symbol.clone(),
            field,
        })
}
