use super::traits::*;
use crate::error::FetchError;

const PROVIDER: &str = "finnhub";

pub struct FinnhubSource {
    client: reqwest::Client,
    api_key: Option<String>,
    base_url: String,
}

impl FinnhubSource {
    pub fn new(api_key: Option<String>) -> Self {
        Self {
            client: shared_client(),
            api_key,
            base_url: "https://finnhub.io/api/v1".to_string(),
        }
    }
}

#[async_trait::async_trait]
impl QuoteSource for FinnhubSource {
    fn info(&self) -> SourceInfo {
        get_source_info(PROVIDER).unwrap_or_else(|| SourceInfo {
            id: PROVIDER.to_string(),
            name: "Finnhub".to_string(),
            requires_api_key: true,
        })
    }

    async fn fetch_quote(&self, symbol: &str) -> Result<Quote, FetchError> {
        let api_key = self
            .api_key
            .as_ref()
            .ok_or(FetchError::MissingApiKey { provider: PROVIDER })?;

        let data: serde_json::Value = self
            .client
            .get(format!("{}/quote?symbol={}&token={}", self.base_url, symbol, api_key))
            .send()
            .await
            .map_err(|source| FetchError::Http { provider: PROVIDER, source })?
            .error_for_status()
            .map_err(|source| FetchError::Http { provider: PROVIDER, source })?
            .json()
            .await
            .map_err(|source| FetchError::Http { provider: PROVIDER, source })?;

        parse_finnhub_quote(symbol, &data)
    }
}

/// Finnhub answers unknown symbols with c=0 instead of an error status.
pub(crate) fn parse_finnhub_quote(symbol: &str, data: &serde_json::Value) -> Result<Quote, FetchError> {
    let price = data["c"].as_f64().unwrap_or(0.0);
    if price == 0.0 {
        return Err(FetchError::NotFound {
            provider: PROVIDER,
            symbol: symbol.to_string(),
        });
    }

    // The free quote endpoint carries no volume.
    Ok(QuoteBuilder::new(symbol)
        .price(Some(price))
        .previous_close(data["pc"].as_f64())
        .time_secs(data["t"].as_i64())
        .build())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_quote() {
        let data = json!({ "c": 261.74, "d": 1.2, "dp": 0.46, "h": 263.31, "l": 260.68,
                           "o": 261.07, "pc": 260.54, "t": 1_700_000_000 });
        let q = parse_finnhub_quote("AAPL", &data).unwrap();
        assert_eq!(q.price, Some(261.74));
        assert_eq!(q.previous_close, Some(260.54));
        assert_eq!(q.volume, None);
        assert_eq!(q.time.unwrap().timestamp(), 1_700_000_000);
    }

    #[test]
    fn zero_price_is_not_found() {
        let data = json!({ "c": 0, "d": null, "dp": null, "h": 0, "l": 0, "o": 0, "pc": 0, "t": 0 });
        assert!(matches!(
            parse_finnhub_quote("ZZZZ", &data),
            Err(FetchError::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn missing_key_fails_without_network() {
        let source = FinnhubSource::new(None);
        let err = source.fetch_quote("AAPL").await.unwrap_err();
        assert!(matches!(err, FetchError::MissingApiKey { .. }));
    }
}
