use super::traits::*;
use crate::error::FetchError;
use std::sync::Arc;
use tokio::sync::RwLock;

const PROVIDER: &str = "yahoo";

/// Yahoo Finance now requires cookie + crumb authentication.
/// We fetch a cookie from fc.yahoo.com, then get a crumb, and use both for API calls.
pub struct YahooSource {
    client: reqwest::Client,
    crumb: Arc<RwLock<Option<String>>>,
}

impl YahooSource {
    pub fn new() -> Self {
        // Build client with cookie store enabled
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(HTTP_TIMEOUT_SECS))
            .user_agent("Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36")
            .cookie_store(true)
            .build()
            .unwrap_or_default();
        Self {
            client,
            crumb: Arc::new(RwLock::new(None)),
        }
    }

    async fn get_crumb(&self) -> Result<String, FetchError> {
        if let Some(crumb) = self.crumb.read().await.as_ref() {
            return Ok(crumb.clone());
        }

        // cookie_store keeps what fc.yahoo.com sets
        let _ = self
            .client
            .get("https://fc.yahoo.com")
            .send()
            .await
            .map_err(http_err)?;

        let crumb = self
            .client
            .get("https://query2.finance.yahoo.com/v1/test/getcrumb")
            .send()
            .await
            .map_err(http_err)?
            .text()
            .await
            .map_err(http_err)?;

        if crumb.is_empty() || crumb.contains("<!DOCTYPE") {
            return Err(FetchError::Payload {
                provider: PROVIDER,
                reason: "crumb unavailable".to_string(),
            });
        }

        *self.crumb.write().await = Some(crumb.clone());
        Ok(crumb)
    }

    async fn invalidate_crumb(&self) {
        *self.crumb.write().await = None;
    }

    async fn chart(&self, yahoo_symbol: &str, crumb: &str) -> Result<reqwest::Response, FetchError> {
        // 5d so the previous session's volume is in the series even after a holiday
        let url = format!(
            "https://query2.finance.yahoo.com/v8/finance/chart/{}?interval=1d&range=5d&crumb={}",
            yahoo_symbol, crumb
        );
        self.client.get(&url).send().await.map_err(http_err)
    }
}

impl Default for YahooSource {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl QuoteSource for YahooSource {
    fn info(&self) -> SourceInfo {
        get_source_info(PROVIDER).unwrap_or_else(|| SourceInfo {
            id: PROVIDER.to_string(),
            name: "Yahoo Finance".to_string(),
            requires_api_key: false,
        })
    }

    async fn fetch_quote(&self, symbol: &str) -> Result<Quote, FetchError> {
        // Yahoo uses dash for share classes (BRK-B), convert dot notation (BRK.B)
        let yahoo_symbol = symbol.replace('.', "-");

        let crumb = self.get_crumb().await?;
        let mut resp = self.chart(&yahoo_symbol, &crumb).await?;

        if resp.status() == reqwest::StatusCode::UNAUTHORIZED
            || resp.status() == reqwest::StatusCode::FORBIDDEN
        {
            // Crumb expired; refresh once
            self.invalidate_crumb().await;
            let crumb = self.get_crumb().await?;
            resp = self.chart(&yahoo_symbol, &crumb).await?;
        }

        let data: serde_json::Value = resp
            .error_for_status()
            .map_err(http_err)?
            .json()
            .await
            .map_err(http_err)?;

        parse_yahoo_chart(symbol, &data)
    }
}

fn http_err(source: reqwest::Error) -> FetchError {
    FetchError::Http { provider: PROVIDER, source }
}

pub(crate) fn parse_yahoo_chart(symbol: &str, data: &serde_json::Value) -> Result<Quote, FetchError> {
    let result = &data["chart"]["result"][0];
    if result.is_null() {
        return Err(FetchError::NotFound {
            provider: PROVIDER,
            symbol: symbol.to_string(),
        });
    }
    let meta = &result["meta"];

    // Daily volumes, oldest first. The last bar is the current session.
    // Bars stay positional: a null current bar must not shift earlier sessions.
    let volumes: Vec<Option<f64>> = result["indicators"]["quote"][0]["volume"]
        .as_array()
        .map(|v| v.iter().map(|x| x.as_f64()).collect())
        .unwrap_or_default();
    let (current_bar, earlier) = match volumes.split_last() {
        Some((last, earlier)) => (*last, earlier),
        None => (None, &[][..]),
    };
    let previous_volume = earlier.iter().rev().find_map(|v| *v);
    let volume = meta["regularMarketVolume"].as_f64().or(current_bar);

    Ok(QuoteBuilder::new(symbol)
        .price(meta["regularMarketPrice"].as_f64())
        .previous_close(
            meta["previousClose"]
                .as_f64()
                .or_else(|| meta["chartPreviousClose"].as_f64()),
        )
        .volume(volume)
        .previous_volume(previous_volume)
        .time_secs(meta["regularMarketTime"].as_i64())
        .build())
}
