pub mod traits;
pub mod finnhub;
pub mod yahoo;

pub use traits::{all_source_info, Quote, QuoteSource, SourceInfo};

use std::sync::Arc;

pub fn create_source(provider_id: &str, api_key: Option<String>) -> Option<Arc<dyn QuoteSource>> {
    match provider_id {
        "yahoo" => Some(Arc::new(yahoo::YahooSource::new())),
        "finnhub" => Some(Arc::new(finnhub::FinnhubSource::new(api_key))),
        _ => None,
    }
}
