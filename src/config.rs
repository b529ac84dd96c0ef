use crate::error::ConfigError;
use crate::ingest::IngestConfig;
use crate::providers::traits::get_source_info;
use clap::{Args, Parser, Subcommand};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

/// NASDAQ universe tracked by default
pub const DEFAULT_UNIVERSE: &[&str] = &[
    "AAPL", "MSFT", "GOOGL", "AMZN", "TSLA", "NVDA", "META", "NFLX", "INTC", "AMD",
    "CSCO", "ADBE", "PYPL", "CMCSA", "PEP", "COST", "AVGO", "TXN", "QCOM", "SBUX",
    "AMAT", "ISRG", "VRTX", "REGN", "MU", "LRCX", "MDLZ", "BKNG", "GILD", "ADP",
    "TMUS", "FISV", "ILMN", "ADI", "MRNA", "KLAC", "CDNS", "SNPS", "MCHP", "KDP",
    "IDXX", "CTAS", "MAR", "PAYX", "XEL", "ORLY", "PCAR", "DLTR", "WBA", "ROST",
    "EXC", "CSX", "AEP", "ALGN", "BIIB", "EA", "WDAY", "DXCM", "FAST",
];

#[derive(Parser, Debug)]
#[command(name = "marketboard", version, about = "Quote ingestion and dashboard API")]
pub struct Cli {
    #[command(flatten)]
    pub settings: Settings,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Serve the HTTP API and ingest on a schedule
    Serve {
        /// Only serve; leave ingestion to a separate process
        #[arg(long)]
        no_ingest: bool,
    },
    /// Run one ingestion pass and print the report
    Ingest,
}

#[derive(Args, Debug, Clone)]
pub struct Settings {
    #[arg(long, global = true, env = "MARKETBOARD_DB_PATH", default_value = "marketboard.db")]
    pub db_path: PathBuf,

    #[arg(long, global = true, env = "MARKETBOARD_LISTEN", default_value = "127.0.0.1:5000")]
    pub listen: SocketAddr,

    #[arg(long, global = true, env = "MARKETBOARD_PROVIDER", default_value = "yahoo")]
    pub provider: String,

    #[arg(long, global = true, env = "MARKETBOARD_API_KEY", hide_env_values = true)]
    pub api_key: Option<String>,

    /// Comma separated; defaults to the built-in NASDAQ list
    #[arg(long, global = true, env = "MARKETBOARD_SYMBOLS", value_delimiter = ',')]
    pub symbols: Vec<String>,

    #[arg(long, global = true, env = "MARKETBOARD_INTERVAL_SECS", default_value_t = 300)]
    pub interval_secs: u64,

    #[arg(long, global = true, env = "MARKETBOARD_FETCH_TIMEOUT_SECS", default_value_t = 15)]
    pub fetch_timeout_secs: u64,

    #[arg(long, global = true, env = "MARKETBOARD_CONCURRENCY", default_value_t = 4)]
    pub concurrency: usize,

    #[arg(long, global = true, env = "MARKETBOARD_QUERY_LIMIT", default_value_t = 50)]
    pub query_limit: usize,
}

impl Settings {
    pub fn validate(&self) -> Result<(), ConfigError> {
        let info = get_source_info(&self.provider)
            .ok_or_else(|| ConfigError::UnknownProvider(self.provider.clone()))?;
        if info.requires_api_key && self.api_key.as_deref().map_or(true, str::is_empty) {
            return Err(ConfigError::MissingApiKey(self.provider.clone()));
        }
        if self.universe().is_empty() {
            return Err(ConfigError::EmptyUniverse);
        }
        for (name, is_zero) in [
            ("interval-secs", self.interval_secs == 0),
            ("fetch-timeout-secs", self.fetch_timeout_secs == 0),
            ("concurrency", self.concurrency == 0),
            ("query-limit", self.query_limit == 0),
        ] {
            if is_zero {
                return Err(ConfigError::Zero { name });
            }
        }
        Ok(())
    }

    /// Configured symbols, upper-cased and de-duplicated in order.
    pub fn universe(&self) -> Vec<String> {
        let raw: Vec<String> = if self.symbols.is_empty() {
            DEFAULT_UNIVERSE.iter().map(|s| s.to_string()).collect()
        } else {
            self.symbols.clone()
        };
        let mut out: Vec<String> = Vec::with_capacity(raw.len());
        for s in raw {
            let s = s.trim().to_uppercase();
            if !s.is_empty() && !out.contains(&s) {
                out.push(s);
            }
        }
        out
    }

    pub fn ingest_config(&self) -> IngestConfig {
        IngestConfig {
            universe: self.universe(),
            fetch_timeout: Duration::from_secs(self.fetch_timeout_secs),
            concurrency: self.concurrency,
            interval: Duration::from_secs(self.interval_secs),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("marketboard").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn defaults() {
        let cli = parse(&["serve"]);
        assert_eq!(cli.command, Command::Serve { no_ingest: false });
        let s = cli.settings;
        assert_eq!(s.listen.port(), 5000);
        assert_eq!(s.provider, "yahoo");
        assert_eq!(s.query_limit, 50);
        assert_eq!(s.universe().len(), DEFAULT_UNIVERSE.len());
        assert!(s.validate().is_ok());
    }

    #[test]
    fn symbols_are_normalized() {
        let cli = parse(&["ingest", "--symbols", "aapl, msft,AAPL,,tsla"]);
        assert_eq!(cli.command, Command::Ingest);
        assert_eq!(cli.settings.universe(), ["AAPL", "MSFT", "TSLA"]);
        let cfg = cli.settings.ingest_config();
        assert_eq!(cfg.concurrency, 4);
        assert_eq!(cfg.fetch_timeout, Duration::from_secs(15));
    }

    #[test]
    fn finnhub_needs_a_key() {
        let cli = parse(&["ingest", "--provider", "finnhub"]);
        assert!(matches!(cli.settings.validate(), Err(ConfigError::MissingApiKey(_))));
        let cli = parse(&["ingest", "--provider", "finnhub", "--api-key", "abc"]);
        assert!(cli.settings.validate().is_ok());
    }

    #[test]
    fn rejects_unknown_provider_and_zero_values() {
        let cli = parse(&["ingest", "--provider", "binance"]);
        assert!(matches!(cli.settings.validate(), Err(ConfigError::UnknownProvider(_))));
        let cli = parse(&["ingest", "--concurrency", "0"]);
        assert!(matches!(
            cli.settings.validate(),
            Err(ConfigError::Zero { name: "concurrency" })
        ));
        // 2^32 would wrap to zero through a 32-bit cast
        let cli = parse(&["ingest", "--interval-secs", "4294967296"]);
        assert!(cli.settings.validate().is_ok());
        let cli = parse(&["ingest", "--interval-secs", "0"]);
        assert!(matches!(
            cli.settings.validate(),
            Err(ConfigError::Zero { name: "interval-secs" })
        ));
    }
}
