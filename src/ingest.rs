use crate::clock::Clock;
use crate::error::{FetchError, StoreError};
use crate::providers::{Quote, QuoteSource};
use crate::snapshot::QuoteSnapshot;
use crate::store::SnapshotStore;
use futures::stream::{self, StreamExt};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, RwLock};
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone)]
pub struct IngestConfig {
    pub universe: Vec<String>,
    pub fetch_timeout: Duration,
    /// Max in-flight fetches. 1 keeps the run strictly sequential.
    pub concurrency: usize,
    pub interval: Duration,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct SymbolFailure {
    pub symbol: String,
    pub op: &'static str,
    pub error: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct IngestReport {
    pub attempted: usize,
    pub stored: Vec<String>,
    pub failures: Vec<SymbolFailure>,
}

/// One pass over the universe: fetch, derive, upsert.
pub struct IngestionJob {
    config: IngestConfig,
    source: Arc<dyn QuoteSource>,
    store: Arc<dyn SnapshotStore>,
    clock: Arc<dyn Clock>,
}

impl IngestionJob {
    pub fn new(
        config: IngestConfig,
        source: Arc<dyn QuoteSource>,
        store: Arc<dyn SnapshotStore>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self { config, source, store, clock }
    }

    pub fn config(&self) -> &IngestConfig {
        &self.config
    }

    /// Fetch failures are recorded and skipped. A store connection failure
    /// ends the run with an error; rows written before it stay committed.
    pub async fn run_once(&self) -> Result<IngestReport, StoreError> {
        let mut report = IngestReport {
            attempted: self.config.universe.len(),
            ..Default::default()
        };
        let fetch_timeout = self.config.fetch_timeout;

        let mut fetches = stream::iter(self.config.universe.iter().cloned())
            .map(|symbol| {
                let source = self.source.clone();
                async move {
                    let fetched = fetch_with_timeout(source.as_ref(), &symbol, fetch_timeout).await;
                    (symbol, fetched)
                }
            })
            .buffer_unordered(self.config.concurrency.max(1));

        while let Some((symbol, fetched)) = fetches.next().await {
            let snapshot = match fetched
                .and_then(|quote| QuoteSnapshot::from_quote(&quote, self.clock.now()))
            {
                Ok(s) => s,
                Err(e) => {
                    warn!(symbol = %symbol, op = "fetch", error = %e, "skipping symbol");
                    report.failures.push(SymbolFailure {
                        symbol,
                        op: "fetch",
                        error: e.to_string(),
                    });
                    continue;
                }
            };

            match self.store.upsert(&snapshot).await {
                Ok(()) => {
                    debug!(symbol = %symbol, price = snapshot.current_price, "stored");
                    report.stored.push(symbol);
                }
                Err(e) if e.is_connection() => {
                    error!(symbol = %symbol, op = "upsert", error = %e, "store unavailable, aborting run");
                    return Err(e);
                }
                Err(e) => {
                    warn!(symbol = %symbol, op = "upsert", error = %e, "skipping symbol");
                    report.failures.push(SymbolFailure {
                        symbol,
                        op: "upsert",
                        error: e.to_string(),
                    });
                }
            }
        }

        info!(
            attempted = report.attempted,
            stored = report.stored.len(),
            failed = report.failures.len(),
            "ingestion run finished"
        );
        Ok(report)
    }
}

async fn fetch_with_timeout(
    source: &dyn QuoteSource,
    symbol: &str,
    limit: Duration,
) -> Result<Quote, FetchError> {
    match tokio::time::timeout(limit, source.fetch_quote(symbol)).await {
        Ok(result) => result,
        Err(_) => Err(FetchError::Timeout {
            symbol: symbol.to_string(),
            secs: limit.as_secs(),
        }),
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RunTick {
    pub finished_at: i64,
    pub stored: usize,
    pub failed: usize,
    pub error: Option<String>,
}

/// Runs the job every `interval` until stopped.
#[derive(Clone)]
pub struct Scheduler {
    pub last_run: Arc<RwLock<Option<RunTick>>>,
    stop_tx: watch::Sender<bool>,
}

impl Scheduler {
    pub fn new() -> Self {
        let (stop_tx, _) = watch::channel(false);
        Self {
            last_run: Arc::new(RwLock::new(None)),
            stop_tx,
        }
    }

    /// Sticky: a scheduler stopped before `start` never runs the job.
    pub fn stop(&self) {
        // `send` drops the value when nobody is subscribed yet
        self.stop_tx.send_replace(true);
    }

    pub fn start(&self, job: Arc<IngestionJob>) -> tokio::task::JoinHandle<()> {
        let last_run = self.last_run.clone();
        let mut stop_rx = self.stop_tx.subscribe();
        let interval = job.config().interval;

        tokio::spawn(async move {
            loop {
                if *stop_rx.borrow_and_update() {
                    break;
                }
                let tick = match job.run_once().await {
                    Ok(report) => RunTick {
                        finished_at: chrono::Utc::now().timestamp_millis(),
                        stored: report.stored.len(),
                        failed: report.failures.len(),
                        error: None,
                    },
                    Err(e) => {
                        // Next cycle retries from scratch
                        error!(error = %e, "ingestion run aborted");
                        RunTick {
                            finished_at: chrono::Utc::now().timestamp_millis(),
                            stored: 0,
                            failed: 0,
                            error: Some(e.to_string()),
                        }
                    }
                };
                *last_run.write().await = Some(tick);

                tokio::select! {
                    _ = tokio::time::sleep(interval) => {},
                    _ = stop_rx.changed() => break,
                }
            }
            info!("scheduler stopped");
        })
    }
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}
