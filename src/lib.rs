pub mod api_server;
pub mod clock;
pub mod config;
pub mod db;
pub mod error;
pub mod freshness;
pub mod ingest;
pub mod providers;
pub mod snapshot;
pub mod store;

use api_server::{start_api_server, AppState};
use clock::SystemClock;
use config::{Cli, Command, Settings};
use error::ConfigError;
use ingest::{IngestionJob, Scheduler};
use providers::create_source;
use std::sync::Arc;
use store::{SnapshotStore, SqliteStore};
use tracing::info;

fn build_job(settings: &Settings, store: Arc<dyn SnapshotStore>) -> Result<IngestionJob, ConfigError> {
    let source = create_source(&settings.provider, settings.api_key.clone())
        .ok_or_else(|| ConfigError::UnknownProvider(settings.provider.clone()))?;
    let config = settings.ingest_config();
    info!(
        provider = %source.info().name,
        symbols = config.universe.len(),
        concurrency = config.concurrency,
        interval_secs = config.interval.as_secs(),
        "ingestion configured"
    );
    Ok(IngestionJob::new(config, source, store, Arc::new(SystemClock)))
}

pub async fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    let settings = cli.settings;
    settings.validate()?;

    let store = Arc::new(SqliteStore::open(&settings.db_path)?);
    info!(path = %store.db_path().display(), "database ready");

    match cli.command {
        Command::Ingest => {
            let job = build_job(&settings, store)?;
            let report = job.run_once().await?;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        Command::Serve { no_ingest } => {
            let scheduler = Scheduler::new();
            let last_run = if no_ingest {
                None
            } else {
                let job = Arc::new(build_job(&settings, store.clone())?);
                scheduler.start(job);
                Some(scheduler.last_run.clone())
            };

            let state = Arc::new(AppState {
                store,
                clock: Arc::new(SystemClock),
                query_limit: settings.query_limit,
                last_run,
            });

            let shutdown = async move {
                let _ = tokio::signal::ctrl_c().await;
                info!("shutdown requested");
                scheduler.stop();
            };
            start_api_server(state, settings.listen, shutdown).await?;
        }
    }
    Ok(())
}
