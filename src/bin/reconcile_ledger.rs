//! Operator command that recomputes every campaign's collected amount.
//!
//! Takes no arguments. Connection and run settings come from the
//! environment (see `donation_ledger::config`). Exit status is 0 on success,
//! 1 on any failure and 2 when an audit run finds drift.

use std::process::ExitCode;

use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use donation_ledger::storage::{MySqlStorage, SqliteStorage};
use donation_ledger::{
    exit_code, run_once, ConsoleReporter, DatabaseBackend, LedgerConfig, LedgerResult,
    LedgerStorage, RunOutcome,
};

fn init_tracing(filter: &str) {
    tracing_subscriber::registry()
        .with(EnvFilter::try_new(filter).unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

async fn run(config: &LedgerConfig) -> LedgerResult<RunOutcome> {
    let options = config.reconcile.options();
    let db = &config.database;
    let mut reporter = ConsoleReporter::stdout();
    info!(database = %db.display_target(), "connecting to ledger database");

    match db.backend()? {
        DatabaseBackend::MySql => {
            let storage = MySqlStorage::connect(db).await?;
            run_once(storage, &options, &mut reporter).await
        }
        DatabaseBackend::Sqlite => {
            let url = db.url.as_deref().unwrap_or_default();
            let storage = SqliteStorage::connect(url, db.connection_limit).await?;
            if let Err(e) = storage.init_schema().await {
                storage.close().await;
                return Err(e);
            }
            run_once(storage, &options, &mut reporter).await
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    // A missing .env file is fine; the defaults cover local development.
    let _ = dotenvy::dotenv();

    let config = match LedgerConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            init_tracing("info");
            error!(error = %e, "invalid configuration");
            return ExitCode::FAILURE;
        }
    };
    init_tracing(&config.log_filter);

    let result = run(&config).await;
    match &result {
        Ok(RunOutcome::Completed) => {}
        Ok(RunOutcome::DriftFound) => warn!("audit found drifted campaign totals"),
        Err(e) => error!(error = %e, "ledger reconciliation failed"),
    }
    ExitCode::from(exit_code(&result))
}
