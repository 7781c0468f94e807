//! Funds Flow Engine CLI
//!
//! Reconciles a file of processor notifications against a processor snapshot
//! and writes the resulting ledger events to stdout as CSV.
//!
//! # Usage
//!
//! ```bash
//! cargo run -- --snapshot sandbox.json events.jsonl > ledger.csv
//! cargo run -- --strategy sync --snapshot sandbox.json events.jsonl > ledger.csv
//! cargo run -- --config settings.toml --batch-size 500 --max-concurrent 8 events.jsonl
//! ```
//!
//! Logs go to stderr. The level comes from the `log_level` setting unless
//! `RUST_LOG` is set.
//!
//! # Exit Codes
//!
//! - 0: Success
//! - 1: Error (bad settings, unreadable snapshot or input, unwritable output)

use funds_flow_engine::cli;
use funds_flow_engine::core::{EventStore, Reconciler};
use funds_flow_engine::processor::{SandboxProcessor, SandboxSnapshot};
use funds_flow_engine::settings::ReconcilerSettings;
use funds_flow_engine::strategy;
use funds_flow_engine::ReconciliationError;
use std::process;
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

fn init_tracing(default_level: &str) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn run(args: cli::CliArgs, settings: ReconcilerSettings) -> Result<(), ReconciliationError> {
    let sandbox = match &args.snapshot {
        Some(path) => SandboxProcessor::load(path)?,
        None => SandboxProcessor::from_snapshot(SandboxSnapshot::default()),
    };
    let sandbox = Arc::new(sandbox);

    info!(
        processor_id = %settings.processor_id,
        strategy = ?args.strategy,
        input = %args.input_file.display(),
        "Starting reconciliation"
    );

    let reconciler = Arc::new(Reconciler::new(
        settings,
        sandbox.clone(),
        sandbox,
        Arc::new(EventStore::new()),
    ));

    let config = matches!(args.strategy, cli::StrategyType::Async).then(|| args.to_batch_config());
    let strategy = strategy::create_strategy(args.strategy.clone(), reconciler, config);

    let mut output = std::io::stdout().lock();
    strategy.process(&args.input_file, &mut output)
}

fn main() {
    let args = cli::parse_args();

    let settings = match ReconcilerSettings::load(args.config.as_deref()) {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("Error: {}", e);
            process::exit(1);
        }
    };
    init_tracing(&settings.log_level);

    if let Err(e) = run(args, settings) {
        error!(error = %e, "Reconciliation failed");
        process::exit(1);
    }
}
