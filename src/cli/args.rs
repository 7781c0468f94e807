//! Command-line arguments

use crate::strategy::BatchConfig;
use clap::{Parser, ValueEnum};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "funds-flow-engine")]
#[command(
    about = "Reconcile card processor notifications into ledger events",
    long_about = None
)]
pub struct CliArgs {
    #[arg(value_name = "INPUT", help = "Path to the JSON-lines notification file")]
    pub input_file: PathBuf,

    #[arg(
        long = "snapshot",
        value_name = "FILE",
        help = "Processor snapshot (JSON) backing the sandbox processor"
    )]
    pub snapshot: Option<PathBuf>,

    #[arg(
        long = "config",
        value_name = "FILE",
        help = "Settings file (TOML); FUNDS_FLOW__* variables override it"
    )]
    pub config: Option<PathBuf>,

    #[arg(
        long = "strategy",
        value_name = "STRATEGY",
        default_value = "async",
        help = "Processing strategy: 'sync' for sequential or 'async' for charge-partitioned batches"
    )]
    pub strategy: StrategyType,

    #[arg(
        long = "batch-size",
        value_name = "SIZE",
        help = "Number of notifications per batch (default: 1000)"
    )]
    pub batch_size: Option<usize>,

    #[arg(
        long = "max-concurrent",
        value_name = "COUNT",
        help = "Worker threads for the async strategy (default: CPU cores)"
    )]
    pub max_concurrent_batches: Option<usize>,
}

#[derive(Clone, Debug, PartialEq, Eq, ValueEnum)]
pub enum StrategyType {
    Sync,
    Async,
}

impl CliArgs {
    /// Batch settings for the async strategy; unset or zero flags fall back to defaults
    pub fn to_batch_config(&self) -> BatchConfig {
        let default = BatchConfig::default();
        match (self.batch_size, self.max_concurrent_batches) {
            (None, None) => default,
            (batch_size, max_concurrent) => BatchConfig::new(
                batch_size.unwrap_or(default.batch_size),
                max_concurrent.unwrap_or(default.max_concurrent_batches),
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case::default_strategy(&["program", "events.jsonl"], StrategyType::Async)]
    #[case::explicit_sync(&["program", "--strategy", "sync", "events.jsonl"], StrategyType::Sync)]
    #[case::explicit_async(&["program", "--strategy", "async", "events.jsonl"], StrategyType::Async)]
    fn test_strategy_parsing(#[case] args: &[&str], #[case] expected: StrategyType) {
        let parsed = CliArgs::try_parse_from(args).unwrap();
        assert_eq!(parsed.strategy, expected);
    }

    #[test]
    fn test_file_options() {
        let parsed = CliArgs::try_parse_from([
            "program",
            "--snapshot",
            "sandbox.json",
            "--config",
            "settings.toml",
            "events.jsonl",
        ])
        .unwrap();

        assert_eq!(parsed.input_file, PathBuf::from("events.jsonl"));
        assert_eq!(parsed.snapshot, Some(PathBuf::from("sandbox.json")));
        assert_eq!(parsed.config, Some(PathBuf::from("settings.toml")));
    }

    #[rstest]
    #[case::all_defaults(&["program", "events.jsonl"], 1000, num_cpus::get())]
    #[case::custom_batch_size(&["program", "--batch-size", "2000", "events.jsonl"], 2000, num_cpus::get())]
    #[case::custom_max_concurrent(&["program", "--max-concurrent", "8", "events.jsonl"], 1000, 8)]
    #[case::zero_batch_size(&["program", "--batch-size", "0", "events.jsonl"], 1000, num_cpus::get())]
    fn test_batch_config_conversion(
        #[case] args: &[&str],
        #[case] expected_batch_size: usize,
        #[case] expected_max_concurrent: usize,
    ) {
        let config = CliArgs::try_parse_from(args).unwrap().to_batch_config();

        assert_eq!(config.batch_size, expected_batch_size);
        assert_eq!(config.max_concurrent_batches, expected_max_concurrent);
    }

    #[rstest]
    #[case::missing_input(&["program"])]
    #[case::invalid_strategy(&["program", "--strategy", "invalid", "events.jsonl"])]
    fn test_parsing_errors(#[case] args: &[&str]) {
        assert!(CliArgs::try_parse_from(args).is_err());
    }
}
