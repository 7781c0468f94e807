//! Asynchronous processing strategy with batch processing
//!
//! Reads notifications in batches and hands each batch to a [`BatchProcessor`],
//! which runs one task per charge. Batches are processed one after another, so
//! notifications about a charge that span batches still run in input order.
//!
//! # Configuration
//!
//! - `batch_size`: notifications per batch (default: 1000)
//! - `max_concurrent_batches`: tokio worker threads (default: CPU cores)

use crate::core::batch_processor::BatchProcessor;
use crate::core::reconciler::Reconciler;
use crate::io::{AsyncReader, CsvLedgerWriter, LedgerSink};
use crate::strategy::{publish_result, ProcessingStrategy};
use crate::types::ReconciliationError;
use std::io::Write;
use std::path::Path;
use std::sync::Arc;
use tokio::io::BufReader;
use tracing::{debug, warn};

#[derive(Clone, Debug)]
pub struct BatchConfig {
    pub batch_size: usize,
    pub max_concurrent_batches: usize,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            batch_size: 1000,
            max_concurrent_batches: num_cpus::get(),
        }
    }
}

impl BatchConfig {
    /// Create a config, replacing zero values with the defaults
    pub fn new(batch_size: usize, max_concurrent_batches: usize) -> Self {
        let default = Self::default();

        let batch_size = if batch_size == 0 {
            warn!(
                batch_size,
                default = default.batch_size,
                "Invalid batch size, using default"
            );
            default.batch_size
        } else {
            batch_size
        };

        let max_concurrent_batches = if max_concurrent_batches == 0 {
            warn!(
                max_concurrent_batches,
                default = default.max_concurrent_batches,
                "Invalid concurrency, using default"
            );
            default.max_concurrent_batches
        } else {
            max_concurrent_batches
        };

        Self {
            batch_size,
            max_concurrent_batches,
        }
    }
}

#[derive(Clone)]
pub struct AsyncProcessingStrategy {
    reconciler: Arc<Reconciler>,
    config: BatchConfig,
}

impl AsyncProcessingStrategy {
    pub fn new(reconciler: Arc<Reconciler>, config: BatchConfig) -> Self {
        Self { reconciler, config }
    }
}

impl ProcessingStrategy for AsyncProcessingStrategy {
    fn process(
        &self,
        input_path: &Path,
        output: &mut dyn Write,
    ) -> Result<(), ReconciliationError> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(self.config.max_concurrent_batches)
            .enable_time()
            .build()?;

        runtime.block_on(async {
            let processor = BatchProcessor::new(Arc::clone(&self.reconciler));

            let file = tokio::fs::File::open(input_path).await.map_err(|e| {
                ReconciliationError::IoError {
                    message: format!("Failed to open file '{}': {}", input_path.display(), e),
                }
            })?;
            let mut reader = AsyncReader::new(BufReader::new(file));
            let mut sink = CsvLedgerWriter::new(output);

            loop {
                let batch = reader.read_batch(self.config.batch_size).await?;
                if batch.is_empty() {
                    break;
                }

                debug!(size = batch.len(), "Processing batch");
                for processed in processor.process_batch(batch).await {
                    publish_result(&mut sink, processed)?;
                }
            }

            sink.flush()
        })
    }
}
