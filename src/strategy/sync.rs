//! Synchronous processing strategy
//!
//! Handles notifications one at a time in file order on a single-threaded
//! runtime. Memory use stays constant in the input size apart from the
//! reconciliation state kept in the event store.

use crate::core::batch_processor::ProcessingResult;
use crate::core::reconciler::Reconciler;
use crate::io::{CsvLedgerWriter, LedgerSink, SyncReader};
use crate::strategy::{publish_result, ProcessingStrategy};
use crate::types::ReconciliationError;
use std::io::Write;
use std::path::Path;
use std::sync::Arc;
use tracing::warn;

/// Sequential processing strategy
///
/// # Examples
///
/// ```no_run
/// use funds_flow_engine::core::{EventStore, Reconciler};
/// use funds_flow_engine::processor::{SandboxProcessor, SandboxSnapshot};
/// use funds_flow_engine::settings::ReconcilerSettings;
/// use funds_flow_engine::strategy::{ProcessingStrategy, SyncProcessingStrategy};
/// use std::path::Path;
/// use std::sync::Arc;
///
/// let sandbox = Arc::new(SandboxProcessor::from_snapshot(SandboxSnapshot::default()));
/// let reconciler = Reconciler::new(
///     ReconcilerSettings::default(),
///     sandbox.clone(),
///     sandbox,
///     Arc::new(EventStore::new()),
/// );
/// let strategy = SyncProcessingStrategy::new(Arc::new(reconciler));
///
/// strategy
///     .process(Path::new("events.jsonl"), &mut std::io::stdout())
///     .expect("Processing failed");
/// ```
#[derive(Clone)]
pub struct SyncProcessingStrategy {
    reconciler: Arc<Reconciler>,
}

impl SyncProcessingStrategy {
    pub fn new(reconciler: Arc<Reconciler>) -> Self {
        Self { reconciler }
    }
}

impl ProcessingStrategy for SyncProcessingStrategy {
    fn process(
        &self,
        input_path: &Path,
        output: &mut dyn Write,
    ) -> Result<(), ReconciliationError> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_time()
            .build()?;

        let reader = SyncReader::new(input_path)?;
        let mut sink = CsvLedgerWriter::new(output);

        for record in reader {
            let (position, event) = match record {
                Ok(positioned) => positioned,
                Err(e) => {
                    warn!(error = %e, "Skipping malformed notification");
                    continue;
                }
            };

            let result = runtime.block_on(self.reconciler.handle(&event));
            publish_result(
                &mut sink,
                ProcessingResult {
                    position,
                    event_id: event.id,
                    result,
                },
            )?;
        }

        sink.flush()
    }
}
