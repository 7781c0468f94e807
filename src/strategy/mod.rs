//! Processing strategy module
//!
//! Both strategies read JSON-lines notifications, hand them to the shared
//! [`Reconciler`] and write published ledger events as CSV in input order.
//!
//! - `sync`: one notification at a time, in file order
//! - `async`: batches partitioned by charge, processed in parallel across
//!   charges and sequentially within a charge

use crate::cli::StrategyType;
use crate::core::batch_processor::ProcessingResult;
use crate::core::reconciler::{Outcome, Reconciler};
use crate::io::LedgerSink;
use crate::types::ReconciliationError;
use std::io::Write;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, error};

pub mod r#async;
pub mod sync;

pub use self::r#async::{AsyncProcessingStrategy, BatchConfig};
pub use sync::SyncProcessingStrategy;

pub trait ProcessingStrategy: Send + Sync {
    /// Process every notification in `input_path`, writing the ledger to `output`
    ///
    /// # Errors
    ///
    /// Only fatal errors (unreadable input, unwritable output) are returned.
    /// Failures of single notifications are logged and processing continues.
    fn process(&self, input_path: &Path, output: &mut dyn Write)
        -> Result<(), ReconciliationError>;
}

pub fn create_strategy(
    strategy_type: StrategyType,
    reconciler: Arc<Reconciler>,
    config: Option<BatchConfig>,
) -> Box<dyn ProcessingStrategy> {
    match strategy_type {
        StrategyType::Sync => Box::new(SyncProcessingStrategy::new(reconciler)),
        StrategyType::Async => {
            let config = config.unwrap_or_default();
            Box::new(AsyncProcessingStrategy::new(reconciler, config))
        }
    }
}

/// Publish a processed notification if it produced a new ledger event
pub(crate) fn publish_result(
    sink: &mut dyn LedgerSink,
    processed: ProcessingResult,
) -> Result<(), ReconciliationError> {
    let ProcessingResult {
        position,
        event_id,
        result,
    } = processed;

    match result {
        Ok(Outcome::Published(event)) => sink.publish(&event)?,
        Ok(Outcome::Duplicate(_)) => debug!(%event_id, "Skipping redelivered event"),
        Ok(Outcome::Discarded(reason)) => debug!(%event_id, %reason, "Event discarded"),
        Err(e) => error!(%event_id, position, error = %e, "Failed to process notification"),
    }
    Ok(())
}
