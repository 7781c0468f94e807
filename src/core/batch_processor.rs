//! Batch processing with charge-based partitioning
//!
//! This module provides the `BatchProcessor` struct, which handles notifications
//! concurrently while keeping every notification about one charge in order.
//!
//! # Design
//!
//! A batch is partitioned by correlation key (the charge id, see
//! [`correlation_key`]). Each partition runs in its own tokio task and handles
//! its events sequentially, so a dispute withdrawal is always handled before a
//! later reinstatement of the same dispute within a batch.
//!
//! # Architecture
//!
//! ```text
//! BatchProcessor
//!     └── Arc<Reconciler>  (shared, holds the processor client and event store)
//! ```

use std::collections::HashMap;
use std::sync::Arc;

use crate::core::event_classifier::correlation_key;
use crate::core::reconciler::{Outcome, Reconciler};
use crate::processor::payload::ProcessorEvent;
use crate::types::ReconciliationError;
use futures::future::join_all;
use tracing::error;

/// A notification tagged with its position in the input stream
pub type PositionedEvent = (usize, ProcessorEvent);

/// Result of handling a single notification
#[derive(Debug)]
pub struct ProcessingResult {
    /// Position of the notification in the input stream
    pub position: usize,

    pub event_id: String,

    pub result: Result<Outcome, ReconciliationError>,
}

/// Batch processor with charge-based partitioning
#[derive(Clone)]
pub struct BatchProcessor {
    reconciler: Arc<Reconciler>,
}

impl BatchProcessor {
    pub fn new(reconciler: Arc<Reconciler>) -> Self {
        Self { reconciler }
    }

    /// Partition a batch of notifications by correlation key
    ///
    /// # Guarantees
    ///
    /// - Each notification appears in exactly one partition
    /// - Notifications in a partition keep their original order
    pub fn partition_by_charge(
        &self,
        batch: Vec<PositionedEvent>,
    ) -> HashMap<String, Vec<PositionedEvent>> {
        let mut partitions: HashMap<String, Vec<PositionedEvent>> = HashMap::new();

        for (position, event) in batch {
            partitions
                .entry(correlation_key(&event))
                .or_default()
                .push((position, event));
        }

        partitions
    }

    /// Handle one partition's notifications in order
    ///
    /// A failed notification is reported in its result and does not stop the
    /// rest of the partition.
    pub async fn process_partition(&self, events: Vec<PositionedEvent>) -> Vec<ProcessingResult> {
        let mut results = Vec::with_capacity(events.len());

        for (position, event) in events {
            let result = self.reconciler.handle(&event).await;
            results.push(ProcessingResult {
                position,
                event_id: event.id,
                result,
            });
        }

        results
    }

    /// Handle a batch, one tokio task per partition
    ///
    /// # Returns
    ///
    /// One result per notification, sorted by input position.
    pub async fn process_batch(&self, batch: Vec<PositionedEvent>) -> Vec<ProcessingResult> {
        let partitions = self.partition_by_charge(batch);

        let mut tasks = Vec::with_capacity(partitions.len());
        for (_charge, events) in partitions {
            let processor = self.clone();
            tasks.push(tokio::spawn(async move {
                processor.process_partition(events).await
            }));
        }

        let mut results = Vec::new();
        for joined in join_all(tasks).await {
            match joined {
                Ok(partition_results) => results.extend(partition_results),
                Err(e) => error!(error = %e, "Partition task panicked"),
            }
        }

        results.sort_by_key(|result| result.position);
        results
    }
}
