//! Thread-safe reconciliation state
//!
//! This module provides the `EventStore` struct, which records everything the
//! reconciler needs to stay idempotent under redelivery and reordering:
//!
//! - the outcome of every processed event, keyed by processor event id
//! - transfer reversals issued for dispute withdrawals, keyed by dispute id
//! - compensating transfers issued for dispute reinstatements, keyed by dispute id
//! - the `created` timestamp of the latest applied update per refund
//!
//! # Thread Safety
//!
//! The store uses `DashMap` for fine-grained locking. Workers handling different
//! charges touch different keys and do not block each other; work on the same
//! charge is serialized by the batch processor before it reaches the store.

use crate::processor::payload::{Transfer, TransferReversal};
use crate::types::{DiscardReason, LedgerEvent};
use chrono::{DateTime, Utc};
use dashmap::DashMap;

/// Final outcome recorded for a processor event id
#[derive(Debug, Clone, PartialEq)]
pub enum ProcessedEvent {
    Published(LedgerEvent),
    Discarded(DiscardReason),
}

/// Thread-safe reconciliation state shared by all workers
#[derive(Debug, Default)]
pub struct EventStore {
    processed: DashMap<String, ProcessedEvent>,
    transfer_reversals: DashMap<String, TransferReversal>,
    compensating_transfers: DashMap<String, Transfer>,
    refund_updates: DashMap<String, DateTime<Utc>>,
}

impl EventStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up the outcome of an already processed event
    ///
    /// # Arguments
    ///
    /// * `event_id` - Processor event id
    ///
    /// # Returns
    ///
    /// * `Some(ProcessedEvent)` - If the event was processed before
    /// * `None` - If the event is new (or its processing failed)
    pub fn processed(&self, event_id: &str) -> Option<ProcessedEvent> {
        self.processed
            .get(event_id)
            .map(|entry| entry.value().clone())
    }

    /// Record the outcome of an event (first outcome wins)
    ///
    /// Only called once processing succeeded, so a failed or timed-out event
    /// stays eligible for redelivery.
    ///
    /// # Returns
    ///
    /// The outcome stored for the event, which is the earlier one if two
    /// workers raced on the same event id.
    pub fn mark_processed(&self, event_id: &str, outcome: ProcessedEvent) -> ProcessedEvent {
        self.processed
            .entry(event_id.to_string())
            .or_insert(outcome)
            .value()
            .clone()
    }

    pub fn transfer_reversal(&self, dispute_id: &str) -> Option<TransferReversal> {
        self.transfer_reversals
            .get(dispute_id)
            .map(|entry| entry.value().clone())
    }

    /// Record the reversal issued for a dispute withdrawal (first one wins)
    pub fn record_transfer_reversal(&self, dispute_id: &str, reversal: TransferReversal) {
        self.transfer_reversals
            .entry(dispute_id.to_string())
            .or_insert(reversal);
    }

    pub fn compensating_transfer(&self, dispute_id: &str) -> Option<Transfer> {
        self.compensating_transfers
            .get(dispute_id)
            .map(|entry| entry.value().clone())
    }

    /// Record the transfer issued for a dispute reinstatement (first one wins)
    pub fn record_compensating_transfer(&self, dispute_id: &str, transfer: Transfer) {
        self.compensating_transfers
            .entry(dispute_id.to_string())
            .or_insert(transfer);
    }

    /// Apply a refund update unless a newer one was already applied
    ///
    /// Refund updates are last-write-wins on the event's `created` timestamp.
    /// An update as old as the latest applied one is accepted.
    ///
    /// # Arguments
    ///
    /// * `refund_id` - Processor refund id
    /// * `created_at` - Creation time of the notification carrying the update
    ///
    /// # Returns
    ///
    /// * `true` - The update is current and was recorded
    /// * `false` - A newer update was already applied; this one is stale
    pub fn apply_refund_update(&self, refund_id: &str, created_at: DateTime<Utc>) -> bool {
        let mut latest = self
            .refund_updates
            .entry(refund_id.to_string())
            .or_insert(created_at);
        if *latest > created_at {
            return false;
        }
        *latest = created_at;
        true
    }
}
