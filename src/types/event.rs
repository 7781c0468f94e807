//! Canonical charge events
//!
//! A [`ChargeEvent`] is created once per inbound processor notification by
//! the event classifier, is immutable afterwards, and is published exactly
//! once to the ledger as a [`LedgerEvent`].

use super::flow_of_funds::FlowOfFunds;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Closed set of canonical event types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChargeEventType {
    ChargeSucceeded,
    PaymentIntentFailed,
    DisputeFormalized,
    DisputeFundsWithdrawn,
    DisputeFundsReinstated,
    DisputeWon,
    DisputeLost,
    RefundUpdated,
    Informational,
}

impl fmt::Display for ChargeEventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ChargeEventType::ChargeSucceeded => "charge_succeeded",
            ChargeEventType::PaymentIntentFailed => "payment_intent_failed",
            ChargeEventType::DisputeFormalized => "dispute_formalized",
            ChargeEventType::DisputeFundsWithdrawn => "dispute_funds_withdrawn",
            ChargeEventType::DisputeFundsReinstated => "dispute_funds_reinstated",
            ChargeEventType::DisputeWon => "dispute_won",
            ChargeEventType::DisputeLost => "dispute_lost",
            ChargeEventType::RefundUpdated => "refund_updated",
            ChargeEventType::Informational => "informational",
        };
        write!(f, "{}", name)
    }
}

/// Canonical ledger-facing event
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChargeEvent {
    /// Configured processor id, e.g. `stripe`
    pub processor_id: String,

    /// Processor event id; the idempotency key of the whole pipeline
    pub event_id: String,

    /// Null only for payment-intent failures without a charge
    pub charge_id: Option<String>,

    pub refund_id: Option<String>,

    pub payment_intent_id: Option<String>,

    #[serde(rename = "type")]
    pub event_type: ChargeEventType,

    pub created_at: DateTime<Utc>,

    /// The processor's raw event type
    pub comment: String,

    /// Opaque, ordered key/value details for downstream collaborators
    pub extras: BTreeMap<String, serde_json::Value>,

    pub flow_of_funds: Option<FlowOfFunds>,

    /// Set when the flow of funds could not be computed (`InsufficientData`)
    pub needs_reconciliation: bool,
}

/// What collaborators receive; same shape as [`ChargeEvent`]
pub type LedgerEvent = ChargeEvent;

/// Why a notification produced no event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiscardReason {
    /// `charge.failed`: no charge id is kept upstream
    Unlinkable,
    /// Dispute closed because the charge was already refunded
    ChargeAlreadyRefunded,
    /// Charge not originated on this platform
    ForeignCharge,
    /// Older refund update arriving after a newer one
    StaleRefundUpdate,
    /// Event type the engine does not handle
    UnsupportedEventType,
}

impl fmt::Display for DiscardReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let reason = match self {
            DiscardReason::Unlinkable => "unlinkable",
            DiscardReason::ChargeAlreadyRefunded => "charge_already_refunded",
            DiscardReason::ForeignCharge => "foreign_charge",
            DiscardReason::StaleRefundUpdate => "stale_refund_update",
            DiscardReason::UnsupportedEventType => "unsupported_event_type",
        };
        write!(f, "{}", reason)
    }
}
