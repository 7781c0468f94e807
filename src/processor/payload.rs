//! Typed processor payloads
//!
//! Every object the processor sends or returns is mapped onto one of these
//! structs at the boundary, so no business logic indexes into untyped JSON.
//! Field names follow the processor's wire format.
//!
//! Correlation ids (`id`, `charge`, `created`) are `Option`s on purpose: a
//! payload missing one must be reported as `MissingCorrelationId` by the
//! classifier rather than rejected by serde with a generic message.

use crate::types::{CurrencyCode, ReconciliationError};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A field the processor sends either as an id or as the expanded object
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Expandable<T> {
    Id(String),
    Object(T),
}

impl<T> Expandable<T> {
    /// The expanded object, if the processor inlined it
    pub fn as_object(&self) -> Option<&T> {
        match self {
            Expandable::Id(_) => None,
            Expandable::Object(object) => Some(object),
        }
    }

    /// The referenced id, if the processor sent only an id
    pub fn as_id(&self) -> Option<&str> {
        match self {
            Expandable::Id(id) => Some(id),
            Expandable::Object(_) => None,
        }
    }
}

/// Inbound notification: `{id, type, created, account?, data: {object}}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessorEvent {
    pub id: String,
    #[serde(rename = "type")]
    pub event_type: String,
    pub created: Option<i64>,
    #[serde(default)]
    pub account: Option<String>,
    pub data: EventData,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventData {
    pub object: serde_json::Value,
}

impl ProcessorEvent {
    /// Map `data.object` onto its typed shape
    ///
    /// # Errors
    ///
    /// Returns `MalformedPayload` with the event id when the object does not
    /// match the expected shape.
    pub fn object<T: DeserializeOwned>(&self) -> Result<T, ReconciliationError> {
        T::deserialize(&self.data.object)
            .map_err(|e| ReconciliationError::malformed_payload(&self.id, e))
    }

    /// Read a top-level string field of `data.object` without mapping the whole object
    pub fn object_str(&self, field: &str) -> Option<&str> {
        self.data.object.get(field).and_then(|value| value.as_str())
    }
}

/// Settlement record for a charge, refund, fee or transfer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BalanceTransaction {
    pub id: String,
    pub amount: i64,
    pub currency: CurrencyCode,
    pub net: i64,
    #[serde(default)]
    pub fee: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransferData {
    pub destination: String,
    #[serde(default)]
    pub amount: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApplicationFee {
    pub id: String,
    pub amount: i64,
    pub currency: CurrencyCode,
    /// Connected account the fee was collected from
    #[serde(default)]
    pub account: Option<String>,
    #[serde(default)]
    pub balance_transaction: Option<Expandable<BalanceTransaction>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApplicationFeeRefund {
    pub id: String,
    pub amount: i64,
    pub currency: CurrencyCode,
    #[serde(default)]
    pub balance_transaction: Option<Expandable<BalanceTransaction>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChargeObject {
    pub id: Option<String>,
    pub amount: i64,
    pub currency: CurrencyCode,
    #[serde(default)]
    pub amount_refunded: i64,
    #[serde(default)]
    pub refunded: bool,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub destination: Option<String>,
    #[serde(default)]
    pub on_behalf_of: Option<String>,
    #[serde(default)]
    pub transfer_data: Option<TransferData>,
    /// Legacy fee model: the fee object created alongside the charge
    #[serde(default)]
    pub application_fee: Option<Expandable<ApplicationFee>>,
    #[serde(default)]
    pub application_fee_amount: Option<i64>,
    #[serde(default)]
    pub balance_transaction: Option<Expandable<BalanceTransaction>>,
    /// Transfer to the destination account created by a destination charge
    #[serde(default)]
    pub transfer: Option<String>,
    #[serde(default)]
    pub payment_intent: Option<String>,
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transfer {
    pub id: String,
    pub amount: i64,
    pub currency: CurrencyCode,
    #[serde(default)]
    pub amount_reversed: i64,
    #[serde(default)]
    pub destination: Option<String>,
    /// Payment created on the destination account by this transfer
    #[serde(default)]
    pub destination_payment: Option<String>,
    /// Charge that funded the transfer
    #[serde(default)]
    pub source_transaction: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransferReversal {
    pub id: String,
    pub amount: i64,
    pub currency: CurrencyCode,
    pub transfer: String,
    /// Refund of the destination payment, living on the connected account
    #[serde(default)]
    pub destination_payment_refund: Option<String>,
    /// Fee refund issued together with the reversal
    #[serde(default)]
    pub application_fee_refund: Option<Expandable<ApplicationFeeRefund>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RefundObject {
    pub id: Option<String>,
    pub amount: i64,
    pub currency: CurrencyCode,
    #[serde(default)]
    pub charge: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub reason: Option<String>,
    #[serde(default)]
    pub balance_transaction: Option<Expandable<BalanceTransaction>>,
    #[serde(default)]
    pub application_fee_refund: Option<Expandable<ApplicationFeeRefund>>,
    #[serde(default)]
    pub transfer_reversal: Option<Expandable<TransferReversal>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DisputeObject {
    pub id: Option<String>,
    pub charge: Option<String>,
    pub amount: i64,
    pub currency: CurrencyCode,
    pub status: String,
    #[serde(default)]
    pub reason: Option<String>,
    /// Withdrawal first, reinstatement (if any) last
    #[serde(default)]
    pub balance_transactions: Vec<BalanceTransaction>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentError {
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub decline_code: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub charge: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NextAction {
    #[serde(rename = "type")]
    pub action_type: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentIntentObject {
    pub id: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub latest_charge: Option<String>,
    #[serde(default)]
    pub last_payment_error: Option<PaymentError>,
    #[serde(default)]
    pub next_action: Option<NextAction>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_expandable_accepts_id_and_object() {
        let charge: ChargeObject = serde_json::from_value(json!({
            "id": "ch_1",
            "amount": 1000,
            "currency": "usd",
            "balance_transaction": "txn_1",
            "application_fee": {
                "id": "fee_1",
                "amount": 100,
                "currency": "usd",
                "balance_transaction": {"id": "txn_fee", "amount": 100, "currency": "usd", "net": 100}
            }
        }))
        .unwrap();

        assert_eq!(
            charge.balance_transaction.as_ref().and_then(|bt| bt.as_id()),
            Some("txn_1")
        );
        let fee = charge
            .application_fee
            .as_ref()
            .and_then(|fee| fee.as_object())
            .unwrap();
        assert_eq!(
            fee.balance_transaction
                .as_ref()
                .and_then(|bt| bt.as_object())
                .map(|bt| bt.amount),
            Some(100)
        );
    }

    #[test]
    fn test_event_object_maps_typed_shape() {
        let event: ProcessorEvent = serde_json::from_value(json!({
            "id": "evt_1",
            "type": "charge.dispute.created",
            "created": 1700000000,
            "data": {"object": {
                "id": "dp_1", "charge": "ch_1", "amount": 500, "currency": "usd", "status": "needs_response"
            }}
        }))
        .unwrap();

        let dispute: DisputeObject = event.object().unwrap();
        assert_eq!(dispute.charge.as_deref(), Some("ch_1"));
        assert!(dispute.balance_transactions.is_empty());
        assert_eq!(event.object_str("status"), Some("needs_response"));
    }

    #[test]
    fn test_event_object_reports_malformed_payload() {
        let event: ProcessorEvent = serde_json::from_value(json!({
            "id": "evt_2",
            "type": "charge.refund.updated",
            "created": 1700000000,
            "data": {"object": {"id": "re_1"}}
        }))
        .unwrap();

        let result = event.object::<RefundObject>();
        assert!(matches!(
            result,
            Err(ReconciliationError::MalformedPayload { ref event_id, .. }) if event_id == "evt_2"
        ));
    }
}
