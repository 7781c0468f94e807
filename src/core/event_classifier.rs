//! Event classifier
//!
//! A pure function from an inbound processor notification (plus the disputed
//! charge, for dispute events) to either a canonical [`ChargeEvent`] or a
//! discard. Flows that need processor lookups or side effects are not computed
//! here; the classification says which one the reconciler has to produce.
//!
//! Classifying the same notification twice yields identical results.

use crate::core::charge_adapter::canonical_charge;
use crate::core::dispute_adapter::{build_dispute_formalized_flow, build_dispute_won_flow};
use crate::processor::payload::{
    ChargeObject, DisputeObject, PaymentIntentObject, ProcessorEvent, RefundObject,
};
use crate::settings::ReconcilerSettings;
use crate::types::{
    Charge, ChargeEvent, ChargeEventType, DiscardReason, FlowOfFunds, ReconciliationError,
};
use chrono::{DateTime, Utc};
use serde_json::Value;
use std::collections::BTreeMap;
use tracing::warn;

/// Next actions the checkout flow can drive without manual help
const SUPPORTED_NEXT_ACTIONS: [&str; 2] = ["use_stripe_sdk", "redirect_to_url"];

/// Dispute statuses that return the disputed amount to the platform
const WON_DISPUTE_STATUSES: [&str; 2] = ["won", "warning_closed"];

const CHARGE_REFUNDED: &str = "charge_refunded";

/// Processor event types the classifier distinguishes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    ChargeFailed,
    ChargeSucceeded,
    ChargeOther,
    DisputeCreated,
    DisputeFundsWithdrawn,
    DisputeFundsReinstated,
    DisputeClosed,
    DisputeOther,
    RefundUpdated,
    PaymentIntentFailed,
    Unsupported,
}

impl EventKind {
    pub fn parse(event_type: &str) -> Self {
        match event_type {
            "charge.failed" => EventKind::ChargeFailed,
            "charge.succeeded" => EventKind::ChargeSucceeded,
            "charge.refund.updated" => EventKind::RefundUpdated,
            "charge.dispute.created" => EventKind::DisputeCreated,
            "charge.dispute.funds_withdrawn" => EventKind::DisputeFundsWithdrawn,
            "charge.dispute.funds_reinstated" => EventKind::DisputeFundsReinstated,
            "charge.dispute.closed" => EventKind::DisputeClosed,
            "payment_intent.payment_failed" => EventKind::PaymentIntentFailed,
            other if other.starts_with("charge.dispute.") => EventKind::DisputeOther,
            other if other.starts_with("charge.") => EventKind::ChargeOther,
            _ => EventKind::Unsupported,
        }
    }

    pub fn is_dispute(self) -> bool {
        matches!(
            self,
            EventKind::DisputeCreated
                | EventKind::DisputeFundsWithdrawn
                | EventKind::DisputeFundsReinstated
                | EventKind::DisputeClosed
                | EventKind::DisputeOther
        )
    }
}

/// What the reconciler still has to do to finish an event's flow of funds
#[derive(Debug, Clone, PartialEq)]
pub enum FlowRequirement {
    /// The event carries no flow of funds
    None,
    /// Computed from the payload alone
    Ready(FlowOfFunds),
    /// Needs the charge's settlement legs from the processor
    ChargeLegs(Charge),
    /// Needs the destination transfer reversed first
    TransferReversal { charge: Charge, dispute: DisputeObject },
    /// Needs a compensating transfer to the creator first
    CompensatingTransfer { charge: Charge, dispute: DisputeObject },
    /// A record the flow depends on could not be found
    Unresolved { subject: String, missing: String },
}

/// A classified notification, before its flow of funds is attached
#[derive(Debug, Clone, PartialEq)]
pub struct ClassifiedEvent {
    pub event: ChargeEvent,
    pub flow: FlowRequirement,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Classification {
    Emit(Box<ClassifiedEvent>),
    Discard(DiscardReason),
}

/// Classify one inbound notification
///
/// # Arguments
///
/// * `event` - The validated processor notification
/// * `disputed_charge` - The underlying charge of a dispute event, if it
///   could be retrieved
/// * `settings` - Processor id and foreign-charge markers
///
/// # Errors
///
/// - `MissingCorrelationId` if a required id or the `created` timestamp is absent
/// - `MalformedPayload` if `data.object` does not match the event type's shape
pub fn classify(
    event: &ProcessorEvent,
    disputed_charge: Option<&Charge>,
    settings: &ReconcilerSettings,
) -> Result<Classification, ReconciliationError> {
    let kind = EventKind::parse(&event.event_type);

    match kind {
        EventKind::ChargeFailed => return Ok(Classification::Discard(DiscardReason::Unlinkable)),
        EventKind::Unsupported => {
            return Ok(Classification::Discard(DiscardReason::UnsupportedEventType))
        }
        _ => {}
    }

    let builder = EventBuilder::new(event, settings)?;

    match kind {
        EventKind::ChargeSucceeded | EventKind::ChargeOther => {
            classify_charge(kind, event, builder, settings)
        }
        EventKind::RefundUpdated => classify_refund_update(event, builder),
        EventKind::PaymentIntentFailed => classify_payment_failure(event, builder),
        _ => classify_dispute(kind, event, builder, disputed_charge),
    }
}

/// Parse a unix timestamp from a notification's `created` field
pub fn created_at(event: &ProcessorEvent) -> Result<DateTime<Utc>, ReconciliationError> {
    let seconds = event
        .created
        .ok_or_else(|| ReconciliationError::missing_correlation_id(&event.id, "created"))?;
    DateTime::from_timestamp(seconds, 0).ok_or_else(|| {
        ReconciliationError::malformed_payload(
            &event.id,
            format!("created out of range: {seconds}"),
        )
    })
}

/// Accumulates the fields shared by every emitted event
struct EventBuilder {
    event: ChargeEvent,
}

impl EventBuilder {
    fn new(
        event: &ProcessorEvent,
        settings: &ReconcilerSettings,
    ) -> Result<Self, ReconciliationError> {
        Ok(EventBuilder {
            event: ChargeEvent {
                processor_id: settings.processor_id.clone(),
                event_id: event.id.clone(),
                charge_id: None,
                refund_id: None,
                payment_intent_id: None,
                event_type: ChargeEventType::Informational,
                created_at: created_at(event)?,
                comment: event.event_type.clone(),
                extras: BTreeMap::new(),
                flow_of_funds: None,
                needs_reconciliation: false,
            },
        })
    }

    fn charge_id(mut self, charge_id: Option<String>) -> Self {
        self.event.charge_id = charge_id;
        self
    }

    fn refund_id(mut self, refund_id: Option<String>) -> Self {
        self.event.refund_id = refund_id;
        self
    }

    fn payment_intent_id(mut self, payment_intent_id: Option<String>) -> Self {
        self.event.payment_intent_id = payment_intent_id;
        self
    }

    fn extra(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.event.extras.insert(key.to_string(), value.into());
        self
    }

    fn extra_opt(self, key: &str, value: Option<impl Into<Value>>) -> Self {
        match value {
            Some(value) => self.extra(key, value),
            None => self,
        }
    }

    fn emit(mut self, event_type: ChargeEventType, flow: FlowRequirement) -> Classification {
        self.event.event_type = event_type;
        if let FlowRequirement::Ready(flow_of_funds) = &flow {
            self.event.flow_of_funds = Some(flow_of_funds.clone());
        }
        Classification::Emit(Box::new(ClassifiedEvent {
            event: self.event,
            flow,
        }))
    }
}

fn classify_charge(
    kind: EventKind,
    event: &ProcessorEvent,
    builder: EventBuilder,
    settings: &ReconcilerSettings,
) -> Result<Classification, ReconciliationError> {
    let object: ChargeObject = event.object()?;
    let charge = canonical_charge(&object, &event.id)?;

    let builder = builder
        .charge_id(Some(charge.id.clone()))
        .payment_intent_id(charge.payment_intent_id.clone())
        .extra("topology", charge.topology.to_string());

    if kind == EventKind::ChargeOther {
        return Ok(builder
            .extra_opt("charge_status", object.status.clone())
            .emit(ChargeEventType::Informational, FlowRequirement::None));
    }

    let foreign = settings
        .foreign_charge_metadata_keys
        .iter()
        .any(|key| charge.metadata.contains_key(key));
    if foreign {
        return Ok(Classification::Discard(DiscardReason::ForeignCharge));
    }

    Ok(builder.emit(ChargeEventType::ChargeSucceeded, FlowRequirement::ChargeLegs(charge)))
}

fn classify_refund_update(
    event: &ProcessorEvent,
    builder: EventBuilder,
) -> Result<Classification, ReconciliationError> {
    let refund: RefundObject = event.object()?;
    let refund_id = refund
        .id
        .clone()
        .ok_or_else(|| ReconciliationError::missing_correlation_id(&event.id, "id"))?;
    let charge_id = refund
        .charge
        .clone()
        .ok_or_else(|| ReconciliationError::missing_correlation_id(&event.id, "charge"))?;

    Ok(builder
        .charge_id(Some(charge_id))
        .refund_id(Some(refund_id))
        .extra_opt("refund_status", refund.status.clone())
        .extra("refunded_amount_cents", refund.amount)
        .extra_opt("refund_reason", refund.reason.clone())
        .emit(ChargeEventType::RefundUpdated, FlowRequirement::None))
}

fn classify_payment_failure(
    event: &ProcessorEvent,
    builder: EventBuilder,
) -> Result<Classification, ReconciliationError> {
    let intent: PaymentIntentObject = event.object()?;
    let intent_id = intent
        .id
        .clone()
        .ok_or_else(|| ReconciliationError::missing_correlation_id(&event.id, "id"))?;

    let error = intent.last_payment_error.as_ref();
    let charge_id = intent
        .latest_charge
        .clone()
        .or_else(|| error.and_then(|error| error.charge.clone()));

    let mut builder = builder
        .charge_id(charge_id)
        .payment_intent_id(Some(intent_id.clone()))
        .extra_opt("error_code", error.and_then(|error| error.code.clone()))
        .extra_opt("decline_code", error.and_then(|error| error.decline_code.clone()))
        .extra_opt("error_message", error.and_then(|error| error.message.clone()));

    if let Some(action) = intent.next_action.as_ref() {
        if SUPPORTED_NEXT_ACTIONS.contains(&action.action_type.as_str()) {
            builder = builder.extra("next_action", action.action_type.clone());
        } else {
            let unsupported = ReconciliationError::unsupported_action(
                &action.action_type,
                &format!("payment intent {intent_id}"),
            );
            warn!(event_id = %event.id, error = %unsupported, "Falling back to manual handling");
            builder = builder.extra("next_action", "manual");
        }
    }

    Ok(builder.emit(ChargeEventType::PaymentIntentFailed, FlowRequirement::None))
}

fn classify_dispute(
    kind: EventKind,
    event: &ProcessorEvent,
    builder: EventBuilder,
    disputed_charge: Option<&Charge>,
) -> Result<Classification, ReconciliationError> {
    let dispute: DisputeObject = event.object()?;
    let dispute_id = dispute
        .id
        .clone()
        .ok_or_else(|| ReconciliationError::missing_correlation_id(&event.id, "id"))?;
    let charge_id = dispute
        .charge
        .clone()
        .ok_or_else(|| ReconciliationError::missing_correlation_id(&event.id, "charge"))?;

    if is_refund_closure(event) {
        return Ok(Classification::Discard(DiscardReason::ChargeAlreadyRefunded));
    }

    let subject = format!("dispute {dispute_id}");
    let builder = builder
        .charge_id(Some(charge_id))
        .extra("dispute_id", dispute_id)
        .extra("dispute_status", dispute.status.clone())
        .extra_opt("reason", dispute.reason.clone());

    let status = dispute.status.as_str();
    let Some(charge) = disputed_charge else {
        return Ok(builder.emit(
            unlinked_dispute_type(kind, status),
            FlowRequirement::Unresolved {
                subject,
                missing: "disputed charge".to_string(),
            },
        ));
    };

    let builder = builder.payment_intent_id(charge.payment_intent_id.clone());
    let classification = if charge.has_destination() {
        match kind {
            EventKind::DisputeCreated => {
                builder.emit(ChargeEventType::DisputeFormalized, FlowRequirement::None)
            }
            EventKind::DisputeFundsWithdrawn => builder.emit(
                ChargeEventType::DisputeFundsWithdrawn,
                FlowRequirement::TransferReversal {
                    charge: charge.clone(),
                    dispute,
                },
            ),
            EventKind::DisputeFundsReinstated => builder.emit(
                ChargeEventType::DisputeFundsReinstated,
                FlowRequirement::CompensatingTransfer {
                    charge: charge.clone(),
                    dispute,
                },
            ),
            EventKind::DisputeClosed if status == "lost" => {
                builder.emit(ChargeEventType::DisputeLost, FlowRequirement::None)
            }
            _ => builder.emit(ChargeEventType::Informational, FlowRequirement::None),
        }
    } else {
        match kind {
            EventKind::DisputeCreated => builder.emit(
                ChargeEventType::DisputeFormalized,
                FlowRequirement::Ready(build_dispute_formalized_flow(&dispute)?),
            ),
            EventKind::DisputeClosed if WON_DISPUTE_STATUSES.contains(&status) => builder.emit(
                ChargeEventType::DisputeWon,
                FlowRequirement::Ready(build_dispute_won_flow(&dispute)),
            ),
            EventKind::DisputeClosed if status == "lost" => {
                builder.emit(ChargeEventType::DisputeLost, FlowRequirement::None)
            }
            _ => builder.emit(ChargeEventType::Informational, FlowRequirement::None),
        }
    };

    Ok(classification)
}

/// Whether a notification is a dispute closed because its charge was refunded
///
/// These are discarded before the disputed charge is looked up.
pub fn is_refund_closure(event: &ProcessorEvent) -> bool {
    EventKind::parse(&event.event_type) == EventKind::DisputeClosed
        && (event.object_str("reason") == Some(CHARGE_REFUNDED)
            || event.object_str("status") == Some(CHARGE_REFUNDED))
}

/// Event type of a dispute whose charge, and so its topology, is unknown
fn unlinked_dispute_type(kind: EventKind, status: &str) -> ChargeEventType {
    match kind {
        EventKind::DisputeCreated => ChargeEventType::DisputeFormalized,
        EventKind::DisputeFundsWithdrawn => ChargeEventType::DisputeFundsWithdrawn,
        EventKind::DisputeFundsReinstated => ChargeEventType::DisputeFundsReinstated,
        EventKind::DisputeClosed if status == "lost" => ChargeEventType::DisputeLost,
        EventKind::DisputeClosed if WON_DISPUTE_STATUSES.contains(&status) => {
            ChargeEventType::DisputeWon
        }
        _ => ChargeEventType::Informational,
    }
}

/// Key that serializes work on the same charge
///
/// Notifications for one charge must be applied in order; everything else can
/// run in parallel. Payment-intent failures without a charge key off the
/// payment intent, and anything unlinkable keys off its own event id.
pub fn correlation_key(event: &ProcessorEvent) -> String {
    let kind = EventKind::parse(&event.event_type);
    let key = match kind {
        EventKind::ChargeSucceeded | EventKind::ChargeOther | EventKind::ChargeFailed => {
            event.object_str("id")
        }
        EventKind::PaymentIntentFailed => event
            .object_str("latest_charge")
            .or_else(|| {
                event
                    .data
                    .object
                    .get("last_payment_error")
                    .and_then(|error| error.get("charge"))
                    .and_then(Value::as_str)
            })
            .or_else(|| event.object_str("id")),
        EventKind::Unsupported => None,
        _ => event.object_str("charge"),
    };
    key.unwrap_or(&event.id).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Amount, ChargeTopology};
    use rstest::rstest;
    use serde_json::json;

    fn settings() -> ReconcilerSettings {
        ReconcilerSettings::default()
    }

    fn notification(event_type: &str, object: Value) -> ProcessorEvent {
        serde_json::from_value(json!({
            "id": "evt_1",
            "type": event_type,
            "created": 1700000000,
            "data": {"object": object}
        }))
        .unwrap()
    }

    fn charge(value: Value) -> Charge {
        let object: ChargeObject = serde_json::from_value(value).unwrap();
        canonical_charge(&object, "evt_test").unwrap()
    }

    fn platform_charge() -> Charge {
        charge(json!({"id": "ch_1", "amount": 5000, "currency": "usd", "payment_intent": "pi_1"}))
    }

    fn destination_charge() -> Charge {
        charge(json!({
            "id": "ch_1", "amount": 5000, "currency": "usd",
            "destination": "acct_1", "application_fee_amount": 500
        }))
    }

    fn dispute(status: &str, reason: &str) -> Value {
        json!({
            "id": "dp_1", "charge": "ch_1", "amount": 5000, "currency": "usd",
            "status": status, "reason": reason,
            "balance_transactions": [{"id": "txn_d", "amount": -5000, "currency": "usd", "net": -6500}]
        })
    }

    fn emitted(classification: Classification) -> ClassifiedEvent {
        match classification {
            Classification::Emit(classified) => *classified,
            Classification::Discard(reason) => panic!("Expected an event, got discard: {reason}"),
        }
    }

    #[rstest]
    #[case("charge.failed", EventKind::ChargeFailed)]
    #[case("charge.succeeded", EventKind::ChargeSucceeded)]
    #[case("charge.captured", EventKind::ChargeOther)]
    #[case("charge.refund.updated", EventKind::RefundUpdated)]
    #[case("charge.dispute.created", EventKind::DisputeCreated)]
    #[case("charge.dispute.updated", EventKind::DisputeOther)]
    #[case("charge.dispute.closed", EventKind::DisputeClosed)]
    #[case("payment_intent.payment_failed", EventKind::PaymentIntentFailed)]
    #[case("payout.paid", EventKind::Unsupported)]
    fn test_event_kind_parse(#[case] event_type: &str, #[case] expected: EventKind) {
        assert_eq!(EventKind::parse(event_type), expected);
    }

    #[test]
    fn test_charge_failed_is_discarded_without_validation() {
        let event: ProcessorEvent = serde_json::from_value(json!({
            "id": "evt_1", "type": "charge.failed", "data": {"object": {}}
        }))
        .unwrap();

        assert_eq!(
            classify(&event, None, &settings()).unwrap(),
            Classification::Discard(DiscardReason::Unlinkable)
        );
    }

    #[test]
    fn test_unsupported_event_type_is_discarded() {
        let event = notification("payout.paid", json!({"id": "po_1"}));
        assert_eq!(
            classify(&event, None, &settings()).unwrap(),
            Classification::Discard(DiscardReason::UnsupportedEventType)
        );
    }

    #[test]
    fn test_dispute_closed_by_refund_is_discarded() {
        let event = notification("charge.dispute.closed", dispute("lost", "charge_refunded"));
        assert_eq!(
            classify(&event, Some(&destination_charge()), &settings()).unwrap(),
            Classification::Discard(DiscardReason::ChargeAlreadyRefunded)
        );
    }

    #[test]
    fn test_charge_succeeded_needs_charge_legs() {
        let event = notification(
            "charge.succeeded",
            json!({"id": "ch_1", "amount": 1000, "currency": "usd", "payment_intent": "pi_1"}),
        );

        let classified = emitted(classify(&event, None, &settings()).unwrap());

        assert_eq!(classified.event.event_type, ChargeEventType::ChargeSucceeded);
        assert_eq!(classified.event.charge_id.as_deref(), Some("ch_1"));
        assert_eq!(classified.event.payment_intent_id.as_deref(), Some("pi_1"));
        assert_eq!(classified.event.processor_id, "stripe");
        assert_eq!(classified.event.comment, "charge.succeeded");
        assert_eq!(classified.event.created_at.timestamp(), 1700000000);
        assert!(matches!(
            classified.flow,
            FlowRequirement::ChargeLegs(ref charge)
                if charge.topology == ChargeTopology::NoDestination
        ));
    }

    #[test]
    fn test_foreign_charge_is_discarded() {
        let event = notification(
            "charge.succeeded",
            json!({
                "id": "ch_1", "amount": 1000, "currency": "usd",
                "metadata": {"third_party_marketing": "true"}
            }),
        );

        assert_eq!(
            classify(&event, None, &settings()).unwrap(),
            Classification::Discard(DiscardReason::ForeignCharge)
        );
    }

    #[test]
    fn test_other_charge_events_are_informational() {
        let event = notification(
            "charge.captured",
            json!({"id": "ch_1", "amount": 1000, "currency": "usd", "status": "succeeded"}),
        );

        let classified = emitted(classify(&event, None, &settings()).unwrap());

        assert_eq!(classified.event.event_type, ChargeEventType::Informational);
        assert_eq!(classified.flow, FlowRequirement::None);
        assert_eq!(classified.event.extras["charge_status"], json!("succeeded"));
    }

    #[test]
    fn test_missing_charge_id_is_fatal() {
        let event = notification("charge.succeeded", json!({"amount": 1000, "currency": "usd"}));
        assert_eq!(
            classify(&event, None, &settings()),
            Err(ReconciliationError::missing_correlation_id("evt_1", "id"))
        );
    }

    #[test]
    fn test_missing_created_is_fatal() {
        let event: ProcessorEvent = serde_json::from_value(json!({
            "id": "evt_1", "type": "charge.succeeded",
            "data": {"object": {"id": "ch_1", "amount": 1000, "currency": "usd"}}
        }))
        .unwrap();

        assert_eq!(
            classify(&event, None, &settings()),
            Err(ReconciliationError::missing_correlation_id("evt_1", "created"))
        );
    }

    #[test]
    fn test_refund_updated_carries_extras() {
        let event = notification(
            "charge.refund.updated",
            json!({
                "id": "re_1", "charge": "ch_1", "amount": 2500, "currency": "usd",
                "status": "succeeded", "reason": "requested_by_customer"
            }),
        );

        let classified = emitted(classify(&event, None, &settings()).unwrap());

        assert_eq!(classified.event.event_type, ChargeEventType::RefundUpdated);
        assert_eq!(classified.event.refund_id.as_deref(), Some("re_1"));
        assert_eq!(classified.event.extras["refund_status"], json!("succeeded"));
        assert_eq!(classified.event.extras["refunded_amount_cents"], json!(2500));
        assert_eq!(classified.event.extras["refund_reason"], json!("requested_by_customer"));
        assert_eq!(classified.event.flow_of_funds, None);
    }

    #[test]
    fn test_payment_intent_failure_without_charge() {
        let event = notification(
            "payment_intent.payment_failed",
            json!({
                "id": "pi_1",
                "last_payment_error": {"code": "card_declined", "message": "Your card was declined."}
            }),
        );

        let classified = emitted(classify(&event, None, &settings()).unwrap());

        assert_eq!(classified.event.event_type, ChargeEventType::PaymentIntentFailed);
        assert_eq!(classified.event.charge_id, None);
        assert_eq!(classified.event.payment_intent_id.as_deref(), Some("pi_1"));
        assert_eq!(classified.event.extras["error_code"], json!("card_declined"));
        assert_eq!(correlation_key(&event), "pi_1");
    }

    #[rstest]
    #[case::supported("use_stripe_sdk", "use_stripe_sdk")]
    #[case::unsupported("verify_with_microdeposits", "manual")]
    fn test_payment_intent_next_action(#[case] action: &str, #[case] expected: &str) {
        let event = notification(
            "payment_intent.payment_failed",
            json!({"id": "pi_1", "latest_charge": "ch_1", "next_action": {"type": action}}),
        );

        let classified = emitted(classify(&event, None, &settings()).unwrap());

        assert_eq!(classified.event.charge_id.as_deref(), Some("ch_1"));
        assert_eq!(classified.event.extras["next_action"], json!(expected));
    }

    #[rstest]
    #[case::created("charge.dispute.created", "needs_response", ChargeEventType::DisputeFormalized, Some(-5000))]
    #[case::won("charge.dispute.closed", "won", ChargeEventType::DisputeWon, Some(5000))]
    #[case::warning_closed("charge.dispute.closed", "warning_closed", ChargeEventType::DisputeWon, Some(5000))]
    #[case::lost("charge.dispute.closed", "lost", ChargeEventType::DisputeLost, None)]
    #[case::withdrawn("charge.dispute.funds_withdrawn", "needs_response", ChargeEventType::Informational, None)]
    #[case::updated("charge.dispute.updated", "under_review", ChargeEventType::Informational, None)]
    fn test_dispute_without_destination(
        #[case] event_type: &str,
        #[case] status: &str,
        #[case] expected: ChargeEventType,
        #[case] issued_cents: Option<i64>,
    ) {
        let event = notification(event_type, dispute(status, "fraudulent"));

        let classified = emitted(classify(&event, Some(&platform_charge()), &settings()).unwrap());

        assert_eq!(classified.event.event_type, expected);
        assert_eq!(classified.event.extras["dispute_id"], json!("dp_1"));
        assert_eq!(classified.event.extras["reason"], json!("fraudulent"));
        assert_eq!(classified.event.payment_intent_id.as_deref(), Some("pi_1"));
        assert_eq!(
            classified.event.flow_of_funds.and_then(|flow| flow.issued_amount),
            issued_cents.map(|cents| Amount::new("usd", cents))
        );
    }

    #[rstest]
    #[case::created("charge.dispute.created", "needs_response", ChargeEventType::DisputeFormalized)]
    #[case::withdrawn("charge.dispute.funds_withdrawn", "needs_response", ChargeEventType::DisputeFundsWithdrawn)]
    #[case::reinstated("charge.dispute.funds_reinstated", "won", ChargeEventType::DisputeFundsReinstated)]
    #[case::lost("charge.dispute.closed", "lost", ChargeEventType::DisputeLost)]
    #[case::won("charge.dispute.closed", "won", ChargeEventType::Informational)]
    fn test_dispute_with_destination(
        #[case] event_type: &str,
        #[case] status: &str,
        #[case] expected: ChargeEventType,
    ) {
        let event = notification(event_type, dispute(status, "fraudulent"));

        let classified =
            emitted(classify(&event, Some(&destination_charge()), &settings()).unwrap());

        assert_eq!(classified.event.event_type, expected);
        assert_eq!(classified.event.flow_of_funds, None);
        match expected {
            ChargeEventType::DisputeFundsWithdrawn => assert!(matches!(
                classified.flow,
                FlowRequirement::TransferReversal { .. }
            )),
            ChargeEventType::DisputeFundsReinstated => assert!(matches!(
                classified.flow,
                FlowRequirement::CompensatingTransfer { .. }
            )),
            _ => assert_eq!(classified.flow, FlowRequirement::None),
        }
    }

    #[rstest]
    #[case::created("charge.dispute.created", "needs_response", ChargeEventType::DisputeFormalized)]
    #[case::withdrawn(
        "charge.dispute.funds_withdrawn",
        "needs_response",
        ChargeEventType::DisputeFundsWithdrawn
    )]
    #[case::lost("charge.dispute.closed", "lost", ChargeEventType::DisputeLost)]
    #[case::won("charge.dispute.closed", "won", ChargeEventType::DisputeWon)]
    fn test_dispute_without_charge_is_unresolved(
        #[case] event_type: &str,
        #[case] status: &str,
        #[case] expected: ChargeEventType,
    ) {
        let event = notification(event_type, dispute(status, "fraudulent"));

        let classified = emitted(classify(&event, None, &settings()).unwrap());

        assert_eq!(classified.event.event_type, expected);
        assert_eq!(classified.event.charge_id.as_deref(), Some("ch_1"));
        assert_eq!(classified.event.payment_intent_id, None);
        assert_eq!(classified.event.flow_of_funds, None);
        assert!(matches!(classified.flow, FlowRequirement::Unresolved { .. }));
    }

    #[test]
    fn test_refund_closure_discarded_without_charge() {
        let event = notification("charge.dispute.closed", dispute("lost", "charge_refunded"));

        assert!(is_refund_closure(&event));
        assert_eq!(
            classify(&event, None, &settings()).unwrap(),
            Classification::Discard(DiscardReason::ChargeAlreadyRefunded)
        );
    }

    #[test]
    fn test_classification_is_idempotent() {
        let event = notification("charge.dispute.closed", dispute("won", "fraudulent"));

        let first = classify(&event, Some(&platform_charge()), &settings()).unwrap();
        let second = classify(&event, Some(&platform_charge()), &settings()).unwrap();

        assert_eq!(first, second);
    }

    #[rstest]
    #[case::charge("charge.succeeded", json!({"id": "ch_9"}), "ch_9")]
    #[case::dispute("charge.dispute.created", json!({"id": "dp_1", "charge": "ch_9"}), "ch_9")]
    #[case::refund("charge.refund.updated", json!({"id": "re_1", "charge": "ch_9"}), "ch_9")]
    #[case::intent_with_charge("payment_intent.payment_failed", json!({"id": "pi_1", "latest_charge": "ch_9"}), "ch_9")]
    #[case::unsupported("payout.paid", json!({"id": "po_1"}), "evt_1")]
    fn test_correlation_key(
        #[case] event_type: &str,
        #[case] object: Value,
        #[case] expected: &str,
    ) {
        assert_eq!(correlation_key(&notification(event_type, object)), expected);
    }
}
