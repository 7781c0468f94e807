//! Notification and ledger formats
//!
//! Input is JSON lines, one processor notification per line; blank lines are
//! skipped. Output is one CSV row per published ledger event.

use crate::processor::payload::ProcessorEvent;
use crate::types::{Amount, LedgerEvent, ReconciliationError};
use serde::Serialize;

const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%SZ";

/// Parse one input line
///
/// # Arguments
///
/// * `line` - Raw line, without its terminator
/// * `line_num` - 1-based line number reported in parse errors
///
/// # Returns
///
/// * `Ok(Some(event))` - The line holds a notification
/// * `Ok(None)` - The line is blank
/// * `Err(ParseError)` - The line is not a valid notification
pub fn parse_event_line(
    line: &str,
    line_num: usize,
) -> Result<Option<ProcessorEvent>, ReconciliationError> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(None);
    }

    serde_json::from_str(line)
        .map(Some)
        .map_err(|e| ReconciliationError::ParseError {
            line: Some(line_num as u64),
            message: e.to_string(),
        })
}

/// One ledger CSV row
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LedgerRow {
    pub event_id: String,
    pub processor_id: String,
    #[serde(rename = "type")]
    pub event_type: String,
    pub charge_id: Option<String>,
    pub refund_id: Option<String>,
    pub payment_intent_id: Option<String>,
    pub created_at: String,
    pub comment: String,
    pub issued: Option<String>,
    pub settled: Option<String>,
    pub platform: Option<String>,
    pub merchant_gross: Option<String>,
    pub merchant_net: Option<String>,
    pub needs_reconciliation: bool,
    /// Compact JSON object
    pub extras: String,
}

fn leg(amount: Option<&Amount>) -> Option<String> {
    amount.map(Amount::to_string)
}

impl LedgerRow {
    pub fn from_event(event: &LedgerEvent) -> Result<Self, ReconciliationError> {
        let flow = event.flow_of_funds.as_ref();

        Ok(LedgerRow {
            event_id: event.event_id.clone(),
            processor_id: event.processor_id.clone(),
            event_type: event.event_type.to_string(),
            charge_id: event.charge_id.clone(),
            refund_id: event.refund_id.clone(),
            payment_intent_id: event.payment_intent_id.clone(),
            created_at: event.created_at.format(TIMESTAMP_FORMAT).to_string(),
            comment: event.comment.clone(),
            issued: leg(flow.and_then(|f| f.issued_amount.as_ref())),
            settled: leg(flow.and_then(|f| f.settled_amount.as_ref())),
            platform: leg(flow.and_then(|f| f.platform_amount.as_ref())),
            merchant_gross: leg(flow.and_then(|f| f.merchant_gross_amount.as_ref())),
            merchant_net: leg(flow.and_then(|f| f.merchant_net_amount.as_ref())),
            needs_reconciliation: event.needs_reconciliation,
            extras: serde_json::to_string(&event.extras)?,
        })
    }
}
