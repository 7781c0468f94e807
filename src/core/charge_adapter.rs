//! Charge adapter
//!
//! Turns processor charge payloads into canonical [`Charge`] values and
//! computes the flow of funds of a charge from its settlement legs.

use crate::core::topology::{self, TopologyInputs};
use crate::processor::payload::{BalanceTransaction, ChargeObject, Expandable, Transfer};
use crate::types::{Amount, Charge, ChargeTopology, FlowOfFunds, ReconciliationError};
use tracing::warn;

/// Build the canonical charge, classifying its topology once
///
/// # Arguments
///
/// * `object` - Charge payload from an event or a processor lookup
/// * `context_id` - Event or lookup id reported if the charge id is missing
///
/// # Errors
///
/// Returns `MissingCorrelationId` if the payload has no charge id.
pub fn canonical_charge(
    object: &ChargeObject,
    context_id: &str,
) -> Result<Charge, ReconciliationError> {
    let id = object
        .id
        .clone()
        .ok_or_else(|| ReconciliationError::missing_correlation_id(context_id, "id"))?;

    let topology = topology::classify(TopologyInputs::from_charge(object));

    let destination = object.destination.clone().or_else(|| {
        object
            .transfer_data
            .as_ref()
            .map(|data| data.destination.clone())
    });

    let (application_fee_id, application_fee_account) = match &object.application_fee {
        Some(Expandable::Object(fee)) => (Some(fee.id.clone()), fee.account.clone()),
        Some(Expandable::Id(id)) => (Some(id.clone()), None),
        None => (None, None),
    };

    Ok(Charge {
        id,
        amount: Amount::new(object.currency.clone(), object.amount),
        destination,
        on_behalf_of: object.on_behalf_of.clone(),
        transfer_data_amount: object.transfer_data.as_ref().and_then(|data| data.amount),
        transfer_id: object.transfer.clone(),
        application_fee_id,
        application_fee_account,
        payment_intent_id: object.payment_intent.clone(),
        metadata: object.metadata.clone(),
        topology,
    })
}

/// Compute the flow of funds of a charge
///
/// # Arguments
///
/// * `charge` - Canonical charge (carries its topology)
/// * `charge_balance_txn` - Settlement of the charge on the platform
/// * `application_fee_balance_txn` - Settlement of the legacy application fee
/// * `destination_payment_balance_txn` - Settlement of the payment on the connected account
/// * `destination_transfer` - Transfer to the connected account
///
/// # Errors
///
/// Returns `InsufficientData` when a destination charge is missing a leg its
/// topology needs. Callers must record "no flow of funds", never zero.
pub fn build_charge_flow_of_funds(
    charge: &Charge,
    charge_balance_txn: &BalanceTransaction,
    application_fee_balance_txn: Option<&BalanceTransaction>,
    destination_payment_balance_txn: Option<&BalanceTransaction>,
    destination_transfer: Option<&Transfer>,
) -> Result<FlowOfFunds, ReconciliationError> {
    let issued = charge.amount.clone();
    let settled = Amount::new(charge_balance_txn.currency.clone(), charge_balance_txn.amount);
    let subject = format!("charge {}", charge.id);

    if !charge.has_destination() {
        return Ok(FlowOfFunds::simple(issued, settled));
    }

    if application_fee_balance_txn.is_none() && destination_transfer.is_none() {
        return Err(ReconciliationError::insufficient_data(
            &subject,
            "application fee and destination transfer",
        ));
    }

    let platform = match charge.topology {
        ChargeTopology::DestinationWithApplicationFee => {
            let fee_txn = application_fee_balance_txn.ok_or_else(|| {
                ReconciliationError::insufficient_data(
                    &subject,
                    "application fee balance transaction",
                )
            })?;
            Amount::new(fee_txn.currency.clone(), fee_txn.amount)
        }
        _ => {
            let transfer = destination_transfer.ok_or_else(|| {
                ReconciliationError::insufficient_data(&subject, "destination transfer")
            })?;
            if let Some(expected) = charge.transfer_data_amount.filter(|a| *a != transfer.amount) {
                warn!(
                    charge_id = %charge.id,
                    transfer_id = %transfer.id,
                    expected,
                    actual = transfer.amount,
                    "Transfer amount differs from transfer_data amount"
                );
            }
            // transfer_data[amount] is denominated in the charge currency
            let platform_cents = charge
                .amount
                .cents
                .checked_sub(transfer.amount)
                .ok_or_else(|| ReconciliationError::arithmetic_overflow("charge platform amount"))?;
            Amount::new(charge.amount.currency.clone(), platform_cents)
        }
    };

    let payment_txn = destination_payment_balance_txn.ok_or_else(|| {
        ReconciliationError::insufficient_data(&subject, "destination payment balance transaction")
    })?;

    Ok(FlowOfFunds::new(issued, settled)
        .with_platform(Some(platform))
        .with_merchant(
            Amount::new(payment_txn.currency.clone(), payment_txn.amount),
            Amount::new(payment_txn.currency.clone(), payment_txn.net),
        ))
}
