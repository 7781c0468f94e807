//! Dispute adapter
//!
//! Flow of funds for each dispute transition. Disputes on charges without a
//! destination only move money between the buyer and the platform; on
//! destination charges a withdrawal is paired with a transfer reversal and a
//! reinstatement with a compensating transfer to the creator.

use crate::processor::payload::{BalanceTransaction, DisputeObject, Transfer, TransferReversal};
use crate::types::{Amount, Charge, ChargeTopology, FlowOfFunds, ReconciliationError};

/// Legs produced by reversing the destination transfer after a withdrawal
#[derive(Debug, Clone, PartialEq)]
pub struct DisputeWithdrawalLegs {
    pub reversal: TransferReversal,
    pub destination_payment_refund_balance_txn: BalanceTransaction,
    pub application_fee_refund_balance_txn: Option<BalanceTransaction>,
}

/// Legs produced by the compensating transfer after a reinstatement
#[derive(Debug, Clone, PartialEq)]
pub struct DisputeReinstatementLegs {
    pub transfer: Transfer,
    pub destination_payment_balance_txn: BalanceTransaction,
}

fn dispute_amount(dispute: &DisputeObject) -> Amount {
    Amount::new(dispute.currency.clone(), dispute.amount)
}

fn txn_amount(txn: &BalanceTransaction) -> Amount {
    Amount::new(txn.currency.clone(), txn.amount)
}

/// The withdrawal settlement: first debit on the dispute, else the issued amount
fn withdrawal_settled(dispute: &DisputeObject, issued: &Amount) -> Amount {
    dispute
        .balance_transactions
        .iter()
        .find(|txn| txn.amount < 0)
        .map(txn_amount)
        .unwrap_or_else(|| issued.clone())
}

/// The reinstatement settlement: last credit on the dispute, else the issued amount
fn reinstatement_settled(dispute: &DisputeObject, issued: &Amount) -> Amount {
    dispute
        .balance_transactions
        .iter()
        .rev()
        .find(|txn| txn.amount > 0)
        .map(txn_amount)
        .unwrap_or_else(|| issued.clone())
}

/// Flow of a newly opened dispute: the disputed amount leaves the platform
pub fn build_dispute_formalized_flow(
    dispute: &DisputeObject,
) -> Result<FlowOfFunds, ReconciliationError> {
    let issued = dispute_amount(dispute).checked_neg()?;
    let settled = withdrawal_settled(dispute, &issued);
    Ok(FlowOfFunds::simple(issued, settled))
}

/// Flow of a dispute closed in the platform's favor: the amount comes back
pub fn build_dispute_won_flow(dispute: &DisputeObject) -> FlowOfFunds {
    let issued = dispute_amount(dispute);
    let settled = reinstatement_settled(dispute, &issued);
    FlowOfFunds::simple(issued, settled)
}

/// Flow of a withdrawal on a destination charge, after the transfer reversal
///
/// # Arguments
///
/// * `charge` - The disputed charge (carries its topology)
/// * `dispute` - Dispute payload
/// * `legs` - Reversal and its settlement legs
///
/// # Errors
///
/// - `InsufficientData` if the charge collected an application fee but the
///   fee refund has no balance transaction
/// - `CurrencyMismatch` if the reversal is not in the dispute currency
pub fn build_dispute_withdrawn_flow(
    charge: &Charge,
    dispute: &DisputeObject,
    legs: &DisputeWithdrawalLegs,
) -> Result<FlowOfFunds, ReconciliationError> {
    let issued = dispute_amount(dispute).checked_neg()?;
    let settled = withdrawal_settled(dispute, &issued);

    let platform = match charge.topology {
        ChargeTopology::DestinationWithApplicationFee => {
            let fee_txn = legs.application_fee_refund_balance_txn.as_ref().ok_or_else(|| {
                ReconciliationError::insufficient_data(
                    &format!("dispute withdrawal on charge {}", charge.id),
                    "application fee refund balance transaction",
                )
            })?;
            txn_amount(fee_txn)
        }
        _ => {
            // The platform bears whatever the reversal did not recover
            let recovered = Amount::new(legs.reversal.currency.clone(), legs.reversal.amount);
            issued.checked_add(&recovered)?
        }
    };

    let payment_refund = &legs.destination_payment_refund_balance_txn;
    Ok(FlowOfFunds::new(issued, settled)
        .with_platform(Some(platform))
        .with_merchant(
            txn_amount(payment_refund),
            Amount::new(payment_refund.currency.clone(), payment_refund.net),
        ))
}

/// Flow of a reinstatement on a destination charge, after the compensating transfer
///
/// # Errors
///
/// Returns `CurrencyMismatch` if the compensating transfer is not in the
/// dispute currency.
pub fn build_dispute_reinstated_flow(
    dispute: &DisputeObject,
    legs: &DisputeReinstatementLegs,
) -> Result<FlowOfFunds, ReconciliationError> {
    let issued = dispute_amount(dispute);
    let settled = reinstatement_settled(dispute, &issued);

    let sent_back = Amount::new(legs.transfer.currency.clone(), legs.transfer.amount);
    let platform = issued.checked_sub(&sent_back)?;

    let payment = &legs.destination_payment_balance_txn;
    Ok(FlowOfFunds::new(issued, settled)
        .with_platform(Some(platform))
        .with_merchant(
            txn_amount(payment),
            Amount::new(payment.currency.clone(), payment.net),
        ))
}

/// Amount of the destination transfer to reverse for a withdrawal
///
/// The outstanding (not yet reversed) transfer amount, scaled down by the
/// disputed share of the charge for partial disputes.
pub fn transfer_reversal_amount(
    charge: &Charge,
    dispute: &DisputeObject,
    transfer: &Transfer,
) -> Result<i64, ReconciliationError> {
    let outstanding = transfer
        .amount
        .checked_sub(transfer.amount_reversed)
        .ok_or_else(|| ReconciliationError::arithmetic_overflow("transfer outstanding amount"))?
        .max(0);

    if charge.amount.cents <= 0 || dispute.amount >= charge.amount.cents {
        return Ok(outstanding);
    }

    let scaled =
        i128::from(outstanding) * i128::from(dispute.amount) / i128::from(charge.amount.cents);
    i64::try_from(scaled)
        .map_err(|_| ReconciliationError::arithmetic_overflow("transfer reversal scaling"))
}
