//! Refund adapter
//!
//! Builds canonical [`Refund`] values and their flow of funds from a
//! processor refund plus up to four settlement legs.
//!
//! The attribution branches are evaluated in a fixed order. Payload shapes
//! overlap (a charge can have both a destination and `on_behalf_of`, and a
//! fee-refunding refund also satisfies the plain destination branch), so the
//! more specific fee-refund branch must run before the generic destination one.

use crate::processor::payload::{ApplicationFeeRefund, BalanceTransaction, RefundObject};
use crate::types::{Amount, Charge, FlowOfFunds, ReconciliationError, Refund};

/// Settlement legs of a refund, resolved by the orchestrator
#[derive(Debug, Clone, Default)]
pub struct RefundLegs {
    /// The refund's own balance transaction on the platform
    pub refund_balance_txn: Option<BalanceTransaction>,

    /// Balance transaction of the platform's application fee refund
    pub application_fee_refund_balance_txn: Option<BalanceTransaction>,

    /// Refund of the destination payment on the connected account
    pub destination_payment_refund: Option<RefundObject>,

    /// Balance transaction of the destination payment refund
    pub destination_payment_refund_balance_txn: Option<BalanceTransaction>,

    /// Fee refunded to the connected account alongside the destination payment refund
    pub destination_payment_application_fee_refund: Option<ApplicationFeeRefund>,
}

/// Which attribution rule produced a refund's platform/merchant legs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefundAttribution {
    /// Destination charge whose refund also refunded the application fee
    DestinationWithFeeRefund,
    /// Destination charge, no co-occurring fee refund
    Destination,
    /// Direct charge with an application fee collected from an account
    ApplicationFeeAccount,
    /// Plain platform refund
    Simple,
}

/// Destination refund legs that co-occur with a fee refund on the destination
fn fee_refund_legs<'a>(
    charge: &Charge,
    legs: &'a RefundLegs,
) -> Option<(&'a BalanceTransaction, &'a ApplicationFeeRefund)> {
    if !charge.has_destination() {
        return None;
    }
    legs.destination_payment_refund_balance_txn
        .as_ref()
        .zip(legs.destination_payment_application_fee_refund.as_ref())
}

/// Pick the attribution branch, first match wins
pub fn attribution(charge: &Charge, legs: &RefundLegs) -> RefundAttribution {
    if fee_refund_legs(charge, legs).is_some() {
        RefundAttribution::DestinationWithFeeRefund
    } else if charge.has_destination() {
        RefundAttribution::Destination
    } else if charge.application_fee_account.is_some() {
        RefundAttribution::ApplicationFeeAccount
    } else {
        RefundAttribution::Simple
    }
}

/// Compute the flow of funds of a refund
///
/// Issued amounts of refunds are negative by convention. Legs sourced from
/// balance transactions keep the processor's sign.
///
/// # Errors
///
/// - `CurrencyMismatch` if the destination payment refund and its fee refund
///   disagree on currency, or the destination refund currency differs from the
///   platform refund currency
/// - `InsufficientData` if a leg the chosen branch needs is missing
pub fn build_refund_flow_of_funds(
    charge: &Charge,
    refund: &RefundObject,
    legs: &RefundLegs,
) -> Result<FlowOfFunds, ReconciliationError> {
    let subject = format!("refund of charge {}", charge.id);
    let refund_amount = Amount::new(refund.currency.clone(), refund.amount);
    let issued = refund_amount.checked_neg()?;

    let refund_txn = legs
        .refund_balance_txn
        .as_ref()
        .ok_or_else(|| {
            ReconciliationError::insufficient_data(&subject, "refund balance transaction")
        })?;
    let settled = Amount::new(refund_txn.currency.clone(), refund_txn.amount);

    let flow = FlowOfFunds::new(issued.clone(), settled.clone());

    if let Some((payment_refund_txn, fee_refund)) = fee_refund_legs(charge, legs) {
        let gross = Amount::new(payment_refund_txn.currency.clone(), payment_refund_txn.amount);
        let fee_refund_amount = Amount::new(fee_refund.currency.clone(), fee_refund.amount);
        gross.ensure_same_currency(
            &fee_refund_amount,
            "destination payment refund vs application fee refund",
        )?;

        let fee_txn = legs.application_fee_refund_balance_txn.as_ref().ok_or_else(|| {
            ReconciliationError::insufficient_data(
                &subject,
                "application fee refund balance transaction",
            )
        })?;
        let platform = Amount::new(fee_txn.currency.clone(), fee_txn.amount);
        let net = gross.checked_add(&fee_refund_amount)?;

        return Ok(flow.with_platform(Some(platform)).with_merchant(gross, net));
    }

    if charge.has_destination() {
        let payment_refund_txn =
            legs.destination_payment_refund_balance_txn.as_ref().ok_or_else(|| {
                ReconciliationError::insufficient_data(
                    &subject,
                    "destination payment refund balance transaction",
                )
            })?;

        // On-behalf-of charges attribute no platform share here
        let platform = if charge.on_behalf_of.is_some() {
            None
        } else {
            let payment_refund = legs.destination_payment_refund.as_ref().ok_or_else(|| {
                ReconciliationError::insufficient_data(&subject, "destination payment refund")
            })?;
            let reversed = Amount::new(payment_refund.currency.clone(), payment_refund.amount);
            Some(refund_amount.checked_sub(&reversed)?)
        };

        let merchant = Amount::new(payment_refund_txn.currency.clone(), payment_refund_txn.amount);
        return Ok(flow
            .with_platform(platform)
            .with_merchant(merchant.clone(), merchant));
    }

    if charge.application_fee_account.is_some() {
        return Ok(flow.with_platform(Some(issued)));
    }

    Ok(flow.with_platform(Some(settled)))
}

/// Build the canonical refund
///
/// # Arguments
///
/// * `charge` - The refunded charge
/// * `refund` - Refund payload
/// * `legs` - Resolved settlement legs
/// * `context_id` - Event or lookup id reported if the refund id is missing
pub fn build_refund(
    charge: &Charge,
    refund: &RefundObject,
    legs: &RefundLegs,
    context_id: &str,
) -> Result<Refund, ReconciliationError> {
    let id = refund
        .id
        .clone()
        .ok_or_else(|| ReconciliationError::missing_correlation_id(context_id, "id"))?;

    Ok(Refund {
        id,
        charge_id: charge.id.clone(),
        flow_of_funds: build_refund_flow_of_funds(charge, refund, legs)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::charge_adapter::canonical_charge;
    use crate::processor::payload::ChargeObject;
    use crate::types::CurrencyCode;
    use serde_json::json;

    fn charge_from(value: serde_json::Value) -> Charge {
        let object: ChargeObject = serde_json::from_value(value).unwrap();
        canonical_charge(&object, "evt_test").unwrap()
    }

    fn txn(id: &str, currency: &str, amount: i64, net: i64) -> BalanceTransaction {
        BalanceTransaction {
            id: id.to_string(),
            amount,
            currency: CurrencyCode::new(currency),
            net,
            fee: amount - net,
        }
    }

    fn refund(id: &str, currency: &str, amount: i64) -> RefundObject {
        RefundObject {
            id: Some(id.to_string()),
            amount,
            currency: CurrencyCode::new(currency),
            charge: Some("ch_1".to_string()),
            status: Some("succeeded".to_string()),
            reason: None,
            balance_transaction: None,
            application_fee_refund: None,
            transfer_reversal: None,
        }
    }

    fn fee_refund(currency: &str, amount: i64) -> ApplicationFeeRefund {
        ApplicationFeeRefund {
            id: "fr_py_1".to_string(),
            amount,
            currency: CurrencyCode::new(currency),
            balance_transaction: None,
        }
    }

    fn destination_charge() -> Charge {
        charge_from(json!({
            "id": "ch_1", "amount": 10000, "currency": "usd",
            "transfer_data": {"destination": "acct_1", "amount": 9000}
        }))
    }

    #[test]
    fn test_destination_refund_without_fee_refund() {
        let charge = destination_charge();
        let legs = RefundLegs {
            refund_balance_txn: Some(txn("txn_re", "usd", -10000, -10000)),
            destination_payment_refund: Some(refund("pyr_1", "usd", 9000)),
            destination_payment_refund_balance_txn: Some(txn("txn_pyr", "usd", 9000, 9000)),
            ..Default::default()
        };

        let flow =
            build_refund_flow_of_funds(&charge, &refund("re_1", "usd", 10000), &legs).unwrap();

        assert_eq!(attribution(&charge, &legs), RefundAttribution::Destination);
        assert_eq!(flow.issued_amount, Some(Amount::new("usd", -10000)));
        assert_eq!(flow.settled_amount, Some(Amount::new("usd", -10000)));
        assert_eq!(flow.platform_amount, Some(Amount::new("usd", 1000)));
        assert_eq!(flow.merchant_gross_amount, Some(Amount::new("usd", 9000)));
        assert_eq!(flow.merchant_net_amount, Some(Amount::new("usd", 9000)));
    }

    #[test]
    fn test_fee_refund_branch_wins_over_destination_branch() {
        let charge = charge_from(json!({
            "id": "ch_1", "amount": 10000, "currency": "usd",
            "destination": "acct_1", "application_fee_amount": 1000
        }));
        // Also carries everything the plain destination branch needs
        let legs = RefundLegs {
            refund_balance_txn: Some(txn("txn_re", "usd", -10000, -10000)),
            application_fee_refund_balance_txn: Some(txn("txn_fr", "usd", -1000, -1000)),
            destination_payment_refund: Some(refund("pyr_1", "usd", 9000)),
            destination_payment_refund_balance_txn: Some(txn("txn_pyr", "usd", -10000, -10000)),
            destination_payment_application_fee_refund: Some(fee_refund("usd", 1000)),
        };

        let flow =
            build_refund_flow_of_funds(&charge, &refund("re_1", "usd", 10000), &legs).unwrap();

        assert_eq!(
            attribution(&charge, &legs),
            RefundAttribution::DestinationWithFeeRefund
        );
        assert_eq!(flow.platform_amount, Some(Amount::new("usd", -1000)));
        assert_eq!(flow.merchant_gross_amount, Some(Amount::new("usd", -10000)));
        assert_eq!(flow.merchant_net_amount, Some(Amount::new("usd", -9000)));
    }

    #[test]
    fn test_fee_refund_without_balance_transaction_is_insufficient_data() {
        let charge = charge_from(json!({
            "id": "ch_1", "amount": 10000, "currency": "usd",
            "destination": "acct_1", "application_fee_amount": 1000
        }));
        let legs = RefundLegs {
            refund_balance_txn: Some(txn("txn_re", "usd", -10000, -10000)),
            destination_payment_refund: Some(refund("pyr_1", "usd", 9000)),
            destination_payment_refund_balance_txn: Some(txn("txn_pyr", "usd", -10000, -10000)),
            destination_payment_application_fee_refund: Some(fee_refund("usd", 1000)),
            ..Default::default()
        };

        let result = build_refund_flow_of_funds(&charge, &refund("re_1", "usd", 10000), &legs);

        assert_eq!(
            attribution(&charge, &legs),
            RefundAttribution::DestinationWithFeeRefund
        );
        assert!(result.unwrap_err().is_insufficient_data());
    }

    #[test]
    fn test_fee_refund_currency_mismatch_fails() {
        let charge = destination_charge();
        let legs = RefundLegs {
            refund_balance_txn: Some(txn("txn_re", "usd", -10000, -10000)),
            destination_payment_refund_balance_txn: Some(txn("txn_pyr", "usd", -10000, -10000)),
            destination_payment_application_fee_refund: Some(fee_refund("eur", 900)),
            ..Default::default()
        };

        let result = build_refund_flow_of_funds(&charge, &refund("re_1", "usd", 10000), &legs);

        assert!(matches!(
            result,
            Err(ReconciliationError::CurrencyMismatch { .. })
        ));
    }

    #[test]
    fn test_on_behalf_of_suppresses_platform_amount() {
        let charge = charge_from(json!({
            "id": "ch_1", "amount": 10000, "currency": "usd",
            "transfer_data": {"destination": "acct_1", "amount": 9000},
            "on_behalf_of": "acct_1"
        }));
        let legs = RefundLegs {
            refund_balance_txn: Some(txn("txn_re", "usd", -10000, -10000)),
            destination_payment_refund_balance_txn: Some(txn("txn_pyr", "usd", -9000, -9000)),
            ..Default::default()
        };

        let flow =
            build_refund_flow_of_funds(&charge, &refund("re_1", "usd", 10000), &legs).unwrap();

        assert_eq!(flow.platform_amount, None);
        assert_eq!(flow.merchant_gross_amount, Some(Amount::new("usd", -9000)));
    }

    #[test]
    fn test_application_fee_account_refund_goes_to_platform() {
        let charge = charge_from(json!({
            "id": "ch_1", "amount": 5000, "currency": "usd",
            "application_fee": {"id": "fee_1", "amount": 500, "currency": "usd", "account": "acct_1"}
        }));
        let legs = RefundLegs {
            refund_balance_txn: Some(txn("txn_re", "usd", -2500, -2500)),
            ..Default::default()
        };

        let flow =
            build_refund_flow_of_funds(&charge, &refund("re_1", "usd", 2500), &legs).unwrap();

        assert_eq!(
            attribution(&charge, &legs),
            RefundAttribution::ApplicationFeeAccount
        );
        assert_eq!(flow.platform_amount, Some(Amount::new("usd", -2500)));
        assert_eq!(flow.merchant_gross_amount, None);
    }

    #[test]
    fn test_simple_refund_platform_keeps_settled() {
        let charge = charge_from(json!({"id": "ch_1", "amount": 5000, "currency": "eur"}));
        let legs = RefundLegs {
            refund_balance_txn: Some(txn("txn_re", "usd", -5400, -5400)),
            ..Default::default()
        };

        let refund = build_refund(&charge, &refund("re_1", "eur", 5000), &legs, "re_1").unwrap();

        assert_eq!(refund.id, "re_1");
        assert_eq!(refund.charge_id, "ch_1");
        assert_eq!(
            refund.flow_of_funds.platform_amount,
            Some(Amount::new("usd", -5400))
        );
    }

    #[test]
    fn test_missing_refund_balance_transaction_is_insufficient_data() {
        let charge = charge_from(json!({"id": "ch_1", "amount": 5000, "currency": "usd"}));
        let result = build_refund_flow_of_funds(
            &charge,
            &refund("re_1", "usd", 5000),
            &RefundLegs::default(),
        );
        assert!(result.unwrap_err().is_insufficient_data());
    }
}
