//! The five-leg settlement breakdown of a charge, refund or dispute transition

use super::amount::Amount;
use super::error::ReconciliationError;
use serde::{Deserialize, Serialize};

/// Where the money of one charge/refund/dispute transition sits
///
/// Every slot is optional: merchant legs are absent for charges without a
/// destination, and the platform leg is absent for on-behalf-of refunds.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct FlowOfFunds {
    /// Charged/refunded from the buyer's instrument, buyer-facing currency
    pub issued_amount: Option<Amount>,

    /// After processor settlement, in the settlement currency
    pub settled_amount: Option<Amount>,

    /// The platform's take, in the currency the fee was computed in
    pub platform_amount: Option<Amount>,

    /// Credited to/debited from the connected account before fee reversal
    pub merchant_gross_amount: Option<Amount>,

    /// Merchant amount after the fee reversal tied to the same event
    pub merchant_net_amount: Option<Amount>,
}

impl FlowOfFunds {
    /// Flow with issued and settled legs only
    pub fn new(issued: Amount, settled: Amount) -> Self {
        FlowOfFunds {
            issued_amount: Some(issued),
            settled_amount: Some(settled),
            ..Default::default()
        }
    }

    /// Non-split flow: the platform keeps everything that settled
    pub fn simple(issued: Amount, settled: Amount) -> Self {
        let platform = settled.clone();
        FlowOfFunds::new(issued, settled).with_platform(Some(platform))
    }

    pub fn with_platform(mut self, platform: Option<Amount>) -> Self {
        self.platform_amount = platform;
        self
    }

    pub fn with_merchant(mut self, gross: Amount, net: Amount) -> Self {
        self.merchant_gross_amount = Some(gross);
        self.merchant_net_amount = Some(net);
        self
    }

    /// All five legs with their names, in a fixed order
    pub fn legs(&self) -> [(&'static str, Option<&Amount>); 5] {
        [
            ("issued", self.issued_amount.as_ref()),
            ("settled", self.settled_amount.as_ref()),
            ("platform", self.platform_amount.as_ref()),
            ("merchant_gross", self.merchant_gross_amount.as_ref()),
            ("merchant_net", self.merchant_net_amount.as_ref()),
        ]
    }

    /// Check that every leg present in both flows uses the same currency
    ///
    /// Used to compare a refund's flow with the flow of the charge it refunds.
    ///
    /// # Errors
    ///
    /// Returns `CurrencyMismatch` naming the first offending leg.
    pub fn ensure_consistent_with(&self, other: &FlowOfFunds) -> Result<(), ReconciliationError> {
        for ((leg, mine), (_, theirs)) in self.legs().into_iter().zip(other.legs()) {
            if let (Some(mine), Some(theirs)) = (mine, theirs) {
                mine.ensure_same_currency(theirs, &format!("{} leg", leg))?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_simple_flow_platform_keeps_settled() {
        let flow = FlowOfFunds::simple(Amount::new("eur", 1000), Amount::new("usd", 1100));
        assert_eq!(flow.platform_amount, Some(Amount::new("usd", 1100)));
        assert_eq!(flow.merchant_gross_amount, None);
        assert_eq!(flow.merchant_net_amount, None);
    }

    #[test]
    fn test_consistent_flows_pass() {
        let charge = FlowOfFunds::new(Amount::new("usd", 10000), Amount::new("usd", 10000))
            .with_platform(Some(Amount::new("usd", 1000)))
            .with_merchant(Amount::new("usd", 9000), Amount::new("usd", 9000));
        let refund = FlowOfFunds::new(Amount::new("usd", -10000), Amount::new("usd", -10000))
            .with_merchant(Amount::new("usd", -9000), Amount::new("usd", -9000));

        assert!(charge.ensure_consistent_with(&refund).is_ok());
    }

    #[test]
    fn test_mismatched_merchant_net_leg_fails() {
        let charge = FlowOfFunds::new(Amount::new("usd", 10000), Amount::new("usd", 10000))
            .with_merchant(Amount::new("usd", 9000), Amount::new("usd", 9000));
        let refund = FlowOfFunds::new(Amount::new("usd", -10000), Amount::new("usd", -10000))
            .with_merchant(Amount::new("usd", -9000), Amount::new("cad", -9000));

        let error = charge.ensure_consistent_with(&refund).unwrap_err();
        assert_eq!(
            error,
            ReconciliationError::currency_mismatch("merchant_net leg", "usd", "cad")
        );
    }

    #[test]
    fn test_absent_legs_are_not_compared() {
        let charge = FlowOfFunds::simple(Amount::new("usd", 100), Amount::new("usd", 100));
        let refund = FlowOfFunds::new(Amount::new("usd", -100), Amount::new("usd", -100));
        assert!(charge.ensure_consistent_with(&refund).is_ok());
    }
}
