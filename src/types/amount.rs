//! Currency-tagged amounts
//!
//! An [`Amount`] is an immutable `(currency, cents)` pair. Amounts of different
//! currencies are never combined implicitly: every combining operation checks
//! the currencies first and fails with `CurrencyMismatch` when they differ.

use super::error::ReconciliationError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// ISO 4217 currency code, normalized to lowercase as the processor sends it
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct CurrencyCode(String);

impl CurrencyCode {
    pub fn new(code: impl AsRef<str>) -> Self {
        CurrencyCode(code.as_ref().trim().to_ascii_lowercase())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for CurrencyCode {
    fn from(code: String) -> Self {
        CurrencyCode::new(code)
    }
}

impl From<&str> for CurrencyCode {
    fn from(code: &str) -> Self {
        CurrencyCode::new(code)
    }
}

impl From<CurrencyCode> for String {
    fn from(code: CurrencyCode) -> Self {
        code.0
    }
}

impl fmt::Display for CurrencyCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.to_ascii_uppercase())
    }
}

/// A number of minor units (cents) in one currency
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Amount {
    pub currency: CurrencyCode,
    pub cents: i64,
}

impl Amount {
    pub fn new(currency: impl Into<CurrencyCode>, cents: i64) -> Self {
        Amount {
            currency: currency.into(),
            cents,
        }
    }

    /// Fail with `CurrencyMismatch` unless both amounts share a currency
    ///
    /// # Arguments
    ///
    /// * `other` - The amount to compare against
    /// * `context` - Human-readable location used in the error message
    pub fn ensure_same_currency(
        &self,
        other: &Amount,
        context: &str,
    ) -> Result<(), ReconciliationError> {
        if self.currency != other.currency {
            return Err(ReconciliationError::currency_mismatch(
                context,
                self.currency.as_str(),
                other.currency.as_str(),
            ));
        }
        Ok(())
    }

    /// Sum of two amounts of the same currency
    pub fn checked_add(&self, other: &Amount) -> Result<Amount, ReconciliationError> {
        self.ensure_same_currency(other, "amount addition")?;
        let cents = self
            .cents
            .checked_add(other.cents)
            .ok_or_else(|| ReconciliationError::arithmetic_overflow("amount addition"))?;
        Ok(Amount::new(self.currency.clone(), cents))
    }

    /// Difference of two amounts of the same currency
    pub fn checked_sub(&self, other: &Amount) -> Result<Amount, ReconciliationError> {
        self.ensure_same_currency(other, "amount subtraction")?;
        let cents = self
            .cents
            .checked_sub(other.cents)
            .ok_or_else(|| ReconciliationError::arithmetic_overflow("amount subtraction"))?;
        Ok(Amount::new(self.currency.clone(), cents))
    }

    /// The same amount with the opposite sign
    pub fn checked_neg(&self) -> Result<Amount, ReconciliationError> {
        let cents = self
            .cents
            .checked_neg()
            .ok_or_else(|| ReconciliationError::arithmetic_overflow("amount negation"))?;
        Ok(Amount::new(self.currency.clone(), cents))
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.cents, self.currency)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("usd", "usd")]
    #[case("USD", "usd")]
    #[case(" Eur ", "eur")]
    fn test_currency_code_normalizes(#[case] raw: &str, #[case] expected: &str) {
        assert_eq!(CurrencyCode::new(raw).as_str(), expected);
    }

    #[test]
    fn test_currency_code_deserializes_normalized() {
        let code: CurrencyCode = serde_json::from_str("\"GBP\"").unwrap();
        assert_eq!(code, CurrencyCode::new("gbp"));
        assert_eq!(serde_json::to_string(&code).unwrap(), "\"gbp\"");
    }

    #[test]
    fn test_structural_equality() {
        assert_eq!(Amount::new("usd", 100), Amount::new("USD", 100));
        assert_ne!(Amount::new("usd", 100), Amount::new("eur", 100));
        assert_ne!(Amount::new("usd", 100), Amount::new("usd", 101));
    }

    #[test]
    fn test_checked_add_same_currency() {
        let sum = Amount::new("usd", -9000)
            .checked_add(&Amount::new("usd", 450))
            .unwrap();
        assert_eq!(sum, Amount::new("usd", -8550));
    }

    #[test]
    fn test_checked_sub_same_currency() {
        let diff = Amount::new("usd", 10000)
            .checked_sub(&Amount::new("usd", 9000))
            .unwrap();
        assert_eq!(diff, Amount::new("usd", 1000));
    }

    #[rstest]
    #[case::add(Amount::new("usd", 1).checked_add(&Amount::new("eur", 1)))]
    #[case::sub(Amount::new("usd", 1).checked_sub(&Amount::new("eur", 1)))]
    fn test_mismatched_currency_fails(#[case] result: Result<Amount, ReconciliationError>) {
        assert!(matches!(
            result,
            Err(ReconciliationError::CurrencyMismatch { .. })
        ));
    }

    #[test]
    fn test_overflow_is_reported() {
        let result = Amount::new("usd", i64::MAX).checked_add(&Amount::new("usd", 1));
        assert!(matches!(
            result,
            Err(ReconciliationError::ArithmeticOverflow { .. })
        ));
        assert!(Amount::new("usd", i64::MIN).checked_neg().is_err());
    }

    #[test]
    fn test_display() {
        assert_eq!(Amount::new("usd", -1250).to_string(), "-1250 USD");
    }
}
