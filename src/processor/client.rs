//! Processor capabilities consumed by the reconciler
//!
//! Both traits are implemented by stateless services that are safe to share
//! between event-processing workers. Every call taking a `scope` runs against
//! that connected account; `None` means platform scope.

use crate::processor::payload::{
    BalanceTransaction, ChargeObject, RefundObject, Transfer, TransferReversal,
};
use crate::types::{CurrencyCode, MerchantAccount, ReconciliationError};
use async_trait::async_trait;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferReversalParams {
    pub transfer_id: String,
    pub amount: i64,
    /// Also refund the application fee collected on the transfer's charge
    pub refund_application_fee: bool,
    pub idempotency_key: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferParams {
    pub destination: String,
    pub amount: i64,
    pub currency: CurrencyCode,
    pub idempotency_key: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefundParams {
    pub charge_id: String,
    /// `None` refunds whatever is left on the charge
    pub amount: Option<i64>,
    pub reason: Option<String>,
    pub reverse_transfer: bool,
    pub refund_application_fee: bool,
    pub idempotency_key: String,
    pub scope: Option<String>,
}

/// Calls against the external card processor
#[async_trait]
pub trait ChargeProcessorClient: Send + Sync {
    /// Charge with its balance transaction and application fee expanded
    async fn retrieve_charge(
        &self,
        charge_id: &str,
        scope: Option<&str>,
    ) -> Result<ChargeObject, ReconciliationError>;

    async fn retrieve_balance_transaction(
        &self,
        id: &str,
        scope: Option<&str>,
    ) -> Result<BalanceTransaction, ReconciliationError>;

    async fn retrieve_transfer(&self, transfer_id: &str) -> Result<Transfer, ReconciliationError>;

    async fn create_transfer_reversal(
        &self,
        params: TransferReversalParams,
    ) -> Result<TransferReversal, ReconciliationError>;

    async fn create_transfer(
        &self,
        params: TransferParams,
    ) -> Result<Transfer, ReconciliationError>;

    async fn retrieve_refund(
        &self,
        refund_id: &str,
        scope: Option<&str>,
    ) -> Result<RefundObject, ReconciliationError>;

    async fn create_refund(
        &self,
        params: RefundParams,
    ) -> Result<RefundObject, ReconciliationError>;
}

/// Resolves merchants to their processor account and funds holder
#[async_trait]
pub trait MerchantAccountLookup: Send + Sync {
    async fn resolve(&self, merchant_id: &str)
        -> Result<Option<MerchantAccount>, ReconciliationError>;
}
