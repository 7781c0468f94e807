//! In-memory processor backed by a JSON snapshot
//!
//! `SandboxProcessor` implements both processor capabilities over a snapshot
//! of platform and connected-account objects. Created objects get ids derived
//! from their idempotency key, so replaying a create returns the same object
//! and runs are reproducible. Failures can be injected per operation and
//! object id, e.g. `"retrieve_transfer:tr_1": "transient"`.

use crate::processor::client::{
    ChargeProcessorClient, MerchantAccountLookup, RefundParams, TransferParams,
    TransferReversalParams,
};
use crate::processor::payload::{
    ApplicationFeeRefund, BalanceTransaction, ChargeObject, Expandable, RefundObject, Transfer,
    TransferReversal,
};
use crate::types::{CurrencyCode, MerchantAccount, ReconciliationError};
use async_trait::async_trait;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use tracing::debug;

const PLATFORM_SCOPE: &str = "platform";

/// Objects visible from one scope (the platform or one connected account)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScopeSnapshot {
    #[serde(default)]
    pub charges: BTreeMap<String, ChargeObject>,
    #[serde(default)]
    pub balance_transactions: BTreeMap<String, BalanceTransaction>,
    #[serde(default)]
    pub transfers: BTreeMap<String, Transfer>,
    #[serde(default)]
    pub transfer_reversals: BTreeMap<String, TransferReversal>,
    #[serde(default)]
    pub refunds: BTreeMap<String, RefundObject>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InjectedFailure {
    /// Fails with a transient error on every call
    Transient,
    /// Fails with a transient error once, then succeeds
    TransientOnce,
    /// Rejected by the processor on every call
    Terminal,
}

/// Serialized sandbox state
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SandboxSnapshot {
    #[serde(default)]
    pub platform: ScopeSnapshot,
    #[serde(default)]
    pub accounts: BTreeMap<String, ScopeSnapshot>,
    #[serde(default)]
    pub merchants: BTreeMap<String, MerchantAccount>,
    /// `"{operation}:{object id}"` to failure mode
    #[serde(default)]
    pub failures: BTreeMap<String, InjectedFailure>,
}

pub struct SandboxProcessor {
    scopes: DashMap<String, ScopeSnapshot>,
    merchants: DashMap<String, MerchantAccount>,
    failures: DashMap<String, InjectedFailure>,
    calls: DashMap<String, usize>,
}

fn scope_key(scope: Option<&str>) -> String {
    scope.unwrap_or(PLATFORM_SCOPE).to_string()
}

fn not_found(operation: &str, kind: &str, id: &str) -> ReconciliationError {
    ReconciliationError::terminal(operation, format!("No such {kind}: '{id}'"))
}

/// `amount * numerator / denominator`, rounded toward zero
fn pro_rata(amount: i64, numerator: i64, denominator: i64) -> Result<i64, ReconciliationError> {
    if denominator == 0 {
        return Ok(0);
    }
    let scaled = i128::from(amount) * i128::from(numerator) / i128::from(denominator);
    i64::try_from(scaled).map_err(|_| ReconciliationError::arithmetic_overflow("pro rata share"))
}

impl SandboxProcessor {
    pub fn from_snapshot(snapshot: SandboxSnapshot) -> Self {
        let scopes = DashMap::new();
        scopes.insert(PLATFORM_SCOPE.to_string(), snapshot.platform);
        for (account, objects) in snapshot.accounts {
            scopes.insert(account, objects);
        }

        SandboxProcessor {
            scopes,
            merchants: snapshot.merchants.into_iter().collect(),
            failures: snapshot.failures.into_iter().collect(),
            calls: DashMap::new(),
        }
    }

    pub fn from_json(json: &str) -> Result<Self, ReconciliationError> {
        let snapshot: SandboxSnapshot = serde_json::from_str(json)?;
        Ok(Self::from_snapshot(snapshot))
    }

    /// Load a snapshot file
    ///
    /// # Errors
    ///
    /// Returns `IoError` if the file cannot be read and `ParseError` if it is
    /// not a valid snapshot.
    pub fn load(path: &Path) -> Result<Self, ReconciliationError> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json(&json)
    }

    pub fn inject_failure(&self, operation: &str, id: &str, failure: InjectedFailure) {
        self.failures.insert(format!("{operation}:{id}"), failure);
    }

    /// How many times `operation` was called, failed calls included
    pub fn call_count(&self, operation: &str) -> usize {
        self.calls.get(operation).map(|count| *count).unwrap_or(0)
    }

    fn begin(&self, operation: &str, id: &str) -> Result<(), ReconciliationError> {
        *self.calls.entry(operation.to_string()).or_insert(0) += 1;

        let key = format!("{operation}:{id}");
        let failure = self.failures.get(&key).map(|failure| *failure);
        match failure {
            None => Ok(()),
            Some(InjectedFailure::Transient) => {
                Err(ReconciliationError::transient(operation, "injected transient failure"))
            }
            Some(InjectedFailure::TransientOnce) => {
                self.failures.remove(&key);
                Err(ReconciliationError::transient(operation, "injected transient failure"))
            }
            Some(InjectedFailure::Terminal) => {
                Err(ReconciliationError::terminal(operation, "injected processor rejection"))
            }
        }
    }

    fn read<T>(
        &self,
        scope: Option<&str>,
        f: impl FnOnce(&ScopeSnapshot) -> Option<T>,
    ) -> Option<T> {
        self.scopes.get(&scope_key(scope)).and_then(|objects| f(objects.value()))
    }

    fn write<T>(&self, scope: Option<&str>, f: impl FnOnce(&mut ScopeSnapshot) -> T) -> T {
        let mut objects = self
            .scopes
            .entry(scope_key(scope))
            .or_insert_with(ScopeSnapshot::default);
        f(objects.value_mut())
    }

    fn expand_txn(
        &self,
        txn: Option<Expandable<BalanceTransaction>>,
        scope: Option<&str>,
    ) -> Option<Expandable<BalanceTransaction>> {
        match txn {
            Some(Expandable::Id(id)) => {
                let expanded = self
                    .read(scope, |objects| objects.balance_transactions.get(&id).cloned())
                    .map(Expandable::Object);
                Some(expanded.unwrap_or(Expandable::Id(id)))
            }
            other => other,
        }
    }

    fn find_charge(&self, charge_id: &str, scope: Option<&str>) -> Option<ChargeObject> {
        self.read(scope, |objects| objects.charges.get(charge_id).cloned())
    }

    fn find_txn(&self, id: &str, scope: Option<&str>) -> Option<BalanceTransaction> {
        self.read(scope, |objects| objects.balance_transactions.get(id).cloned())
    }

    fn record_txn(&self, scope: Option<&str>, txn: BalanceTransaction) {
        self.write(scope, |objects| {
            objects.balance_transactions.insert(txn.id.clone(), txn);
        });
    }

    /// Refund the share of a charge's application fee, recorded on the platform
    fn refund_application_fee(
        &self,
        charge: &ChargeObject,
        numerator: i64,
        denominator: i64,
        key: &str,
    ) -> Result<Option<ApplicationFeeRefund>, ReconciliationError> {
        let Some(fee) = charge.application_fee.as_ref().and_then(Expandable::as_object) else {
            return Ok(None);
        };

        let amount = pro_rata(fee.amount, numerator, denominator)?;
        let txn_id = format!("txn_fr_{key}");
        self.record_txn(
            None,
            BalanceTransaction {
                id: txn_id.clone(),
                amount: -amount,
                currency: fee.currency.clone(),
                net: -amount,
                fee: 0,
            },
        );

        Ok(Some(ApplicationFeeRefund {
            id: format!("fr_{key}"),
            amount,
            currency: fee.currency.clone(),
            balance_transaction: Some(Expandable::Id(txn_id)),
        }))
    }

    fn reverse_transfer(
        &self,
        operation: &str,
        transfer_id: &str,
        amount: i64,
        refund_application_fee: bool,
        key: &str,
    ) -> Result<TransferReversal, ReconciliationError> {
        let reversal_id = format!("trr_{key}");
        if let Some(existing) =
            self.read(None, |objects| objects.transfer_reversals.get(&reversal_id).cloned())
        {
            return Ok(existing);
        }

        let transfer = self
            .read(None, |objects| objects.transfers.get(transfer_id).cloned())
            .ok_or_else(|| not_found(operation, "transfer", transfer_id))?;
        if amount <= 0 || amount > transfer.amount - transfer.amount_reversed {
            return Err(ReconciliationError::terminal(
                operation,
                format!("Reversal of {amount} exceeds what remains on transfer '{transfer_id}'"),
            ));
        }
        let destination = transfer.destination.clone().ok_or_else(|| {
            ReconciliationError::terminal(
                operation,
                format!("Transfer '{transfer_id}' has no destination"),
            )
        })?;

        let payment_refund_id = format!("pyr_{key}");
        let payment_refund_txn = format!("txn_pyr_{key}");
        self.record_txn(
            Some(&destination),
            BalanceTransaction {
                id: payment_refund_txn.clone(),
                amount: -amount,
                currency: transfer.currency.clone(),
                net: -amount,
                fee: 0,
            },
        );
        let payment_refund = RefundObject {
            id: Some(payment_refund_id.clone()),
            amount,
            currency: transfer.currency.clone(),
            charge: transfer.destination_payment.clone(),
            status: Some("succeeded".to_string()),
            reason: None,
            balance_transaction: Some(Expandable::Id(payment_refund_txn)),
            application_fee_refund: None,
            transfer_reversal: None,
        };
        self.write(Some(&destination), |objects| {
            objects.refunds.insert(payment_refund_id.clone(), payment_refund);
        });

        let fee_refund = match (refund_application_fee, transfer.source_transaction.as_deref()) {
            (true, Some(source)) => match self.find_charge(source, None) {
                Some(charge) => self.refund_application_fee(&charge, amount, transfer.amount, key)?,
                None => None,
            },
            _ => None,
        };

        let reversal = TransferReversal {
            id: reversal_id.clone(),
            amount,
            currency: transfer.currency.clone(),
            transfer: transfer_id.to_string(),
            destination_payment_refund: Some(payment_refund_id),
            application_fee_refund: fee_refund.map(Expandable::Object),
        };

        self.write(None, |objects| {
            if let Some(stored) = objects.transfers.get_mut(transfer_id) {
                stored.amount_reversed += amount;
            }
            objects.transfer_reversals.insert(reversal_id, reversal.clone());
        });
        debug!(transfer_id, amount, "Sandbox reversed transfer");
        Ok(reversal)
    }
}

#[async_trait]
impl ChargeProcessorClient for SandboxProcessor {
    async fn retrieve_charge(
        &self,
        charge_id: &str,
        scope: Option<&str>,
    ) -> Result<ChargeObject, ReconciliationError> {
        self.begin("retrieve_charge", charge_id)?;
        let mut charge = self
            .find_charge(charge_id, scope)
            .ok_or_else(|| not_found("retrieve_charge", "charge", charge_id))?;

        charge.balance_transaction = self.expand_txn(charge.balance_transaction.take(), scope);
        if let Some(Expandable::Object(fee)) = charge.application_fee.as_mut() {
            fee.balance_transaction = self.expand_txn(fee.balance_transaction.take(), None);
        }
        Ok(charge)
    }

    async fn retrieve_balance_transaction(
        &self,
        id: &str,
        scope: Option<&str>,
    ) -> Result<BalanceTransaction, ReconciliationError> {
        self.begin("retrieve_balance_transaction", id)?;
        self.find_txn(id, scope)
            .ok_or_else(|| not_found("retrieve_balance_transaction", "balance transaction", id))
    }

    async fn retrieve_transfer(&self, transfer_id: &str) -> Result<Transfer, ReconciliationError> {
        self.begin("retrieve_transfer", transfer_id)?;
        self.read(None, |objects| objects.transfers.get(transfer_id).cloned())
            .ok_or_else(|| not_found("retrieve_transfer", "transfer", transfer_id))
    }

    async fn create_transfer_reversal(
        &self,
        params: TransferReversalParams,
    ) -> Result<TransferReversal, ReconciliationError> {
        self.begin("create_transfer_reversal", &params.transfer_id)?;
        self.reverse_transfer(
            "create_transfer_reversal",
            &params.transfer_id,
            params.amount,
            params.refund_application_fee,
            &params.idempotency_key,
        )
    }

    async fn create_transfer(
        &self,
        params: TransferParams,
    ) -> Result<Transfer, ReconciliationError> {
        self.begin("create_transfer", &params.destination)?;
        let key = &params.idempotency_key;
        let transfer_id = format!("tr_{key}");
        if let Some(existing) =
            self.read(None, |objects| objects.transfers.get(&transfer_id).cloned())
        {
            return Ok(existing);
        }
        if params.amount <= 0 {
            return Err(ReconciliationError::terminal(
                "create_transfer",
                format!("Invalid transfer amount {}", params.amount),
            ));
        }

        let payment_id = format!("py_{key}");
        let payment_txn = format!("txn_py_{key}");
        self.record_txn(
            Some(&params.destination),
            BalanceTransaction {
                id: payment_txn.clone(),
                amount: params.amount,
                currency: params.currency.clone(),
                net: params.amount,
                fee: 0,
            },
        );
        let payment = ChargeObject {
            id: Some(payment_id.clone()),
            amount: params.amount,
            currency: params.currency.clone(),
            amount_refunded: 0,
            refunded: false,
            status: Some("succeeded".to_string()),
            destination: None,
            on_behalf_of: None,
            transfer_data: None,
            application_fee: None,
            application_fee_amount: None,
            balance_transaction: Some(Expandable::Id(payment_txn)),
            transfer: None,
            payment_intent: None,
            metadata: BTreeMap::new(),
        };
        self.write(Some(&params.destination), |objects| {
            objects.charges.insert(payment_id.clone(), payment);
        });

        let transfer = Transfer {
            id: transfer_id.clone(),
            amount: params.amount,
            currency: params.currency.clone(),
            amount_reversed: 0,
            destination: Some(params.destination.clone()),
            destination_payment: Some(payment_id),
            source_transaction: None,
        };
        self.write(None, |objects| {
            objects.transfers.insert(transfer_id, transfer.clone());
        });
        Ok(transfer)
    }

    async fn retrieve_refund(
        &self,
        refund_id: &str,
        scope: Option<&str>,
    ) -> Result<RefundObject, ReconciliationError> {
        self.begin("retrieve_refund", refund_id)?;
        let mut refund = self
            .read(scope, |objects| objects.refunds.get(refund_id).cloned())
            .ok_or_else(|| not_found("retrieve_refund", "refund", refund_id))?;
        refund.balance_transaction = self.expand_txn(refund.balance_transaction.take(), scope);
        Ok(refund)
    }

    async fn create_refund(
        &self,
        params: RefundParams,
    ) -> Result<RefundObject, ReconciliationError> {
        const OPERATION: &str = "create_refund";
        self.begin(OPERATION, &params.charge_id)?;
        let scope = params.scope.as_deref();
        let key = &params.idempotency_key;
        let refund_id = format!("re_{key}");
        if let Some(existing) =
            self.read(scope, |objects| objects.refunds.get(&refund_id).cloned())
        {
            return Ok(existing);
        }

        let charge = self
            .find_charge(&params.charge_id, scope)
            .ok_or_else(|| not_found(OPERATION, "charge", &params.charge_id))?;
        let remaining = charge.amount - charge.amount_refunded;
        if remaining <= 0 {
            return Err(ReconciliationError::terminal(
                OPERATION,
                format!("Charge '{}' has already been refunded", params.charge_id),
            ));
        }
        let amount = params.amount.unwrap_or(remaining);
        if amount <= 0 || amount > remaining {
            return Err(ReconciliationError::terminal(
                OPERATION,
                format!("Refund amount {amount} is greater than the unrefunded amount {remaining}"),
            ));
        }

        // Settle in the charge's settlement currency, pro rata
        let charge_txn = match charge.balance_transaction.as_ref() {
            Some(Expandable::Object(txn)) => Some(txn.clone()),
            Some(Expandable::Id(id)) => self.find_txn(id, scope),
            None => None,
        };
        let (settled_currency, settled) = match charge_txn {
            Some(txn) => (txn.currency.clone(), pro_rata(txn.amount, amount, charge.amount)?),
            None => (charge.currency.clone(), amount),
        };
        let refund_txn = format!("txn_re_{key}");
        self.record_txn(
            scope,
            BalanceTransaction {
                id: refund_txn.clone(),
                amount: -settled,
                currency: settled_currency,
                net: -settled,
                fee: 0,
            },
        );

        let mut transfer_reversal = None;
        let mut application_fee_refund = None;
        match (params.reverse_transfer, charge.transfer.as_deref()) {
            (true, Some(transfer_id)) => {
                let transfer_amount = self
                    .read(None, |objects| objects.transfers.get(transfer_id).map(|t| t.amount))
                    .ok_or_else(|| not_found(OPERATION, "transfer", transfer_id))?;
                let reversal = self.reverse_transfer(
                    OPERATION,
                    transfer_id,
                    pro_rata(transfer_amount, amount, charge.amount)?,
                    params.refund_application_fee,
                    key,
                )?;
                application_fee_refund = reversal.application_fee_refund.clone();
                transfer_reversal = Some(Expandable::Object(reversal));
            }
            _ if params.refund_application_fee => {
                application_fee_refund = self
                    .refund_application_fee(&charge, amount, charge.amount, key)?
                    .map(Expandable::Object);
            }
            _ => {}
        }

        let refund = RefundObject {
            id: Some(refund_id.clone()),
            amount,
            currency: charge.currency.clone(),
            charge: Some(params.charge_id.clone()),
            status: Some("succeeded".to_string()),
            reason: params.reason.clone(),
            balance_transaction: Some(Expandable::Id(refund_txn)),
            application_fee_refund,
            transfer_reversal,
        };

        self.write(scope, |objects| {
            if let Some(stored) = objects.charges.get_mut(&params.charge_id) {
                stored.amount_refunded += amount;
                stored.refunded = stored.amount_refunded >= stored.amount;
            }
            objects.refunds.insert(refund_id, refund.clone());
        });
        Ok(refund)
    }
}

#[async_trait]
impl MerchantAccountLookup for SandboxProcessor {
    async fn resolve(
        &self,
        merchant_id: &str,
    ) -> Result<Option<MerchantAccount>, ReconciliationError> {
        self.begin("resolve_merchant", merchant_id)?;
        Ok(self.merchants.get(merchant_id).map(|merchant| merchant.value().clone()))
    }
}
