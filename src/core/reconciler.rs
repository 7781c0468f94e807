//! Reconciliation orchestrator
//!
//! The only component with side effects. For each inbound notification the
//! `Reconciler`:
//!
//! 1. returns the recorded outcome if the event id was already processed
//! 2. resolves the merchant and, for disputes, the disputed charge (unless
//!    the dispute closed because the charge was refunded)
//! 3. classifies the notification
//! 4. computes the flow of funds, issuing transfer reversals and compensating
//!    transfers where a dispute transition needs them
//! 5. records the outcome under the event id
//!
//! Processor lookups go through the retry policy. For merchants migrated to
//! direct connect, scoped lookups try the connected account first and fall
//! back to platform scope on any error, since a charge may predate the
//! migration.
//!
//! Failure handling:
//! - construction errors (`CurrencyMismatch`, missing correlation ids) and
//!   failed side effects abort the event; it is not recorded and stays
//!   eligible for redelivery
//! - failed secondary lookups degrade to `InsufficientData`: the event is
//!   published without a flow of funds and flagged `needs_reconciliation`

use crate::core::charge_adapter::{build_charge_flow_of_funds, canonical_charge};
use crate::core::dispute_adapter::{
    build_dispute_reinstated_flow, build_dispute_withdrawn_flow, transfer_reversal_amount,
    DisputeReinstatementLegs, DisputeWithdrawalLegs,
};
use crate::core::event_classifier::{
    classify, is_refund_closure, Classification, ClassifiedEvent, EventKind, FlowRequirement,
};
use crate::core::event_store::{EventStore, ProcessedEvent};
use crate::core::refund_adapter::{build_refund, RefundLegs};
use crate::core::retry::RetryPolicy;
use crate::processor::client::{
    ChargeProcessorClient, MerchantAccountLookup, RefundParams, TransferParams,
    TransferReversalParams,
};
use crate::processor::payload::{
    BalanceTransaction, ChargeObject, DisputeObject, Expandable, ProcessorEvent, RefundObject,
    Transfer,
};
use crate::settings::ReconcilerSettings;
use crate::types::{
    Charge, ChargeEventType, ChargeTopology, DiscardReason, FlowOfFunds, LedgerEvent,
    MerchantAccount, ReconciliationError, Refund,
};
use std::future::Future;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Result of handling one notification
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    /// First successful processing; publish to the ledger
    Published(LedgerEvent),
    /// Redelivery of an already published event; do not publish again
    Duplicate(LedgerEvent),
    Discarded(DiscardReason),
}

impl Outcome {
    pub fn event(&self) -> Option<&LedgerEvent> {
        match self {
            Outcome::Published(event) | Outcome::Duplicate(event) => Some(event),
            Outcome::Discarded(_) => None,
        }
    }
}

/// Request to refund a charge through the processor
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefundRequest {
    pub charge_id: String,
    /// `None` refunds the rest of the charge
    pub amount: Option<i64>,
    pub reason: Option<String>,
    pub merchant_id: Option<String>,
    pub idempotency_key: String,
}

pub struct Reconciler {
    settings: ReconcilerSettings,
    retry: RetryPolicy,
    processor: Arc<dyn ChargeProcessorClient>,
    merchants: Arc<dyn MerchantAccountLookup>,
    store: Arc<EventStore>,
}

impl Reconciler {
    pub fn new(
        settings: ReconcilerSettings,
        processor: Arc<dyn ChargeProcessorClient>,
        merchants: Arc<dyn MerchantAccountLookup>,
        store: Arc<EventStore>,
    ) -> Self {
        Reconciler {
            retry: RetryPolicy::from(&settings.retry),
            settings,
            processor,
            merchants,
            store,
        }
    }

    pub fn settings(&self) -> &ReconcilerSettings {
        &self.settings
    }

    /// Process one inbound notification
    ///
    /// # Arguments
    ///
    /// * `event` - Validated processor notification
    ///
    /// # Returns
    ///
    /// * `Ok(Outcome)` - The event was processed now or earlier
    /// * `Err(ReconciliationError)` - Processing aborted; the event was not
    ///   recorded and may be retried
    pub async fn handle(&self, event: &ProcessorEvent) -> Result<Outcome, ReconciliationError> {
        if let Some(previous) = self.store.processed(&event.id) {
            debug!(event_id = %event.id, "Event already processed");
            return Ok(match previous {
                ProcessedEvent::Published(ledger_event) => Outcome::Duplicate(ledger_event),
                ProcessedEvent::Discarded(reason) => Outcome::Discarded(reason),
            });
        }

        let merchant = self.merchant(event.account.as_deref()).await;
        let kind = EventKind::parse(&event.event_type);

        let needs_charge = kind.is_dispute() && !is_refund_closure(event);
        let disputed_charge = match (needs_charge, event.object_str("charge")) {
            (true, Some(charge_id)) => {
                self.disputed_charge(&event.id, charge_id, merchant.as_ref()).await?
            }
            _ => None,
        };

        let outcome = match classify(event, disputed_charge.as_ref(), &self.settings)? {
            Classification::Discard(reason) => {
                info!(
                    event_id = %event.id,
                    event_type = %event.event_type,
                    %reason,
                    "Discarded event"
                );
                ProcessedEvent::Discarded(reason)
            }
            Classification::Emit(classified) => {
                let ClassifiedEvent {
                    event: mut ledger_event,
                    flow,
                } = *classified;

                let stale = ledger_event.event_type == ChargeEventType::RefundUpdated
                    && ledger_event.refund_id.as_deref().is_some_and(|refund_id| {
                        !self
                            .store
                            .apply_refund_update(refund_id, ledger_event.created_at)
                    });

                if stale {
                    info!(event_id = %event.id, "Discarded stale refund update");
                    ProcessedEvent::Discarded(DiscardReason::StaleRefundUpdate)
                } else {
                    match self.resolve_flow(flow, merchant.as_ref()).await {
                        Ok(flow_of_funds) => ledger_event.flow_of_funds = flow_of_funds,
                        Err(error) if error.is_insufficient_data() => {
                            warn!(
                                event_id = %event.id,
                                charge_id = ?ledger_event.charge_id,
                                error = %error,
                                "Recording event without flow of funds"
                            );
                            ledger_event.flow_of_funds = None;
                            ledger_event.needs_reconciliation = true;
                        }
                        Err(error) => return Err(error),
                    }
                    info!(
                        event_id = %event.id,
                        charge_id = ?ledger_event.charge_id,
                        event_type = %ledger_event.event_type,
                        "Classified event"
                    );
                    ProcessedEvent::Published(ledger_event)
                }
            }
        };

        Ok(match self.store.mark_processed(&event.id, outcome) {
            ProcessedEvent::Published(ledger_event) => Outcome::Published(ledger_event),
            ProcessedEvent::Discarded(reason) => Outcome::Discarded(reason),
        })
    }

    /// Canonical charge, with its topology
    pub async fn charge(
        &self,
        charge_id: &str,
        merchant_id: Option<&str>,
    ) -> Result<Charge, ReconciliationError> {
        let merchant = self.merchant(merchant_id).await;
        let (object, _) = self.retrieve_charge(charge_id, merchant.as_ref()).await?;
        canonical_charge(&object, charge_id)
    }

    /// Flow of funds of a charge, from its settlement legs
    ///
    /// # Errors
    ///
    /// Returns `InsufficientData` if a leg the charge's topology needs cannot
    /// be resolved.
    pub async fn charge_flow_of_funds(
        &self,
        charge_id: &str,
        merchant_id: Option<&str>,
    ) -> Result<FlowOfFunds, ReconciliationError> {
        let merchant = self.merchant(merchant_id).await;
        self.charge_flow(charge_id, merchant.as_ref()).await
    }

    /// Refund a charge and build the canonical refund
    ///
    /// Destination charges reverse their transfer, and charges with an
    /// application fee refund it, in the same processor call. The refund's legs
    /// are checked against the charge's flow of funds when that can be built.
    ///
    /// # Errors
    ///
    /// - `TerminalProcessorError` if the processor rejects the refund
    /// - `CurrencyMismatch` if a refund leg disagrees with the charge's leg
    pub async fn refund_charge(
        &self,
        request: &RefundRequest,
    ) -> Result<Refund, ReconciliationError> {
        let merchant = self.merchant(request.merchant_id.as_deref()).await;
        let (object, scope) = self
            .retrieve_charge(&request.charge_id, merchant.as_ref())
            .await?;
        let charge = canonical_charge(&object, &request.charge_id)?;

        let params = RefundParams {
            charge_id: charge.id.clone(),
            amount: request.amount,
            reason: request.reason.clone(),
            reverse_transfer: charge.has_destination(),
            refund_application_fee: charge.topology == ChargeTopology::DestinationWithApplicationFee
                || charge.application_fee_id.is_some(),
            idempotency_key: request.idempotency_key.clone(),
            scope: scope.clone(),
        };
        let processor = self.processor.as_ref();
        let created = self
            .retry
            .execute("create_refund", || processor.create_refund(params.clone()))
            .await?;
        info!(
            charge_id = %charge.id,
            refund_id = ?created.id,
            amount = created.amount,
            "Refunded charge"
        );

        let refund = self.refund_from(&charge, &created, scope.as_deref()).await?;

        match self.charge_flow(&charge.id, merchant.as_ref()).await {
            Ok(charge_flow) => refund.flow_of_funds.ensure_consistent_with(&charge_flow)?,
            Err(error) if error.is_insufficient_data() => {
                warn!(charge_id = %charge.id, error = %error, "Skipping refund leg check");
            }
            Err(error) => return Err(error),
        }
        Ok(refund)
    }

    /// Retrieve a refund and build the canonical refund
    pub async fn load_refund(
        &self,
        refund_id: &str,
        merchant_id: Option<&str>,
    ) -> Result<Refund, ReconciliationError> {
        let merchant = self.merchant(merchant_id).await;
        let processor = self.processor.as_ref();
        let (refund, scope) = self
            .scoped("retrieve_refund", merchant.as_ref(), |scope| async move {
                processor.retrieve_refund(refund_id, scope.as_deref()).await
            })
            .await?;

        let charge_id = refund
            .charge
            .as_deref()
            .ok_or_else(|| ReconciliationError::missing_correlation_id(refund_id, "charge"))?;
        let object = self
            .retry
            .execute("retrieve_charge", || {
                processor.retrieve_charge(charge_id, scope.as_deref())
            })
            .await?;
        let charge = canonical_charge(&object, charge_id)?;

        self.refund_from(&charge, &refund, scope.as_deref()).await
    }

    async fn resolve_flow(
        &self,
        flow: FlowRequirement,
        merchant: Option<&MerchantAccount>,
    ) -> Result<Option<FlowOfFunds>, ReconciliationError> {
        match flow {
            FlowRequirement::None => Ok(None),
            FlowRequirement::Ready(flow_of_funds) => Ok(Some(flow_of_funds)),
            FlowRequirement::ChargeLegs(charge) => {
                self.charge_flow(&charge.id, merchant).await.map(Some)
            }
            FlowRequirement::TransferReversal { charge, dispute } => {
                self.withdraw(&charge, &dispute).await.map(Some)
            }
            FlowRequirement::CompensatingTransfer { charge, dispute } => {
                self.reinstate(&charge, &dispute).await.map(Some)
            }
            FlowRequirement::Unresolved { subject, missing } => {
                Err(ReconciliationError::insufficient_data(&subject, &missing))
            }
        }
    }

    /// The charge behind a dispute
    ///
    /// A charge that cannot be retrieved leaves the dispute unlinked, to be
    /// recorded for reconciliation. Only construction errors abort the event.
    async fn disputed_charge(
        &self,
        event_id: &str,
        charge_id: &str,
        merchant: Option<&MerchantAccount>,
    ) -> Result<Option<Charge>, ReconciliationError> {
        match self.retrieve_charge(charge_id, merchant).await {
            Ok((object, _)) => canonical_charge(&object, event_id).map(Some),
            Err(error) if error.is_fatal_for_event() => Err(error),
            Err(error) => {
                warn!(event_id, charge_id, error = %error, "Disputed charge lookup failed");
                Ok(None)
            }
        }
    }

    /// Resolve a merchant; the platform's own account resolves to no merchant
    async fn merchant(&self, merchant_id: Option<&str>) -> Option<MerchantAccount> {
        let merchant_id = merchant_id.filter(|id| *id != self.settings.platform_account_id)?;
        let merchants = self.merchants.as_ref();
        match self
            .retry
            .execute("resolve_merchant", || merchants.resolve(merchant_id))
            .await
        {
            Ok(merchant) => merchant,
            Err(error) => {
                warn!(merchant_id, error = %error, "Merchant lookup failed, using platform scope");
                None
            }
        }
    }

    /// Run a lookup in the merchant's connect scope, then in platform scope
    ///
    /// # Returns
    ///
    /// The value and the scope that produced it (`None` for platform scope).
    async fn scoped<T, F, Fut>(
        &self,
        operation: &str,
        merchant: Option<&MerchantAccount>,
        call: F,
    ) -> Result<(T, Option<String>), ReconciliationError>
    where
        F: Fn(Option<String>) -> Fut,
        Fut: Future<Output = Result<T, ReconciliationError>>,
    {
        if let Some(scope) = merchant.and_then(MerchantAccount::connect_scope) {
            match self
                .retry
                .execute(operation, || call(Some(scope.to_string())))
                .await
            {
                Ok(value) => return Ok((value, Some(scope.to_string()))),
                Err(error) => warn!(
                    operation,
                    scope,
                    error = %error,
                    "Connect-scoped lookup failed, falling back to platform scope"
                ),
            }
        }

        self.retry
            .execute(operation, || call(None))
            .await
            .map(|value| (value, None))
    }

    async fn retrieve_charge(
        &self,
        charge_id: &str,
        merchant: Option<&MerchantAccount>,
    ) -> Result<(ChargeObject, Option<String>), ReconciliationError> {
        let processor = self.processor.as_ref();
        self.scoped("retrieve_charge", merchant, |scope| async move {
            processor.retrieve_charge(charge_id, scope.as_deref()).await
        })
        .await
    }

    /// Secondary lookup: failures are logged and reported as absent
    async fn lookup<T, F, Fut>(&self, operation: &str, id: &str, call: F) -> Option<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, ReconciliationError>>,
    {
        match self.retry.execute(operation, call).await {
            Ok(value) => Some(value),
            Err(error) => {
                warn!(operation, id, error = %error, "Secondary lookup failed");
                None
            }
        }
    }

    async fn resolve_txn(
        &self,
        txn: Option<&Expandable<BalanceTransaction>>,
        scope: Option<&str>,
    ) -> Option<BalanceTransaction> {
        match txn? {
            Expandable::Object(txn) => Some(txn.clone()),
            Expandable::Id(id) => {
                let processor = self.processor.as_ref();
                self.lookup("retrieve_balance_transaction", id, || {
                    processor.retrieve_balance_transaction(id, scope)
                })
                .await
            }
        }
    }

    /// Balance transaction of the payment a transfer created on the destination
    async fn destination_payment_txn(
        &self,
        transfer: &Transfer,
        destination: &str,
    ) -> Option<BalanceTransaction> {
        let payment_id = transfer.destination_payment.as_deref()?;
        let processor = self.processor.as_ref();
        let payment = self
            .lookup("retrieve_charge", payment_id, || {
                processor.retrieve_charge(payment_id, Some(destination))
            })
            .await?;
        self.resolve_txn(payment.balance_transaction.as_ref(), Some(destination))
            .await
    }

    async fn charge_flow(
        &self,
        charge_id: &str,
        merchant: Option<&MerchantAccount>,
    ) -> Result<FlowOfFunds, ReconciliationError> {
        let subject = format!("charge {charge_id}");
        let (object, scope) = match self.retrieve_charge(charge_id, merchant).await {
            Ok(found) => found,
            Err(error) if error.is_fatal_for_event() => return Err(error),
            Err(error) => {
                warn!(charge_id, error = %error, "Charge lookup failed");
                return Err(ReconciliationError::insufficient_data(&subject, "charge"));
            }
        };
        let charge = canonical_charge(&object, charge_id)?;

        let charge_txn = self
            .resolve_txn(object.balance_transaction.as_ref(), scope.as_deref())
            .await
            .ok_or_else(|| {
                ReconciliationError::insufficient_data(&subject, "charge balance transaction")
            })?;

        let fee_txn = match object.application_fee.as_ref().and_then(Expandable::as_object) {
            Some(fee) => self.resolve_txn(fee.balance_transaction.as_ref(), None).await,
            None => None,
        };

        let processor = self.processor.as_ref();
        let transfer = match charge.transfer_id.as_deref() {
            Some(transfer_id) => {
                self.lookup("retrieve_transfer", transfer_id, || {
                    processor.retrieve_transfer(transfer_id)
                })
                .await
            }
            None => None,
        };

        let payment_txn = match (transfer.as_ref(), charge.destination.as_deref()) {
            (Some(transfer), Some(destination)) => {
                self.destination_payment_txn(transfer, destination).await
            }
            _ => None,
        };

        build_charge_flow_of_funds(
            &charge,
            &charge_txn,
            fee_txn.as_ref(),
            payment_txn.as_ref(),
            transfer.as_ref(),
        )
    }

    async fn refund_from(
        &self,
        charge: &Charge,
        refund: &RefundObject,
        scope: Option<&str>,
    ) -> Result<Refund, ReconciliationError> {
        let mut legs = RefundLegs {
            refund_balance_txn: self
                .resolve_txn(refund.balance_transaction.as_ref(), scope)
                .await,
            ..Default::default()
        };

        if let Some(fee_refund) = refund
            .application_fee_refund
            .as_ref()
            .and_then(Expandable::as_object)
        {
            legs.application_fee_refund_balance_txn = self
                .resolve_txn(fee_refund.balance_transaction.as_ref(), None)
                .await;
        }

        let reversal = refund.transfer_reversal.as_ref().and_then(Expandable::as_object);
        if let (Some(reversal), Some(destination)) = (reversal, charge.destination.as_deref()) {
            if let Some(payment_refund_id) = reversal.destination_payment_refund.as_deref() {
                let processor = self.processor.as_ref();
                let payment_refund = self
                    .lookup("retrieve_refund", payment_refund_id, || {
                        processor.retrieve_refund(payment_refund_id, Some(destination))
                    })
                    .await;
                if let Some(payment_refund) = payment_refund {
                    legs.destination_payment_refund_balance_txn = self
                        .resolve_txn(payment_refund.balance_transaction.as_ref(), Some(destination))
                        .await;
                    legs.destination_payment_refund = Some(payment_refund);
                }
            }
            legs.destination_payment_application_fee_refund = reversal
                .application_fee_refund
                .as_ref()
                .and_then(Expandable::as_object)
                .cloned();
        }

        let context_id = refund.id.as_deref().unwrap_or(&charge.id);
        build_refund(charge, refund, &legs, context_id)
    }

    /// Reverse the destination transfer for a withdrawal, at most once per dispute
    async fn withdraw(
        &self,
        charge: &Charge,
        dispute: &DisputeObject,
    ) -> Result<FlowOfFunds, ReconciliationError> {
        let dispute_id = dispute
            .id
            .as_deref()
            .ok_or_else(|| ReconciliationError::missing_correlation_id(&charge.id, "dispute"))?;
        let subject = format!("dispute {dispute_id}");
        let destination = charge.destination.as_deref().ok_or_else(|| {
            ReconciliationError::insufficient_data(&subject, "destination account")
        })?;
        let processor = self.processor.as_ref();

        let reversal = match self.store.transfer_reversal(dispute_id) {
            Some(reversal) => {
                debug!(dispute_id, reversal_id = %reversal.id, "Transfer already reversed");
                reversal
            }
            None => {
                let transfer_id = charge.transfer_id.as_deref().ok_or_else(|| {
                    ReconciliationError::insufficient_data(&subject, "destination transfer")
                })?;
                let transfer = self
                    .retry
                    .execute("retrieve_transfer", || processor.retrieve_transfer(transfer_id))
                    .await?;

                let amount = transfer_reversal_amount(charge, dispute, &transfer)?;
                if amount <= 0 {
                    return Err(ReconciliationError::insufficient_data(
                        &subject,
                        "outstanding transfer amount",
                    ));
                }

                let params = TransferReversalParams {
                    transfer_id: transfer_id.to_string(),
                    amount,
                    refund_application_fee: charge.topology
                        == ChargeTopology::DestinationWithApplicationFee,
                    idempotency_key: format!("reversal-{dispute_id}"),
                };
                let reversal = self
                    .retry
                    .execute("create_transfer_reversal", || {
                        processor.create_transfer_reversal(params.clone())
                    })
                    .await?;
                info!(
                    dispute_id,
                    reversal_id = %reversal.id,
                    amount,
                    "Reversed destination transfer"
                );
                self.store.record_transfer_reversal(dispute_id, reversal.clone());
                reversal
            }
        };

        let payment_refund_id = reversal.destination_payment_refund.as_deref().ok_or_else(|| {
            ReconciliationError::insufficient_data(&subject, "destination payment refund")
        })?;
        let payment_refund = self
            .lookup("retrieve_refund", payment_refund_id, || {
                processor.retrieve_refund(payment_refund_id, Some(destination))
            })
            .await;
        let payment_refund_txn = match payment_refund {
            Some(payment_refund) => {
                self.resolve_txn(payment_refund.balance_transaction.as_ref(), Some(destination))
                    .await
            }
            None => None,
        }
        .ok_or_else(|| {
            ReconciliationError::insufficient_data(
                &subject,
                "destination payment refund balance transaction",
            )
        })?;

        let fee_refund_txn = match reversal
            .application_fee_refund
            .as_ref()
            .and_then(Expandable::as_object)
        {
            Some(fee_refund) => {
                self.resolve_txn(fee_refund.balance_transaction.as_ref(), None)
                    .await
            }
            None => None,
        };

        build_dispute_withdrawn_flow(
            charge,
            dispute,
            &DisputeWithdrawalLegs {
                reversal,
                destination_payment_refund_balance_txn: payment_refund_txn,
                application_fee_refund_balance_txn: fee_refund_txn,
            },
        )
    }

    /// Send reinstated funds back to the creator, at most once per dispute
    ///
    /// Only runs after the withdrawal's reversal has been recorded; a
    /// reinstatement seen first is recorded without a flow of funds.
    async fn reinstate(
        &self,
        charge: &Charge,
        dispute: &DisputeObject,
    ) -> Result<FlowOfFunds, ReconciliationError> {
        let dispute_id = dispute
            .id
            .as_deref()
            .ok_or_else(|| ReconciliationError::missing_correlation_id(&charge.id, "dispute"))?;
        let subject = format!("dispute {dispute_id}");
        let destination = charge.destination.as_deref().ok_or_else(|| {
            ReconciliationError::insufficient_data(&subject, "destination account")
        })?;

        let transfer = match self.store.compensating_transfer(dispute_id) {
            Some(transfer) => {
                debug!(dispute_id, transfer_id = %transfer.id, "Funds already reinstated");
                transfer
            }
            None => {
                let reversal = self.store.transfer_reversal(dispute_id).ok_or_else(|| {
                    ReconciliationError::insufficient_data(&subject, "recorded transfer reversal")
                })?;
                let params = TransferParams {
                    destination: destination.to_string(),
                    amount: reversal.amount,
                    currency: reversal.currency.clone(),
                    idempotency_key: format!("reinstatement-{dispute_id}"),
                };
                let processor = self.processor.as_ref();
                let transfer = self
                    .retry
                    .execute("create_transfer", || processor.create_transfer(params.clone()))
                    .await?;
                info!(
                    dispute_id,
                    transfer_id = %transfer.id,
                    amount = transfer.amount,
                    "Sent compensating transfer"
                );
                self.store.record_compensating_transfer(dispute_id, transfer.clone());
                transfer
            }
        };

        let payment_txn = self
            .destination_payment_txn(&transfer, destination)
            .await
            .ok_or_else(|| {
                ReconciliationError::insufficient_data(
                    &subject,
                    "destination payment balance transaction",
                )
            })?;

        build_dispute_reinstated_flow(
            dispute,
            &DisputeReinstatementLegs {
                transfer,
                destination_payment_balance_txn: payment_txn,
            },
        )
    }
}
