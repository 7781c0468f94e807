//! Funds Flow Engine Library
//!
//! # Overview
//!
//! Turns card processor notifications about charges, refunds, disputes and
//! payment intents into canonical ledger events, each carrying the flow of
//! funds between the buyer, the processor, the platform and the creator.
//!
//! # Architecture
//!
//! - [`types`] - Canonical data types (amounts, flow of funds, charges, events)
//! - [`processor`] - Processor payloads, client traits and a sandbox processor
//! - [`core`] - Business logic:
//!   - [`core::topology`] - Charge topology classification
//!   - [`core::charge_adapter`], [`core::refund_adapter`], [`core::dispute_adapter`] -
//!     Flows of funds per transition
//!   - [`core::event_classifier`] - Notification classification
//!   - [`core::reconciler`] - Orchestration and processor side effects
//! - [`io`] - JSON-lines readers and the ledger CSV sink
//! - [`strategy`] - Sync and async processing strategies
//! - [`settings`] - Layered configuration
//! - [`cli`] - Command-line arguments
//!
//! # Charge topologies
//!
//! - **DestinationWithApplicationFee**: destination charge, fee collected as an
//!   application fee
//! - **DestinationWithTransferData**: destination charge, platform keeps the
//!   difference to `transfer_data[amount]`
//! - **ApplicationFeeOnly**: fee collected from a connected account, no transfer
//! - **NoDestination**: the platform keeps everything

pub mod cli;
pub mod core;
pub mod io;
pub mod processor;
pub mod settings;
pub mod strategy;
pub mod types;

pub use core::{EventStore, Outcome, Reconciler, RefundRequest};
pub use io::{CsvLedgerWriter, LedgerSink};
pub use processor::{ChargeProcessorClient, MerchantAccountLookup, ProcessorEvent};
pub use settings::ReconcilerSettings;
pub use types::{
    Amount, Charge, ChargeEvent, ChargeEventType, ChargeTopology, CurrencyCode, DiscardReason,
    FlowOfFunds, LedgerEvent, MerchantAccount, ReconciliationError, Refund,
};
