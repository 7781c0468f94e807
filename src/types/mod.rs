//! Types module
//!
//! Contains the canonical, processor-independent data structures:
//! - `amount`: currency-tagged amounts
//! - `flow_of_funds`: the five-leg settlement breakdown
//! - `charge`: canonical charge, refund and charge topology
//! - `merchant`: merchant accounts and holder-of-funds classification
//! - `event`: canonical charge/ledger events
//! - `error`: error types for the engine

pub mod amount;
pub mod charge;
pub mod error;
pub mod event;
pub mod flow_of_funds;
pub mod merchant;

pub use amount::{Amount, CurrencyCode};
pub use charge::{Charge, ChargeTopology, Refund};
pub use error::ReconciliationError;
pub use event::{ChargeEvent, ChargeEventType, DiscardReason, LedgerEvent};
pub use flow_of_funds::FlowOfFunds;
pub use merchant::{HolderOfFunds, MerchantAccount};
