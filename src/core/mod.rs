//! Core business logic module
//!
//! Pure computation:
//! - `topology` - Charge topology classification
//! - `charge_adapter` - Canonical charge and its flow of funds
//! - `refund_adapter` - Canonical refund and refund attribution
//! - `dispute_adapter` - Flows of funds for dispute transitions
//! - `event_classifier` - Notification classification and correlation keys
//!
//! Orchestration and state:
//! - `retry` - Timeouts and exponential backoff for processor calls
//! - `event_store` - Idempotency and per-dispute side-effect records
//! - `reconciler` - Drives classification and the processor side effects
//! - `batch_processor` - Charge-partitioned concurrent processing

pub mod batch_processor;
pub mod charge_adapter;
pub mod dispute_adapter;
pub mod event_classifier;
pub mod event_store;
pub mod reconciler;
pub mod refund_adapter;
pub mod retry;
pub mod topology;

pub use batch_processor::{BatchProcessor, ProcessingResult};
pub use event_classifier::{classify, correlation_key, Classification};
pub use event_store::EventStore;
pub use reconciler::{Outcome, Reconciler, RefundRequest};
pub use retry::RetryPolicy;
