//! Card processor boundary
//!
//! - `payload` - Typed processor payloads (notifications, charges, refunds, ...)
//! - `client` - Capabilities the reconciler needs from the processor
//! - `sandbox` - In-memory processor backed by a JSON snapshot

pub mod client;
pub mod payload;
pub mod sandbox;

pub use client::{ChargeProcessorClient, MerchantAccountLookup};
pub use payload::ProcessorEvent;
pub use sandbox::{InjectedFailure, SandboxProcessor, SandboxSnapshot};
