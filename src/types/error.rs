//! Error types for the Flow-of-Funds engine
//!
//! This module defines every error that can occur while normalizing processor
//! payloads, computing flows of funds, and talking to the processor.
//!
//! # Error Categories
//!
//! - **Model invariants**: currency mismatches and arithmetic overflow. Always
//!   fatal for the event being processed.
//! - **Payload errors**: missing correlation ids and malformed payloads. Fatal
//!   for that event only, never for the worker.
//! - **Secondary lookups**: `InsufficientData` degrades the event to a record
//!   without a flow of funds.
//! - **Processor errors**: transient ones are retried, terminal ones surface.
//! - **Runtime errors**: configuration, file I/O and parsing.

use thiserror::Error;

/// Main error type for the reconciliation engine
///
/// Each variant carries enough context (event id, charge id, operation) to
/// replay the failed notification by hand.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ReconciliationError {
    /// Two amounts that must share a currency do not
    #[error("Currency mismatch in {context}: {expected} vs {actual}")]
    CurrencyMismatch {
        /// Where the comparison happened
        context: String,
        /// Currency of the left-hand amount
        expected: String,
        /// Currency of the right-hand amount
        actual: String,
    },

    /// An i64 cents computation would overflow
    #[error("Arithmetic overflow in {operation}")]
    ArithmeticOverflow {
        /// Operation that would overflow
        operation: String,
    },

    /// A flow of funds cannot be computed because a secondary object is missing
    ///
    /// The event is still recorded, with a null flow of funds, and flagged for
    /// manual reconciliation.
    #[error("Insufficient data for {subject}: {missing} unavailable")]
    InsufficientData {
        /// Charge, refund or dispute being modeled
        subject: String,
        /// The object that could not be resolved
        missing: String,
    },

    /// A linkable event lacks the id that ties it to a charge/dispute/refund
    #[error("Event {event_id} is missing required field '{field}'")]
    MissingCorrelationId {
        /// Processor event id
        event_id: String,
        /// Name of the missing field
        field: String,
    },

    /// The event payload could not be mapped onto its typed shape
    #[error("Malformed payload in event {event_id}: {message}")]
    MalformedPayload {
        /// Processor event id
        event_id: String,
        /// Deserialization error
        message: String,
    },

    /// Network, rate-limit or timeout failure talking to the processor
    ///
    /// Retried with backoff by the retry policy.
    #[error("Transient processor error during {operation}: {message}")]
    TransientProcessorError {
        /// Processor operation, e.g. `retrieve_charge`
        operation: String,
        /// Error reported by the client
        message: String,
    },

    /// Business-rule rejection from the processor, e.g. "already refunded"
    ///
    /// Never retried.
    #[error("Processor rejected {operation}: {message}")]
    TerminalProcessorError {
        /// Processor operation, e.g. `create_refund`
        operation: String,
        /// Error reported by the client
        message: String,
    },

    /// A next action the engine does not know how to drive
    #[error("Unsupported action '{action}' for {subject}")]
    UnsupportedAction {
        /// Action type reported by the processor
        action: String,
        /// Payment intent or charge requiring the action
        subject: String,
    },

    /// Invalid or unreadable settings
    #[error("Configuration error: {message}")]
    Configuration {
        /// Description of the problem
        message: String,
    },

    /// I/O error occurred while reading or writing files
    #[error("I/O error: {message}")]
    IoError {
        /// Description of the I/O error
        message: String,
    },

    /// JSON or CSV parsing error
    #[error("Parse error{}: {message}", line.map(|l| format!(" at line {}", l)).unwrap_or_default())]
    ParseError {
        /// Line number where the error occurred (if available)
        line: Option<u64>,
        /// Description of the parsing error
        message: String,
    },
}

impl From<std::io::Error> for ReconciliationError {
    fn from(error: std::io::Error) -> Self {
        ReconciliationError::IoError {
            message: error.to_string(),
        }
    }
}

impl From<csv::Error> for ReconciliationError {
    fn from(error: csv::Error) -> Self {
        let line = error.position().map(|pos| pos.line());

        ReconciliationError::ParseError {
            line,
            message: error.to_string(),
        }
    }
}

impl From<serde_json::Error> for ReconciliationError {
    fn from(error: serde_json::Error) -> Self {
        let line = match error.line() {
            0 => None,
            l => Some(l as u64),
        };

        ReconciliationError::ParseError {
            line,
            message: error.to_string(),
        }
    }
}

impl From<config::ConfigError> for ReconciliationError {
    fn from(error: config::ConfigError) -> Self {
        ReconciliationError::Configuration {
            message: error.to_string(),
        }
    }
}

// Helper functions for creating common errors

impl ReconciliationError {
    /// Create a CurrencyMismatch error
    pub fn currency_mismatch(context: &str, expected: &str, actual: &str) -> Self {
        ReconciliationError::CurrencyMismatch {
            context: context.to_string(),
            expected: expected.to_string(),
            actual: actual.to_string(),
        }
    }

    /// Create an ArithmeticOverflow error
    pub fn arithmetic_overflow(operation: &str) -> Self {
        ReconciliationError::ArithmeticOverflow {
            operation: operation.to_string(),
        }
    }

    /// Create an InsufficientData error
    pub fn insufficient_data(subject: &str, missing: &str) -> Self {
        ReconciliationError::InsufficientData {
            subject: subject.to_string(),
            missing: missing.to_string(),
        }
    }

    /// Create a MissingCorrelationId error
    pub fn missing_correlation_id(event_id: &str, field: &str) -> Self {
        ReconciliationError::MissingCorrelationId {
            event_id: event_id.to_string(),
            field: field.to_string(),
        }
    }

    /// Create a MalformedPayload error
    pub fn malformed_payload(event_id: &str, message: impl ToString) -> Self {
        ReconciliationError::MalformedPayload {
            event_id: event_id.to_string(),
            message: message.to_string(),
        }
    }

    /// Create a TransientProcessorError
    pub fn transient(operation: &str, message: impl ToString) -> Self {
        ReconciliationError::TransientProcessorError {
            operation: operation.to_string(),
            message: message.to_string(),
        }
    }

    /// Create a TerminalProcessorError
    pub fn terminal(operation: &str, message: impl ToString) -> Self {
        ReconciliationError::TerminalProcessorError {
            operation: operation.to_string(),
            message: message.to_string(),
        }
    }

    /// Create an UnsupportedAction error
    pub fn unsupported_action(action: &str, subject: &str) -> Self {
        ReconciliationError::UnsupportedAction {
            action: action.to_string(),
            subject: subject.to_string(),
        }
    }

    /// Whether the retry policy may try the failed call again
    pub fn is_transient(&self) -> bool {
        matches!(self, ReconciliationError::TransientProcessorError { .. })
    }

    /// Construction-level violations: abort the event, never the worker
    pub fn is_fatal_for_event(&self) -> bool {
        matches!(
            self,
            ReconciliationError::CurrencyMismatch { .. }
                | ReconciliationError::ArithmeticOverflow { .. }
                | ReconciliationError::MissingCorrelationId { .. }
                | ReconciliationError::MalformedPayload { .. }
        )
    }

    /// Whether the error means "record the event without a flow of funds"
    pub fn is_insufficient_data(&self) -> bool {
        matches!(self, ReconciliationError::InsufficientData { .. })
    }
}
