//! I/O module
//!
//! Reads processor notifications and writes ledger events.
//!
//! # Components
//!
//! - `event_format` - JSON-lines parsing and the ledger CSV row
//! - `sync_reader` - Synchronous notification reader with iterator interface
//! - `async_reader` - Asynchronous notification reader with batch interface
//! - `ledger_csv` - `LedgerSink` and its CSV implementation

pub mod async_reader;
pub mod event_format;
pub mod ledger_csv;
pub mod sync_reader;

pub use async_reader::AsyncReader;
pub use event_format::{parse_event_line, LedgerRow};
pub use ledger_csv::{CsvLedgerWriter, LedgerSink};
pub use sync_reader::SyncReader;
