//! Ledger sink writing one CSV row per published event

use crate::io::event_format::LedgerRow;
use crate::types::{LedgerEvent, ReconciliationError};
use csv::Writer;
use std::io::Write;

/// Receives every ledger event exactly once, in publication order
pub trait LedgerSink {
    fn publish(&mut self, event: &LedgerEvent) -> Result<(), ReconciliationError>;

    fn flush(&mut self) -> Result<(), ReconciliationError>;
}

/// Writes ledger events as CSV with a header row
pub struct CsvLedgerWriter<W: Write> {
    writer: Writer<W>,
}

impl<W: Write> CsvLedgerWriter<W> {
    pub fn new(output: W) -> Self {
        Self {
            writer: Writer::from_writer(output),
        }
    }
}

impl<W: Write> LedgerSink for CsvLedgerWriter<W> {
    fn publish(&mut self, event: &LedgerEvent) -> Result<(), ReconciliationError> {
        self.writer.serialize(LedgerRow::from_event(event)?)?;
        Ok(())
    }

    fn flush(&mut self) -> Result<(), ReconciliationError> {
        self.writer.flush()?;
        Ok(())
    }
}
