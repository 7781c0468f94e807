//! Synchronous JSON-lines reader with iterator interface
//!
//! Streams processor notifications from a file, one per line, without loading
//! the file into memory. Each notification is tagged with its line number,
//! which the strategies use as its position in the input.
//!
//! ```no_run
//! use funds_flow_engine::io::sync_reader::SyncReader;
//! use std::path::Path;
//!
//! let reader = SyncReader::new(Path::new("events.jsonl")).unwrap();
//! for result in reader {
//!     match result {
//!         Ok((position, event)) => println!("{position}: {}", event.id),
//!         Err(e) => eprintln!("Error: {}", e),
//!     }
//! }
//! ```
//!
//! # Error Handling
//!
//! - Failing to open the file is returned from `new()`
//! - Unparseable lines are yielded as `Err` items carrying the line number

use crate::core::batch_processor::PositionedEvent;
use crate::io::event_format::parse_event_line;
use crate::types::ReconciliationError;
use std::fs::File;
use std::io::{BufRead, BufReader, Lines};
use std::path::Path;

#[derive(Debug)]
pub struct SyncReader {
    lines: Lines<BufReader<File>>,
    line_num: usize,
}

impl SyncReader {
    /// Open a JSON-lines file for streaming
    ///
    /// # Returns
    ///
    /// * `Ok(SyncReader)` if the file opened successfully
    /// * `Err(IoError)` if the file could not be opened
    pub fn new(path: &Path) -> Result<Self, ReconciliationError> {
        let file = File::open(path).map_err(|e| ReconciliationError::IoError {
            message: format!("Failed to open file '{}': {}", path.display(), e),
        })?;

        Ok(Self {
            lines: BufReader::with_capacity(8 * 1024, file).lines(),
            line_num: 0,
        })
    }
}

impl Iterator for SyncReader {
    type Item = Result<PositionedEvent, ReconciliationError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let line = match self.lines.next()? {
                Ok(line) => line,
                Err(e) => return Some(Err(e.into())),
            };
            self.line_num += 1;

            match parse_event_line(&line, self.line_num) {
                Ok(Some(event)) => return Some(Ok((self.line_num, event))),
                Ok(None) => continue,
                Err(e) => return Some(Err(e)),
            }
        }
    }
}
