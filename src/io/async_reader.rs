//! Asynchronous JSON-lines reader with batch interface
//!
//! Reads processor notifications from any tokio `AsyncBufRead` in batches for
//! the async strategy. Unparseable lines are logged and skipped.
//!
//! ```text
//! AsyncBufRead → AsyncReader → batches of (position, ProcessorEvent)
//!                    ↓
//!              event_format
//!           (parse_event_line)
//! ```

use crate::core::batch_processor::PositionedEvent;
use crate::io::event_format::parse_event_line;
use crate::types::ReconciliationError;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, Lines};
use tracing::warn;

pub struct AsyncReader<R: AsyncBufRead + Unpin> {
    lines: Lines<R>,
    line_num: usize,
}

impl<R: AsyncBufRead + Unpin> AsyncReader<R> {
    pub fn new(reader: R) -> Self {
        Self {
            lines: reader.lines(),
            line_num: 0,
        }
    }

    /// Read up to `batch_size` notifications
    ///
    /// An empty batch means the input is exhausted.
    ///
    /// # Errors
    ///
    /// Returns `IoError` if reading fails; parse errors are logged instead.
    pub async fn read_batch(
        &mut self,
        batch_size: usize,
    ) -> Result<Vec<PositionedEvent>, ReconciliationError> {
        let mut batch = Vec::with_capacity(batch_size);

        while batch.len() < batch_size {
            let Some(line) = self.lines.next_line().await? else {
                break;
            };
            self.line_num += 1;

            match parse_event_line(&line, self.line_num) {
                Ok(Some(event)) => batch.push((self.line_num, event)),
                Ok(None) => {}
                Err(e) => warn!(error = %e, "Skipping malformed notification"),
            }
        }

        Ok(batch)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::BufReader;

    fn reader(content: &'static str) -> AsyncReader<BufReader<&'static [u8]>> {
        AsyncReader::new(BufReader::new(content.as_bytes()))
    }

    fn ids(batch: &[PositionedEvent]) -> Vec<(usize, &str)> {
        batch
            .iter()
            .map(|(position, event)| (*position, event.id.as_str()))
            .collect()
    }

    #[tokio::test]
    async fn test_async_reader_multiple_batches() {
        let mut reader = reader(concat!(
            r#"{"id":"evt_1","type":"charge.succeeded","created":1,"data":{"object":{}}}"#, "\n",
            r#"{"id":"evt_2","type":"charge.succeeded","created":2,"data":{"object":{}}}"#, "\n",
            r#"{"id":"evt_3","type":"charge.succeeded","created":3,"data":{"object":{}}}"#, "\n",
        ));

        let batch = reader.read_batch(2).await.unwrap();
        assert_eq!(ids(&batch), vec![(1, "evt_1"), (2, "evt_2")]);

        let batch = reader.read_batch(2).await.unwrap();
        assert_eq!(ids(&batch), vec![(3, "evt_3")]);

        assert!(reader.read_batch(2).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_async_reader_skips_malformed_and_blank_lines() {
        let mut reader = reader(concat!(
            "{broken\n",
            "\n",
            r#"{"id":"evt_4","type":"charge.failed","created":4,"data":{"object":{}}}"#, "\n",
        ));

        let batch = reader.read_batch(10).await.unwrap();
        assert_eq!(ids(&batch), vec![(3, "evt_4")]);
    }

    #[tokio::test]
    async fn test_async_reader_empty_input() {
        let mut reader = reader("");
        assert!(reader.read_batch(10).await.unwrap().is_empty());
    }
}
