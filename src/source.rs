//! Newline-delimited JSON record input

use crate::errors::{HecError, Result};
use crate::event::{EventTime, Record};
use serde::de::Error as _;
use serde_json::Value;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, Lines};
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Reads NDJSON records and hands them out in fixed-size batches
pub struct RecordReader<R> {
    lines: Lines<R>,
    batch_size: usize,
    line_number: usize,
}

impl<R: AsyncBufRead + Unpin> RecordReader<R> {
    pub fn new(reader: R, batch_size: usize) -> Self {
        Self {
            lines: reader.lines(),
            batch_size: batch_size.max(1),
            line_number: 0,
        }
    }

    /// Next batch of up to `batch_size` records, stamped with the time they were read
    pub async fn next_batch(&mut self) -> Result<Option<Vec<(EventTime, Record)>>> {
        self.next_batch_until(&CancellationToken::new()).await
    }

    /// Like `next_batch`, but stops waiting for input once `cancel` fires.
    ///
    /// Records read before cancellation are still returned.
    pub async fn next_batch_until(
        &mut self,
        cancel: &CancellationToken,
    ) -> Result<Option<Vec<(EventTime, Record)>>> {
        let mut batch = Vec::with_capacity(self.batch_size);

        while batch.len() < self.batch_size {
            let line = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    debug!("Input read cancelled after {} records", batch.len());
                    break;
                }
                line = self.lines.next_line() => line?,
            };
            let Some(line) = line else {
                break;
            };
            self.line_number += 1;

            if line.trim().is_empty() {
                continue;
            }

            batch.push((EventTime::now(), parse_record(&line, self.line_number)?));
        }

        if batch.is_empty() {
            return Ok(None);
        }

        debug!("Read batch of {} records (through line {})", batch.len(), self.line_number);
        Ok(Some(batch))
    }
}

fn parse_record(line: &str, line_number: usize) -> Result<Record> {
    let value: Value = serde_json::from_str(line)?;
    match value {
        Value::Object(record) => Ok(record),
        _ => Err(HecError::Serialization(serde_json::Error::custom(format!(
            "line {}: expected a JSON object",
            line_number
        )))),
    }
}
