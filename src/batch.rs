//! Assembly of one outbound payload from a buffered batch

use crate::config::HecConfig;
use crate::errors::Result;
use crate::event::{EventTime, Record, format_record};
use tracing::debug;

/// Format every record in order and concatenate the fragments.
///
/// Returns `None` when there is nothing to send.
pub fn assemble_payload(batch: &[(EventTime, Record)], config: &HecConfig) -> Result<Option<String>> {
    let mut payload = String::new();

    for (time, record) in batch {
        payload.push_str(&format_record(*time, record, config)?);
    }

    if payload.is_empty() {
        return Ok(None);
    }

    debug!("Assembled payload of {} bytes from {} records", payload.len(), batch.len());
    Ok(Some(payload))
}
