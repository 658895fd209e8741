//! Indexer acknowledgement tracking

use crate::errors::{HecError, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Identifier the collector hands out for one ingest request
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AckId {
    Numeric(u64),
    Text(String),
}

impl fmt::Display for AckId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AckId::Numeric(id) => write!(f, "{}", id),
            AckId::Text(id) => f.write_str(id),
        }
    }
}

/// Something that can ask the collector whether an ack id has been indexed
#[async_trait]
pub trait AckPoller: Send + Sync {
    async fn poll_ack(&self, ack_id: &AckId) -> Result<bool>;
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AckState {
    Pending { remaining: u32 },
    Confirmed,
    Abandoned,
}

/// How tracking of one ack id ended
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AckOutcome {
    Confirmed { polls: u32 },
    /// Cancelled while waiting between polls
    Interrupted { polls: u32 },
}

/// Polls for a delivery receipt at a fixed interval, at most `retry_limit + 1` times
#[derive(Debug, Clone)]
pub struct AckTracker {
    interval: Duration,
    retry_limit: u32,
}

impl AckTracker {
    pub fn new(interval: Duration, retry_limit: u32) -> Self {
        Self { interval, retry_limit }
    }

    /// Poll until the collector confirms `ack_id` or the retry budget runs out.
    ///
    /// A failed poll request ends tracking with that error; running out of
    /// retries yields [`HecError::AckTimeout`].
    pub async fn track(
        &self,
        poller: &dyn AckPoller,
        ack_id: &AckId,
        cancel: &CancellationToken,
    ) -> Result<AckOutcome> {
        let mut state = AckState::Pending {
            remaining: self.retry_limit,
        };
        let mut polls = 0;

        while let AckState::Pending { remaining } = state {
            polls += 1;

            if poller.poll_ack(ack_id).await? {
                state = AckState::Confirmed;
                continue;
            }

            if remaining == 0 {
                state = AckState::Abandoned;
                continue;
            }

            debug!(
                ack_id = %ack_id,
                polls,
                remaining,
                "Ack not confirmed yet, polling again in {:?}",
                self.interval
            );

            tokio::select! {
                _ = cancel.cancelled() => {
                    warn!(ack_id = %ack_id, polls, "Ack tracking cancelled before confirmation");
                    return Ok(AckOutcome::Interrupted { polls });
                }
                _ = sleep(self.interval) => {}
            }

            state = AckState::Pending {
                remaining: remaining - 1,
            };
        }

        match state {
            AckState::Confirmed => {
                debug!(ack_id = %ack_id, polls, "Ack confirmed");
                Ok(AckOutcome::Confirmed { polls })
            }
            _ => Err(HecError::AckTimeout {
                ack_id: ack_id.clone(),
                polls,
            }),
        }
    }
}
