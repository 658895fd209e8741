//! One delivery cycle: assemble, send, and optionally wait for acknowledgement

use crate::ack::{AckOutcome, AckTracker};
use crate::batch::assemble_payload;
use crate::config::HecConfig;
use crate::errors::{HecError, Result};
use crate::event::{EventTime, Record};
use crate::transport::HecClient;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

/// What the host buffering layer gets back for one batch
#[derive(Debug)]
pub enum DeliveryResult {
    Delivered,
    /// Accepted by the collector, but ack tracking stopped before confirmation
    DeliveredUnconfirmed,
    Failed(HecError),
}

impl DeliveryResult {
    pub fn is_delivered(&self) -> bool {
        matches!(self, DeliveryResult::Delivered)
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, DeliveryResult::Failed(_))
    }

    pub fn error(&self) -> Option<&HecError> {
        match self {
            DeliveryResult::Failed(err) => Some(err),
            _ => None,
        }
    }
}

/// Delivers batches of records to a HEC collector
#[derive(Debug, Clone)]
pub struct HecForwarder {
    config: Arc<HecConfig>,
    client: HecClient,
    tracker: Option<AckTracker>,
}

impl HecForwarder {
    /// Validate the configuration and set up the HTTP client
    pub fn new(config: HecConfig) -> Result<Self> {
        config.validate()?;

        let client = HecClient::new(&config)?;
        let tracker = config
            .use_ack
            .then(|| AckTracker::new(config.ack_interval(), config.ack_retry_limit));

        info!(
            "HEC forwarder targeting {} (raw: {}, ack: {})",
            client.base_url(),
            config.raw,
            config.use_ack
        );

        Ok(Self {
            config: Arc::new(config),
            client,
            tracker,
        })
    }

    pub fn client(&self) -> &HecClient {
        &self.client
    }

    /// Run one delivery cycle for `batch`
    pub async fn deliver(&self, batch: &[(EventTime, Record)]) -> DeliveryResult {
        self.deliver_with_cancel(batch, &CancellationToken::new()).await
    }

    /// Run one delivery cycle; cancelling `cancel` stops waiting for acknowledgement
    #[instrument(skip_all, fields(cycle_id = %Uuid::new_v4(), records = batch.len()))]
    pub async fn deliver_with_cancel(
        &self,
        batch: &[(EventTime, Record)],
        cancel: &CancellationToken,
    ) -> DeliveryResult {
        match self.run_cycle(batch, cancel).await {
            Ok(result) => result,
            Err(e) => {
                error!("Delivery failed: {}", e);
                DeliveryResult::Failed(e)
            }
        }
    }

    async fn run_cycle(
        &self,
        batch: &[(EventTime, Record)],
        cancel: &CancellationToken,
    ) -> Result<DeliveryResult> {
        let Some(payload) = assemble_payload(batch, &self.config)? else {
            debug!("Nothing to deliver");
            return Ok(DeliveryResult::Delivered);
        };

        let response = self.client.send_payload(payload).await?;

        let Some(tracker) = &self.tracker else {
            debug!("Batch accepted");
            return Ok(DeliveryResult::Delivered);
        };

        let ack_id = response.ack_id.ok_or(HecError::MissingAckId)?;

        match tracker.track(&self.client, &ack_id, cancel).await? {
            AckOutcome::Confirmed { polls } => {
                debug!(ack_id = %ack_id, polls, "Batch indexed");
                Ok(DeliveryResult::Delivered)
            }
            AckOutcome::Interrupted { polls } => {
                warn!(ack_id = %ack_id, polls, "Batch accepted but not confirmed");
                Ok(DeliveryResult::DeliveredUnconfirmed)
            }
        }
    }
}
