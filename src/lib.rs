//! Splunk HTTP Event Collector forwarder
//!
//! This library turns batches of structured log records into HEC payloads,
//! posts them to the collector, and optionally waits for indexer
//! acknowledgement before reporting the batch as delivered.

pub mod ack;
pub mod batch;
pub mod config;
pub mod delivery;
pub mod errors;
pub mod event;
pub mod source;
pub mod transport;

pub use ack::{AckId, AckOutcome, AckPoller, AckTracker};
pub use config::HecConfig;
pub use delivery::{DeliveryResult, HecForwarder};
pub use errors::{HecError, Result};
pub use event::{EventTime, Record};
pub use transport::HecClient;
