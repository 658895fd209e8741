//! Error types for the HEC forwarder

use crate::ack::AckId;
use std::fmt;

pub type Result<T> = std::result::Result<T, HecError>;

#[derive(Debug)]
pub enum HecError {
    /// Invalid or missing configuration, detected at startup
    Config(String),

    /// A record could not be converted to the wire format
    Serialization(serde_json::Error),

    /// Connection refused, timeout or TLS failure
    Transport(reqwest::Error),

    /// Collector answered with a non-success status
    UnexpectedStatus { status: u16, body: String },

    /// Collector answered with a body that could not be parsed
    MalformedResponse(String),

    /// Acknowledgement is enabled but the ingest response carried no `ackId`
    MissingAckId,

    /// Acknowledgement polls exhausted without confirmation
    AckTimeout { ack_id: AckId, polls: u32 },

    /// IO operation failed
    Io(std::io::Error),
}

impl HecError {
    /// Errors caused by the collector speaking something other than HEC.
    pub fn is_protocol(&self) -> bool {
        matches!(
            self,
            HecError::UnexpectedStatus { .. } | HecError::MalformedResponse(_) | HecError::MissingAckId
        )
    }

    pub fn is_ack_timeout(&self) -> bool {
        matches!(self, HecError::AckTimeout { .. })
    }

    pub fn is_transport(&self) -> bool {
        matches!(self, HecError::Transport(_))
    }
}

impl fmt::Display for HecError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HecError::Config(msg) => write!(f, "Configuration error: {}", msg),
            HecError::Serialization(err) => write!(f, "Serialization error: {}", err),
            HecError::Transport(err) => write!(f, "Transport error: {}", err),
            HecError::UnexpectedStatus { status, body } => {
                write!(f, "Unexpected response {} from collector: {}", status, body)
            }
            HecError::MalformedResponse(msg) => write!(f, "Malformed collector response: {}", msg),
            HecError::MissingAckId => write!(f, "Malformed collector response: missing ackId"),
            HecError::AckTimeout { ack_id, polls } => {
                write!(f, "failed to index the data ack_id={} after {} polls", ack_id, polls)
            }
            HecError::Io(err) => write!(f, "IO error: {}", err),
        }
    }
}

impl std::error::Error for HecError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            HecError::Serialization(err) => Some(err),
            HecError::Transport(err) => Some(err),
            HecError::Io(err) => Some(err),
            _ => None,
        }
    }
}

impl From<std::io::Error> for HecError {
    fn from(err: std::io::Error) -> Self {
        HecError::Io(err)
    }
}

impl From<reqwest::Error> for HecError {
    fn from(err: reqwest::Error) -> Self {
        HecError::Transport(err)
    }
}

impl From<serde_json::Error> for HecError {
    fn from(err: serde_json::Error) -> Self {
        HecError::Serialization(err)
    }
}
