//! HTTP transport for the collector's ingest, raw, ack and health endpoints

use crate::ack::{AckId, AckPoller};
use crate::config::HecConfig;
use crate::errors::{HecError, Result};
use async_trait::async_trait;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, HeaderMap, HeaderName, HeaderValue};
use reqwest::{Certificate, Client, Identity, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use tracing::{debug, info, warn};

pub const EVENT_PATH: &str = "/services/collector";
pub const RAW_PATH: &str = "/services/collector/raw";
pub const ACK_PATH: &str = "/services/collector/ack";
pub const HEALTH_PATH: &str = "/services/collector/health";

pub const CHANNEL_HEADER: &str = "x-splunk-request-channel";

/// Body of a successful ingest response
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct IngestResponse {
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub code: Option<i64>,
    #[serde(default, rename = "ackId")]
    pub ack_id: Option<AckId>,
}

#[derive(Serialize)]
struct AckRequest<'a> {
    acks: [&'a AckId; 1],
}

#[derive(Debug, Default, Deserialize)]
struct AckResponse {
    #[serde(default)]
    acks: HashMap<String, bool>,
}

/// Collector health as reported by the health endpoint
#[derive(Debug, Clone)]
pub struct CollectorHealth {
    pub healthy: bool,
    pub status: u16,
    pub text: String,
}

/// HTTP client for one collector, configured once at startup
#[derive(Debug, Clone)]
pub struct HecClient {
    client: Client,
    base_url: String,
    raw: bool,
    raw_query: Vec<(&'static str, String)>,
}

impl HecClient {
    /// Build the client: default headers, TLS trust store and client identity
    pub fn new(config: &HecConfig) -> Result<Self> {
        let mut builder = Client::builder()
            .timeout(config.request_timeout)
            .user_agent(format!("hec_forwarder/{}", env!("CARGO_PKG_VERSION")))
            .default_headers(default_headers(config)?);

        if config.ssl_verify_peer {
            builder = builder.https_only(true);
        }

        if let Some(ca_file) = &config.ca_file {
            let pem = read_tls_file(ca_file, "ca_file")?;
            let cert = Certificate::from_pem(&pem)
                .map_err(|e| HecError::Config(format!("invalid ca_file {}: {}", ca_file.display(), e)))?;
            builder = builder.add_root_certificate(cert);
        }

        if let Some(identity) = client_identity(config)? {
            builder = builder.identity(identity);
        }

        let client = builder.build().map_err(HecError::Transport)?;

        Ok(Self {
            client,
            base_url: config.base_url(),
            raw: config.raw,
            raw_query: config.raw_query(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// POST one assembled payload to the event or raw endpoint
    pub async fn send_payload(&self, payload: String) -> Result<IngestResponse> {
        let request = if self.raw {
            self.client
                .post(format!("{}{}", self.base_url, RAW_PATH))
                .query(&self.raw_query)
        } else {
            self.client.post(format!("{}{}", self.base_url, EVENT_PATH))
        };

        debug!("Posting {} bytes to collector", payload.len());

        let response = request.body(payload).send().await?;
        let body = expect_success(response).await?;
        let ingest: IngestResponse = parse_body(&body)?;
        debug!(
            code = ?ingest.code,
            "Collector response: {}",
            ingest.text.as_deref().unwrap_or_default()
        );

        Ok(ingest)
    }

    /// Ask whether the collector has indexed the data behind `ack_id`
    pub async fn check_ack(&self, ack_id: &AckId) -> Result<bool> {
        let response = self
            .client
            .post(format!("{}{}", self.base_url, ACK_PATH))
            .json(&AckRequest { acks: [ack_id] })
            .send()
            .await?;

        let body = expect_success(response).await?;
        let acks: AckResponse = parse_body(&body)?;

        Ok(acks.acks.get(&ack_id.to_string()).copied().unwrap_or(false))
    }

    /// Query the collector health endpoint
    pub async fn health_check(&self) -> Result<CollectorHealth> {
        let url = format!("{}{}", self.base_url, HEALTH_PATH);
        debug!("Performing health check against {}", url);

        let response = self.client.get(&url).send().await?;
        let status = response.status();
        let body = response.text().await?;
        let parsed: IngestResponse = serde_json::from_str(&body).unwrap_or_default();

        Ok(CollectorHealth {
            healthy: status.is_success(),
            status: status.as_u16(),
            text: parsed.text.unwrap_or(body),
        })
    }

    /// Test connectivity to the collector
    pub async fn test_connectivity(&self) -> bool {
        match self.health_check().await {
            Ok(health) if health.healthy => {
                info!("Collector connectivity test successful: {}", health.text);
                true
            }
            Ok(health) => {
                warn!("Collector reported unhealthy ({}): {}", health.status, health.text);
                false
            }
            Err(e) => {
                warn!("Collector connectivity test failed: {}", e);
                false
            }
        }
    }
}

#[async_trait]
impl AckPoller for HecClient {
    async fn poll_ack(&self, ack_id: &AckId) -> Result<bool> {
        self.check_ack(ack_id).await
    }
}

fn default_headers(config: &HecConfig) -> Result<HeaderMap> {
    let mut headers = HeaderMap::new();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

    let mut auth = HeaderValue::from_str(&format!("Splunk {}", config.token))
        .map_err(|_| HecError::Config("'token' contains invalid header characters".to_string()))?;
    auth.set_sensitive(true);
    headers.insert(AUTHORIZATION, auth);

    if let Some(channel) = &config.channel {
        let value = HeaderValue::from_str(channel)
            .map_err(|_| HecError::Config("'channel' contains invalid header characters".to_string()))?;
        headers.insert(HeaderName::from_static(CHANNEL_HEADER), value);
    }

    Ok(headers)
}

/// PEM cert/key pair, or a PKCS#12 bundle in `client_cert` when a passphrase is set
fn client_identity(config: &HecConfig) -> Result<Option<Identity>> {
    let Some(cert_path) = &config.client_cert else {
        return Ok(None);
    };
    let cert = read_tls_file(cert_path, "client_cert")?;

    let identity = match (&config.client_key_pass, &config.client_key) {
        (Some(pass), None) => Identity::from_pkcs12_der(&cert, pass),
        (None, Some(key_path)) => {
            let key = read_tls_file(key_path, "client_key")?;
            Identity::from_pkcs8_pem(&cert, &key)
        }
        (Some(_), Some(_)) => {
            return Err(HecError::Config(
                "'client_key_pass' and 'client_key' cannot be combined".to_string(),
            ));
        }
        (None, None) => return Ok(None),
    };

    identity
        .map(Some)
        .map_err(|e| HecError::Config(format!("invalid client identity: {}", e)))
}

fn read_tls_file(path: &Path, option: &str) -> Result<Vec<u8>> {
    std::fs::read(path)
        .map_err(|e| HecError::Config(format!("failed to read {} {}: {}", option, path.display(), e)))
}

async fn expect_success(response: reqwest::Response) -> Result<String> {
    let status = response.status();
    let body = response.text().await?;

    if status.is_success() {
        return Ok(body);
    }

    warn!("{} ({}): {}", describe_status(status), status.as_u16(), body);
    Err(HecError::UnexpectedStatus {
        status: status.as_u16(),
        body,
    })
}

fn parse_body<T: DeserializeOwned>(body: &str) -> Result<T> {
    serde_json::from_str(body).map_err(|e| HecError::MalformedResponse(format!("{}: {}", e, body)))
}

fn describe_status(status: StatusCode) -> &'static str {
    match status.as_u16() {
        400 => "Collector rejected the request",
        401 => "Collector requires a valid token",
        403 => "Token is disabled or forbidden",
        404 => "Collector endpoint not found",
        413 => "Payload too large",
        429 => "Collector is rate limiting",
        503 => "Collector is busy",
        500..=599 => "Collector server error",
        _ => "Unexpected collector response",
    }
}
