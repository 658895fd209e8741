//! Configuration management for the HEC forwarder

use crate::errors::{HecError, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HecConfig {
    /// Collector host name
    pub host: String,

    /// Collector HEC port
    pub port: u16,

    /// HEC token, sent as `Authorization: Splunk <token>`
    #[serde(skip_serializing)]
    pub token: String,

    pub default_host: Option<String>,
    pub host_key: Option<String>,
    pub default_source: Option<String>,
    pub source_key: Option<String>,
    pub default_index: Option<String>,
    pub index_key: Option<String>,
    pub sourcetype: Option<String>,

    /// Poll the ack endpoint until the collector confirms indexing
    pub use_ack: bool,

    /// Request channel, sent as `X-Splunk-Request-Channel`
    pub channel: Option<String>,

    /// Seconds between acknowledgement polls
    pub ack_interval: i64,

    /// Extra polls allowed after the first one
    pub ack_retry_limit: u32,

    /// Talk https and verify the collector certificate
    pub ssl_verify_peer: bool,
    pub ca_file: Option<PathBuf>,
    pub client_cert: Option<PathBuf>,
    pub client_key: Option<PathBuf>,
    #[serde(skip_serializing)]
    pub client_key_pass: Option<String>,

    /// Send records to the raw endpoint instead of as JSON envelopes
    pub raw: bool,

    /// Record field holding the event body
    pub event_key: Option<String>,

    /// Keep the record timestamp when `event_key` is set
    pub use_caller_time: bool,

    /// Terminator appended to every formatted event
    pub line_breaker: String,

    /// HTTP timeout for collector requests
    pub request_timeout: Duration,
}

impl Default for HecConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 8088,
            token: String::new(),
            default_host: None,
            host_key: None,
            default_source: None,
            source_key: None,
            default_index: None,
            index_key: None,
            sourcetype: None,
            use_ack: false,
            channel: None,
            ack_interval: 1,
            ack_retry_limit: 3,
            ssl_verify_peer: false,
            ca_file: None,
            client_cert: None,
            client_key: None,
            client_key_pass: None,
            raw: false,
            event_key: None,
            use_caller_time: false,
            line_breaker: "\n".to_string(),
            request_timeout: Duration::from_secs(10),
        }
    }
}

impl HecConfig {
    /// Load configuration from `HEC_*` environment variables
    pub fn from_env() -> Result<Self> {
        let mut config = HecConfig::default();

        if let Ok(host) = env::var("HEC_HOST") {
            config.host = host;
        }
        if let Some(port) = env_parse("HEC_PORT")? {
            config.port = port;
        }
        if let Ok(token) = env::var("HEC_TOKEN") {
            config.token = token;
        }

        config.default_host = env_opt("HEC_DEFAULT_HOST");
        config.host_key = env_opt("HEC_HOST_KEY");
        config.default_source = env_opt("HEC_DEFAULT_SOURCE");
        config.source_key = env_opt("HEC_SOURCE_KEY");
        config.default_index = env_opt("HEC_DEFAULT_INDEX");
        config.index_key = env_opt("HEC_INDEX_KEY");
        config.sourcetype = env_opt("HEC_SOURCETYPE");

        if let Some(use_ack) = env_flag("HEC_USE_ACK") {
            config.use_ack = use_ack;
        }
        config.channel = env_opt("HEC_CHANNEL");
        if let Some(interval) = env_parse("HEC_ACK_INTERVAL")? {
            config.ack_interval = interval;
        }
        if let Some(limit) = env_parse("HEC_ACK_RETRY_LIMIT")? {
            config.ack_retry_limit = limit;
        }

        if let Some(verify) = env_flag("HEC_SSL_VERIFY_PEER") {
            config.ssl_verify_peer = verify;
        }
        config.ca_file = env_opt("HEC_CA_FILE").map(PathBuf::from);
        config.client_cert = env_opt("HEC_CLIENT_CERT").map(PathBuf::from);
        config.client_key = env_opt("HEC_CLIENT_KEY").map(PathBuf::from);
        config.client_key_pass = env_opt("HEC_CLIENT_KEY_PASS");

        if let Some(raw) = env_flag("HEC_RAW") {
            config.raw = raw;
        }
        config.event_key = env_opt("HEC_EVENT_KEY");
        if let Some(use_caller_time) = env_flag("HEC_USE_CALLER_TIME") {
            config.use_caller_time = use_caller_time;
        }
        if let Ok(line_breaker) = env::var("HEC_LINE_BREAKER") {
            config.line_breaker = unescape(&line_breaker);
        }
        if let Some(seconds) = env_parse::<u64>("HEC_REQUEST_TIMEOUT_SECONDS")? {
            config.request_timeout = Duration::from_secs(seconds);
        }

        Ok(config)
    }

    /// Validate option combinations; any failure here keeps the pipeline from starting
    pub fn validate(&self) -> Result<()> {
        if self.host.is_empty() {
            return Err(config_error("'host' parameter cannot be empty"));
        }
        if self.token.is_empty() {
            return Err(config_error("'token' parameter is required"));
        }
        if self.use_ack && self.channel.is_none() {
            return Err(config_error("'channel' parameter is required when 'use_ack' is true"));
        }
        if self.use_ack && self.ack_interval < 0 {
            return Err(config_error("'ack_interval' parameter must be a non negative integer"));
        }
        if self.raw && self.event_key.is_none() {
            return Err(config_error("'event_key' parameter is required when 'raw' is true"));
        }
        if self.raw && self.channel.is_none() {
            return Err(config_error("'channel' parameter is required when 'raw' is true"));
        }
        if self.client_key.is_some() && self.client_cert.is_none() {
            return Err(config_error("'client_key' parameter requires 'client_cert'"));
        }
        if self.client_cert.is_some() && self.client_key.is_none() && self.client_key_pass.is_none() {
            return Err(config_error(
                "'client_cert' parameter requires 'client_key' or 'client_key_pass'",
            ));
        }
        if self.client_key_pass.is_some() && self.client_key.is_some() {
            return Err(config_error(
                "'client_key_pass' reads 'client_cert' as a PKCS#12 bundle; remove 'client_key'",
            ));
        }

        Ok(())
    }

    /// Scheme, host and port of the collector
    pub fn base_url(&self) -> String {
        let scheme = if self.ssl_verify_peer { "https" } else { "http" };
        format!("{}://{}:{}", scheme, self.host, self.port)
    }

    pub fn ack_interval(&self) -> Duration {
        Duration::from_secs(self.ack_interval.max(0) as u64)
    }

    /// Query parameters for the raw endpoint, taken from static defaults only
    pub fn raw_query(&self) -> Vec<(&'static str, String)> {
        [
            ("host", &self.default_host),
            ("source", &self.default_source),
            ("index", &self.default_index),
            ("sourcetype", &self.sourcetype),
        ]
        .into_iter()
        .filter_map(|(name, value)| value.clone().map(|v| (name, v)))
        .collect()
    }
}

fn config_error(msg: &str) -> HecError {
    HecError::Config(msg.to_string())
}

fn env_opt(name: &str) -> Option<String> {
    env::var(name).ok().filter(|value| !value.is_empty())
}

fn env_flag(name: &str) -> Option<bool> {
    env::var(name).ok().map(|value| value.to_lowercase() == "true")
}

fn env_parse<T: FromStr>(name: &str) -> Result<Option<T>> {
    match env::var(name) {
        Ok(value) => value
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| HecError::Config(format!("{} has an invalid value: {}", name, value))),
        Err(_) => Ok(None),
    }
}

/// Expand `\n`, `\r`, `\t` and `\\` so a line breaker can be given on one line
fn unescape(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut chars = value.chars();

    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('r') => out.push('\r'),
            Some('t') => out.push('\t'),
            Some('\\') => out.push('\\'),
            Some(other) => {
                out.push('\\');
                out.push(other);
            }
            None => out.push('\\'),
        }
    }

    out
}
