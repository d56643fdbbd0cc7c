//! Runtime configuration.
//!
//! Loaded from the YAML file named by `RELAY_CONFIG` when set, then
//! overridden by `LISTEN`, `UPSTREAM_URL` and `UPSTREAM_INSECURE_SKIP_VERIFY`.

use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub upstream: UpstreamConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,

    /// Query parameter carrying the upstream path.
    #[serde(default = "default_route_param")]
    pub route_param: String,

    /// Upper bound for a buffered inbound request (head and body).
    #[serde(default = "default_max_request_bytes")]
    pub max_request_bytes: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UpstreamConfig {
    /// Base address every route is appended to. Must not end in `/`.
    #[serde(default)]
    pub base_url: String,

    /// Accept any certificate and host name from an https upstream.
    ///
    /// This removes all protection against interception between the relay
    /// and the upstream. Only enable it for upstreams reached over a network
    /// you already trust.
    #[serde(default)]
    pub insecure_skip_verify: bool,

    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,

    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
}

fn default_listen_addr() -> String {
    "127.0.0.1:8080".to_string()
}

fn default_route_param() -> String {
    "route".to_string()
}

fn default_max_request_bytes() -> usize {
    10 * 1024 * 1024
}

fn default_connect_timeout_ms() -> u64 {
    5_000
}

fn default_request_timeout_ms() -> u64 {
    30_000
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
            route_param: default_route_param(),
            max_request_bytes: default_max_request_bytes(),
        }
    }
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            insecure_skip_verify: false,
            connect_timeout_ms: default_connect_timeout_ms(),
            request_timeout_ms: default_request_timeout_ms(),
        }
    }
}

impl UpstreamConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            ..Self::default()
        }
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn validate(&self) -> Result<()> {
        if self.base_url.is_empty() {
            anyhow::bail!("upstream base_url is required (set UPSTREAM_URL)");
        }
        if self.base_url.ends_with('/') {
            anyhow::bail!("upstream base_url must not end in a trailing slash: {}", self.base_url);
        }

        let url = url::Url::parse(&self.base_url)
            .with_context(|| format!("Invalid upstream base_url: {}", self.base_url))?;
        if url.scheme() != "http" && url.scheme() != "https" {
            anyhow::bail!("upstream base_url must use http or https, got {}", url.scheme());
        }
        if url.host_str().is_none() {
            anyhow::bail!("upstream base_url has no host: {}", self.base_url);
        }

        if self.connect_timeout_ms == 0 || self.request_timeout_ms == 0 {
            anyhow::bail!("upstream timeouts must be greater than zero");
        }

        Ok(())
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        let mut cfg = match std::env::var("RELAY_CONFIG") {
            Ok(path) => {
                let raw = std::fs::read_to_string(&path)
                    .with_context(|| format!("Failed to read config file {}", path))?;
                Self::from_yaml(&raw)?
            }
            Err(_) => Self {
                server: ServerConfig::default(),
                upstream: UpstreamConfig::default(),
            },
        };

        if let Ok(listen_addr) = std::env::var("LISTEN") {
            cfg.server.listen_addr = listen_addr;
        }
        if let Ok(base_url) = std::env::var("UPSTREAM_URL") {
            cfg.upstream.base_url = base_url;
        }
        if let Ok(flag) = std::env::var("UPSTREAM_INSECURE_SKIP_VERIFY") {
            cfg.upstream.insecure_skip_verify = matches!(flag.as_str(), "1" | "true" | "yes");
        }

        cfg.validate()?;
        Ok(cfg)
    }

    pub fn from_yaml(raw: &str) -> Result<Self> {
        serde_yaml::from_str(raw).context("Failed to parse YAML config")
    }

    pub fn validate(&self) -> Result<()> {
        if self.server.route_param.is_empty() {
            anyhow::bail!("server route_param must not be empty");
        }
        self.upstream.validate()
    }
}
