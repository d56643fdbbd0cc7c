//! Relay pipeline
//!
//! One inbound request flows through four stages, each producing a new
//! value for the next:
//!
//! ```text
//! RequestSource ─capture─▶ InboundRequest ─prepare─▶ ForwardedRequest
//!   ─execute─▶ RawUpstreamResponse ─parse─▶ ParsedResponse ─relay─▶ Response
//! ```

pub mod capture;
pub mod form;
pub mod headers;
pub mod relay;
pub mod response;
pub mod tls;
pub mod upstream;

pub use capture::{InboundRequest, Method, RequestSource};
pub use headers::Headers;
pub use response::ParsedResponse;
pub use upstream::{ForwardedRequest, RawUpstreamResponse, UpstreamForwarder};

use std::time::Instant;

use crate::config::{Config, UpstreamConfig};
use crate::error::Result;
use crate::http::response::Response;

/// Relays requests to one configured upstream.
pub struct Proxy {
    forwarder: UpstreamForwarder,
    route_param: String,
}

impl Proxy {
    pub fn new(upstream: &UpstreamConfig, route_param: impl Into<String>) -> anyhow::Result<Self> {
        Ok(Self {
            forwarder: UpstreamForwarder::new(upstream)?,
            route_param: route_param.into(),
        })
    }

    pub fn from_config(cfg: &Config) -> anyhow::Result<Self> {
        Self::new(&cfg.upstream, cfg.server.route_param.clone())
    }

    pub fn forwarder(&self) -> &UpstreamForwarder {
        &self.forwarder
    }

    /// Handles one inbound request to completion. Makes at most one upstream
    /// call; any failure aborts the remaining stages.
    pub async fn execute<S: RequestSource + ?Sized>(&self, source: &S) -> Result<Response> {
        let started = Instant::now();

        let inbound = capture::capture(source, &self.route_param)?;
        let method = inbound.method;
        let route = inbound.route.clone();

        let forwarded = self.forwarder.prepare(inbound);
        let raw = self.forwarder.execute(&forwarded).await?;
        let parsed = response::parse_response(raw)?;

        tracing::info!(
            method = %method,
            route = %route,
            status = parsed.status.as_u16(),
            body_len = parsed.body.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Request relayed"
        );

        Ok(relay::relay(parsed))
    }
}
