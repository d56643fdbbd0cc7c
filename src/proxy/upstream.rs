//! Upstream request forwarding
//!
//! Builds the request sent to the configured upstream from a captured
//! inbound request, performs exactly one call, and returns the raw header
//! block and body for the parser.

use std::time::Duration;

use bytes::BytesMut;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_rustls::TlsConnector;
use url::{Host, Url};

use crate::config::UpstreamConfig;
use crate::error::{ProxyError, Result};
use crate::http::parser::find_headers_end;
use crate::http::response::StatusCode;
use crate::proxy::capture::{InboundRequest, Method};
use crate::proxy::form;
use crate::proxy::headers::Headers;
use crate::proxy::response::parse_status_code;
use crate::proxy::tls;

/// Inbound headers never replayed to the upstream.
pub const EXCLUDED_HEADERS: [&str; 3] = ["Host", "Connection", "Upgrade-Insecure-Requests"];

/// Headers carrying the caller's IP, one per upstream convention.
pub const CLIENT_IP_HEADERS: [&str; 3] = ["REMOTE_ADDR", "X-Forwarded-For", "X-app-ip"];

/// Header carrying the host name the caller addressed.
pub const CLIENT_HOST_HEADER: &str = "X-app-hostname";

/// Written by the transport from the actual body, never copied.
const FRAMING_HEADERS: [&str; 2] = ["Content-Length", "Transfer-Encoding"];

/// Default buffer size for reading
const BUFFER_SIZE: usize = 8192;

/// Limit for the accumulated response header block
const MAX_HEADER_BYTES: usize = 64 * 1024;

/// Largest single chunk accepted from a chunked upstream body
const MAX_CHUNK_BYTES: usize = 256 * 1024 * 1024;

/// The request about to be sent upstream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForwardedRequest {
    /// Upstream base followed by the route, unnormalized
    pub url: String,
    pub method: Method,
    /// Replayed and synthetic headers; never contains `Cookie`
    pub headers: Headers,
    /// Sent once as the `Cookie` header
    pub cookie: Option<String>,
    /// `None` means no payload at all
    pub body: Option<Vec<u8>>,
}

/// Unparsed upstream response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawUpstreamResponse {
    /// Every status line and header section received, interim ones included
    pub header_block: Vec<u8>,
    /// Body bytes with any chunked coding removed
    pub body: Vec<u8>,
}

/// Forwards requests to one fixed upstream.
pub struct UpstreamForwarder {
    base_url: String,
    base: Url,
    tls: TlsConnector,
    connect_timeout: Duration,
    request_timeout: Duration,
}

impl UpstreamForwarder {
    pub fn new(config: &UpstreamConfig) -> anyhow::Result<Self> {
        config.validate()?;

        Ok(Self {
            base_url: config.base_url.clone(),
            base: Url::parse(&config.base_url)?,
            tls: tls::build_connector(config.insecure_skip_verify)?,
            connect_timeout: config.connect_timeout(),
            request_timeout: config.request_timeout(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Derives the upstream request from the captured one. No I/O.
    pub fn prepare(&self, inbound: InboundRequest) -> ForwardedRequest {
        let InboundRequest {
            method,
            route,
            mut headers,
            body,
            client_addr,
            host,
        } = inbound;

        headers.retain(|name, _| {
            !EXCLUDED_HEADERS
                .iter()
                .any(|excluded| name.eq_ignore_ascii_case(excluded))
        });

        let cookies = headers.remove_all_ignore_case("Cookie");
        let cookie = (!cookies.is_empty()).then(|| cookies.join("; "));

        if let Some(ip) = client_addr {
            let ip = ip.to_string();
            for name in CLIENT_IP_HEADERS {
                headers.remove_ignore_case(name);
                headers.insert(name, ip.clone());
            }
        }
        if let Some(host) = host {
            headers.remove_ignore_case(CLIENT_HOST_HEADER);
            headers.insert(CLIENT_HOST_HEADER, host);
        }

        ForwardedRequest {
            url: format!("{}{}", self.base_url, route),
            method,
            headers,
            cookie,
            body: forwarded_body(method, body),
        }
    }

    /// Performs the upstream call. The connection is opened here and closed
    /// before returning, on success and failure alike.
    pub async fn execute(&self, request: &ForwardedRequest) -> Result<RawUpstreamResponse> {
        let url = target_url(&request.url)?;
        if !self.is_upstream_origin(&url) {
            return Err(ProxyError::InvalidTarget(format!(
                "{} leaves upstream {}",
                request.url, self.base_url
            )));
        }
        let host = match url.host() {
            Some(Host::Domain(domain)) => domain.to_string(),
            Some(Host::Ipv4(ip)) => ip.to_string(),
            Some(Host::Ipv6(ip)) => ip.to_string(),
            None => return Err(ProxyError::InvalidTarget(request.url.clone())),
        };
        let port = url
            .port_or_known_default()
            .ok_or_else(|| ProxyError::InvalidTarget(request.url.clone()))?;

        let request_bytes = self.build_http_request(request, &url);

        tracing::debug!(
            method = %request.method,
            url = %request.url,
            body_len = request.body.as_ref().map_or(0, Vec::len),
            "Forwarding request upstream"
        );

        // Connect with timeout
        let stream = timeout(self.connect_timeout, TcpStream::connect((host.as_str(), port)))
            .await
            .map_err(|_| ProxyError::UpstreamTimeout(self.connect_timeout))??;

        tracing::trace!(host = %host, port, "Connected to upstream");

        timeout(
            self.request_timeout,
            self.exchange(&url, &host, stream, &request_bytes),
        )
        .await
        .map_err(|_| ProxyError::UpstreamTimeout(self.request_timeout))?
    }

    /// Whether `url` still addresses the configured upstream. A route can
    /// rewrite the authority once appended to the base (`@host/`, `.tld/`).
    fn is_upstream_origin(&self, url: &Url) -> bool {
        url.scheme() == self.base.scheme()
            && url.host() == self.base.host()
            && url.port_or_known_default() == self.base.port_or_known_default()
    }

    /// Wraps the connection in TLS when the target is https, then sends
    /// the request and reads the full response.
    async fn exchange(
        &self,
        url: &Url,
        host: &str,
        stream: TcpStream,
        request_bytes: &[u8],
    ) -> Result<RawUpstreamResponse> {
        if url.scheme() == "https" {
            let name = tls::server_name(host)
                .map_err(|e| ProxyError::InvalidTarget(e.to_string()))?;
            let stream = self.tls.connect(name, stream).await?;
            send_request_and_receive_response(stream, request_bytes).await
        } else {
            send_request_and_receive_response(stream, request_bytes).await
        }
    }

    /// Serializes the request as HTTP/1.1 bytes for `url`.
    pub fn build_http_request(&self, request: &ForwardedRequest, url: &Url) -> Vec<u8> {
        let mut buffer = Vec::new();

        // Request line
        let mut target = url.path().to_string();
        if let Some(query) = url.query() {
            target.push('?');
            target.push_str(query);
        }
        buffer.extend_from_slice(format!("{} {} HTTP/1.1\r\n", request.method, target).as_bytes());

        // Host is the upstream's authority, never the caller's
        if let Some(host) = url.host_str() {
            let host_value = match url.port() {
                Some(port) => format!("{}:{}", host, port),
                None => host.to_string(),
            };
            buffer.extend_from_slice(format!("Host: {}\r\n", host_value).as_bytes());
        }

        for (name, value) in request.headers.iter() {
            if FRAMING_HEADERS.iter().any(|f| name.eq_ignore_ascii_case(f)) {
                continue;
            }
            if has_line_break(name) || has_line_break(value) {
                tracing::debug!(header = %name, "Dropping header containing a line break");
                continue;
            }
            buffer.extend_from_slice(format!("{}: {}\r\n", name, value).as_bytes());
        }

        if let Some(cookie) = request.cookie.as_deref().filter(|c| !c.is_empty()) {
            if !has_line_break(cookie) {
                buffer.extend_from_slice(format!("Cookie: {}\r\n", cookie).as_bytes());
            }
        }

        if let Some(body) = &request.body {
            buffer.extend_from_slice(format!("Content-Length: {}\r\n", body.len()).as_bytes());
        }

        buffer.extend_from_slice(b"Connection: close\r\n");

        // End of headers
        buffer.extend_from_slice(b"\r\n");

        if let Some(body) = &request.body {
            buffer.extend_from_slice(body);
        }

        buffer
    }
}

/// Applies the per-method body policy.
///
/// GET and DELETE never send a body. POST sends it unchanged. PUT sends a
/// JSON object or array form-encoded and anything else unchanged; an empty
/// PUT body is not sent.
pub fn forwarded_body(method: Method, body: Vec<u8>) -> Option<Vec<u8>> {
    match method {
        Method::Get | Method::Delete => None,
        Method::Post => Some(body),
        Method::Put if body.is_empty() => None,
        Method::Put => match form::encode_json_body(&body) {
            Some(encoded) => Some(encoded.into_bytes()),
            None => Some(body),
        },
    }
}

fn target_url(raw: &str) -> Result<Url> {
    let url = Url::parse(raw).map_err(|e| ProxyError::InvalidTarget(format!("{}: {}", raw, e)))?;

    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(ProxyError::InvalidTarget(format!("unsupported scheme in {}", raw)));
    }

    Ok(url)
}

fn has_line_break(value: &str) -> bool {
    value.contains(['\r', '\n'])
}

async fn send_request_and_receive_response<S>(
    mut stream: S,
    request_bytes: &[u8],
) -> Result<RawUpstreamResponse>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    stream.write_all(request_bytes).await?;
    stream.flush().await?;

    tracing::trace!("Request sent to upstream");

    read_http_response(&mut stream).await
}

/// Reads one complete response. Interim 1xx heads (except 101) are kept in
/// the header block and reading continues with the next head.
pub async fn read_http_response<S: AsyncRead + Unpin>(stream: &mut S) -> Result<RawUpstreamResponse> {
    let mut buffer = BytesMut::with_capacity(BUFFER_SIZE);
    let mut header_block = Vec::new();

    loop {
        let head = read_head(stream, &mut buffer).await?;
        let head_text = String::from_utf8_lossy(&head).into_owned();

        let status_line = head_text.lines().next().unwrap_or_default();
        let status = parse_status_code(status_line).ok_or_else(|| {
            ProxyError::InvalidUpstreamResponse(format!("invalid status line: {}", status_line))
        })?;

        header_block.extend_from_slice(&head);
        if header_block.len() > MAX_HEADER_BYTES {
            return Err(invalid("response headers too large"));
        }

        if status.is_informational() && status.as_u16() != 101 {
            tracing::trace!(status = status.as_u16(), "Interim upstream response");
            continue;
        }

        let body = read_body(stream, &mut buffer, status, &head_text).await?;
        return Ok(RawUpstreamResponse { header_block, body });
    }
}

async fn read_head<S: AsyncRead + Unpin>(stream: &mut S, buffer: &mut BytesMut) -> Result<Vec<u8>> {
    loop {
        if let Some(headers_end) = find_headers_end(&buffer[..]) {
            return Ok(buffer.split_to(headers_end + 4).to_vec());
        }

        // Prevent unbounded header growth
        if buffer.len() > MAX_HEADER_BYTES {
            return Err(invalid("response headers too large"));
        }

        let n = stream.read_buf(buffer).await?;
        if n == 0 {
            return Err(invalid("connection closed before response headers were complete"));
        }
    }
}

async fn read_body<S: AsyncRead + Unpin>(
    stream: &mut S,
    buffer: &mut BytesMut,
    status: StatusCode,
    head: &str,
) -> Result<Vec<u8>> {
    if status.is_informational() || matches!(status.as_u16(), 204 | 304) {
        return Ok(Vec::new());
    }

    let chunked = head_value(head, "Transfer-Encoding")
        .and_then(|v| v.rsplit(',').next())
        .is_some_and(|coding| coding.trim().eq_ignore_ascii_case("chunked"));
    if chunked {
        return read_chunked_body(stream, buffer).await;
    }

    if let Some(length) = head_value(head, "Content-Length") {
        let length = length
            .parse::<usize>()
            .map_err(|_| invalid(&format!("invalid Content-Length: {}", length)))?;
        return read_exact(stream, buffer, length).await;
    }

    // No framing: the body runs until the upstream closes.
    let mut body = buffer.split().to_vec();
    match stream.read_to_end(&mut body).await {
        Ok(_) => Ok(body),
        // TLS peers often close without close_notify
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => Ok(body),
        Err(e) => Err(e.into()),
    }
}

async fn read_chunked_body<S: AsyncRead + Unpin>(stream: &mut S, buffer: &mut BytesMut) -> Result<Vec<u8>> {
    let mut body = Vec::new();

    loop {
        let line = read_line(stream, buffer).await?;
        let line = String::from_utf8_lossy(&line);
        let size_str = line.split(';').next().unwrap_or_default().trim();
        let size = usize::from_str_radix(size_str, 16)
            .map_err(|_| invalid(&format!("invalid chunk size: {}", size_str)))?;

        if size == 0 {
            // Trailer section ends with an empty line
            while !read_line(stream, buffer).await?.is_empty() {}
            return Ok(body);
        }

        let framed = size
            .checked_add(2)
            .filter(|&len| len <= MAX_CHUNK_BYTES)
            .ok_or_else(|| invalid(&format!("chunk size too large: {}", size_str)))?;
        let chunk = read_exact(stream, buffer, framed).await?;
        if &chunk[size..] != b"\r\n" {
            return Err(invalid("chunk not terminated by CRLF"));
        }
        body.extend_from_slice(&chunk[..size]);
    }
}

async fn read_line<S: AsyncRead + Unpin>(stream: &mut S, buffer: &mut BytesMut) -> Result<Vec<u8>> {
    loop {
        if let Some(pos) = buffer.windows(2).position(|w| w == b"\r\n") {
            let line = buffer.split_to(pos + 2);
            return Ok(line[..pos].to_vec());
        }

        if buffer.len() > MAX_HEADER_BYTES {
            return Err(invalid("chunk header too large"));
        }

        if stream.read_buf(buffer).await? == 0 {
            return Err(invalid("connection closed inside chunked body"));
        }
    }
}

async fn read_exact<S: AsyncRead + Unpin>(
    stream: &mut S,
    buffer: &mut BytesMut,
    len: usize,
) -> Result<Vec<u8>> {
    while buffer.len() < len {
        buffer.reserve((len - buffer.len()).min(BUFFER_SIZE));
        if stream.read_buf(buffer).await? == 0 {
            return Err(invalid("connection closed before complete body received"));
        }
    }

    Ok(buffer.split_to(len).to_vec())
}

/// Last value of `name` in a single response head, ignoring ASCII case.
fn head_value<'a>(head: &'a str, name: &str) -> Option<&'a str> {
    head.lines()
        .skip(1)
        .filter_map(|line| line.split_once(':'))
        .filter(|(field, _)| field.trim().eq_ignore_ascii_case(name))
        .map(|(_, value)| value.trim())
        .last()
}

fn invalid(reason: &str) -> ProxyError {
    ProxyError::InvalidUpstreamResponse(reason.to_string())
}
