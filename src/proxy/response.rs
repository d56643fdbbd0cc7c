//! Upstream response parsing
//!
//! The header block may hold several heads when the upstream sent interim
//! responses before the final one. Only the lines from the last status line
//! onward describe the response being relayed.

use crate::error::{ProxyError, Result};
use crate::http::response::StatusCode;
use crate::proxy::headers::Headers;
use crate::proxy::upstream::RawUpstreamResponse;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedResponse {
    pub status: StatusCode,
    /// The retained status line, e.g. `HTTP/1.1 200 OK`
    pub status_line: String,
    /// Last-write-wins per exact name; never contains `Transfer-Encoding`
    pub headers: Headers,
    pub body: Vec<u8>,
}

/// Whether `line` starts a response head.
pub fn is_status_line(line: &str) -> bool {
    line.get(..5)
        .is_some_and(|prefix| prefix.eq_ignore_ascii_case("HTTP/"))
}

/// Extracts the numeric code from a status line such as `HTTP/1.1 404 Not Found`.
///
/// The code must be exactly three digits in 100–599.
pub fn parse_status_code(line: &str) -> Option<StatusCode> {
    if !is_status_line(line) {
        return None;
    }

    let code = line.split_whitespace().nth(1)?;
    if code.len() != 3 || !code.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }

    code.parse().ok().and_then(StatusCode::from_u16)
}

pub fn parse_response(raw: RawUpstreamResponse) -> Result<ParsedResponse> {
    let RawUpstreamResponse { header_block, body } = raw;

    let text = String::from_utf8_lossy(&header_block);
    let lines: Vec<&str> = text
        .split('\n')
        .map(|line| line.strip_suffix('\r').unwrap_or(line))
        .collect();

    let start = lines
        .iter()
        .rposition(|line| is_status_line(line))
        .ok_or_else(|| ProxyError::InvalidUpstreamResponse("no status line".to_string()))?;

    let status_line = lines[start].trim();
    let status = parse_status_code(status_line).ok_or_else(|| {
        ProxyError::InvalidUpstreamResponse(format!("no status code in: {}", status_line))
    })?;

    let mut headers = Headers::new();
    for line in &lines[start + 1..] {
        let Some((field, value)) = line.split_once(':') else {
            continue;
        };
        if field.is_empty() {
            continue;
        }
        headers.insert(field, value.trim());
    }

    if headers.remove_ignore_case("Transfer-Encoding").is_some() {
        tracing::trace!("Dropped upstream Transfer-Encoding");
    }

    Ok(ParsedResponse {
        status,
        status_line: status_line.to_string(),
        headers,
        body,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_codes() {
        assert_eq!(parse_status_code("HTTP/1.1 200 OK").map(|s| s.as_u16()), Some(200));
        assert_eq!(parse_status_code("http/1.0 404 Not Found").map(|s| s.as_u16()), Some(404));
        assert_eq!(parse_status_code("HTTP/2 301").map(|s| s.as_u16()), Some(301));
        assert!(parse_status_code("HTTP/1.1 OK").is_none());
        assert!(parse_status_code("HTTP/1.1 2000 Big").is_none());
        assert!(parse_status_code("HTTP/1.1 099 Low").is_none());
        assert!(parse_status_code("Status: 200").is_none());
    }
}
