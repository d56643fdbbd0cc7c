//! Tests for relaying the parsed response to the caller

use ajax_relay::http::response::StatusCode;
use ajax_relay::proxy::headers::Headers;
use ajax_relay::proxy::relay::relay;
use ajax_relay::proxy::response::{parse_response, ParsedResponse};
use ajax_relay::proxy::upstream::RawUpstreamResponse;

fn parsed(status: u16, headers: &[(&str, &str)], body: &[u8]) -> ParsedResponse {
    ParsedResponse {
        status: StatusCode::from_u16(status).unwrap(),
        status_line: format!("HTTP/1.1 {}", status),
        headers: headers.iter().copied().collect::<Headers>(),
        body: body.to_vec(),
    }
}

#[test]
fn test_relay_copies_status_headers_and_body() {
    let response = relay(parsed(
        404,
        &[("Content-Type", "application/json"), ("X-Trace", "t1")],
        br#"{"error":"missing"}"#,
    ));

    assert_eq!(response.status.as_u16(), 404);
    assert_eq!(response.header("Content-Type"), Some("application/json"));
    assert_eq!(response.header("X-Trace"), Some("t1"));
    assert_eq!(response.body, br#"{"error":"missing"}"#.to_vec());
}

#[test]
fn test_relay_suppresses_status_and_content_length() {
    let response = relay(parsed(
        200,
        &[("status", "HTTP/1.1 200"), ("Content-Length", "9999"), ("ETag", "\"v1\"")],
        b"hello",
    ));

    assert!(!response.headers.iter().any(|(n, _)| n == "status"));
    assert_eq!(response.header("Content-Length"), Some("5"));
    assert_eq!(
        response
            .headers
            .iter()
            .filter(|(n, _)| n.eq_ignore_ascii_case("Content-Length"))
            .count(),
        1
    );
    assert_eq!(response.header("ETag"), Some("\"v1\""));
}

#[test]
fn test_relay_never_emits_transfer_encoding() {
    let raw = RawUpstreamResponse {
        header_block: b"HTTP/1.1 200 OK\r\nTransfer-Encoding: chunked\r\nContent-Type: text/plain\r\n\r\n".to_vec(),
        body: b"Wikipedia".to_vec(),
    };

    let response = relay(parse_response(raw).unwrap());

    assert_eq!(response.header("Transfer-Encoding"), None);
    assert_eq!(response.header("Content-Length"), Some("9"));
    assert_eq!(response.body, b"Wikipedia".to_vec());
}
