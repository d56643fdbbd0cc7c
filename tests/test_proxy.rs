//! Tests for building the upstream request

use ajax_relay::config::UpstreamConfig;
use ajax_relay::error::ProxyError;
use ajax_relay::proxy::capture::{InboundRequest, Method};
use ajax_relay::proxy::headers::Headers;
use ajax_relay::proxy::upstream::{forwarded_body, ForwardedRequest, UpstreamForwarder};
use std::net::IpAddr;

fn forwarder() -> UpstreamForwarder {
    UpstreamForwarder::new(&UpstreamConfig::new("http://localhost:3000")).unwrap()
}

fn inbound(method: Method, route: &str, headers: &[(&str, &str)], body: &[u8]) -> InboundRequest {
    InboundRequest {
        method,
        route: route.to_string(),
        headers: headers.iter().copied().collect(),
        body: body.to_vec(),
        client_addr: Some("198.51.100.7".parse::<IpAddr>().unwrap()),
        host: Some("relay.example.com".to_string()),
    }
}

fn wire(forwarder: &UpstreamForwarder, request: &ForwardedRequest) -> String {
    let url = url::Url::parse(&request.url).unwrap();
    String::from_utf8(forwarder.build_http_request(request, &url)).unwrap()
}

#[test]
fn test_target_is_base_plus_route_verbatim() {
    let f = forwarder();
    let req = f.prepare(inbound(Method::Get, "/items?page=2", &[], b""));
    assert_eq!(req.url, "http://localhost:3000/items?page=2");

    let req = f.prepare(inbound(Method::Get, "/a/../b", &[], b""));
    assert_eq!(req.url, "http://localhost:3000/a/../b");
    // Dot segments are resolved when the request line is written
    assert!(wire(&f, &req).starts_with("GET /b HTTP/1.1\r\n"));
}

#[tokio::test]
async fn test_route_cannot_extend_upstream_host() {
    let f = UpstreamForwarder::new(&UpstreamConfig::new("http://api.internal.example")).unwrap();

    for route in [".evil.tld/x", "@127.0.0.1:9/secret", ":8443/x"] {
        let req = f.prepare(inbound(Method::Get, route, &[], b""));
        let err = f.execute(&req).await.unwrap_err();
        assert!(matches!(err, ProxyError::InvalidTarget(_)), "{}", route);
    }
}

#[test]
fn test_get_and_delete_forward_no_body() {
    assert_eq!(forwarded_body(Method::Get, b"ignored".to_vec()), None);
    assert_eq!(forwarded_body(Method::Delete, b"ignored-payload".to_vec()), None);

    let f = forwarder();
    let req = f.prepare(inbound(Method::Delete, "/items/5", &[], b"ignored-payload"));
    assert_eq!(req.body, None);

    let wire = wire(&f, &req);
    assert!(wire.starts_with("DELETE /items/5 HTTP/1.1\r\n"));
    assert!(!wire.contains("Content-Length"));
    assert!(wire.ends_with("\r\n\r\n"));
}

#[test]
fn test_post_forwards_body_unchanged() {
    let body = br#"{"qty":3}"#.to_vec();
    assert_eq!(forwarded_body(Method::Post, body.clone()), Some(body));
    assert_eq!(forwarded_body(Method::Post, vec![0, 159, 146, 150]), Some(vec![0, 159, 146, 150]));
}

#[test]
fn test_put_json_is_form_encoded() {
    assert_eq!(
        forwarded_body(Method::Put, br#"{"qty":3}"#.to_vec()),
        Some(b"qty=3".to_vec())
    );

    let f = forwarder();
    let req = f.prepare(inbound(Method::Put, "/items/5", &[("Content-Length", "9")], br#"{"qty":3}"#));
    let wire = wire(&f, &req);
    assert!(wire.contains("Content-Length: 5\r\n"));
    assert!(!wire.contains("Content-Length: 9"));
    assert!(wire.ends_with("\r\n\r\nqty=3"));
}

#[test]
fn test_put_non_json_is_forwarded_raw() {
    assert_eq!(
        forwarded_body(Method::Put, b"qty=3&name=x".to_vec()),
        Some(b"qty=3&name=x".to_vec())
    );
    assert_eq!(forwarded_body(Method::Put, b"42".to_vec()), Some(b"42".to_vec()));
    assert_eq!(forwarded_body(Method::Put, Vec::new()), None);
}

#[test]
fn test_excluded_headers_are_not_forwarded() {
    let f = forwarder();
    let req = f.prepare(inbound(
        Method::Get,
        "/",
        &[
            ("Host", "relay.example.com"),
            ("Connection", "keep-alive"),
            ("Upgrade-Insecure-Requests", "1"),
            ("upgrade-insecure-requests", "1"),
            ("User-Agent", "Test"),
        ],
        b"",
    ));

    for (name, _) in req.headers.iter() {
        assert!(!name.eq_ignore_ascii_case("Host"));
        assert!(!name.eq_ignore_ascii_case("Connection"));
        assert!(!name.eq_ignore_ascii_case("Upgrade-Insecure-Requests"));
    }
    assert_eq!(req.headers.get("User-Agent"), Some("Test"));

    let wire = wire(&f, &req);
    assert!(wire.contains("Host: localhost:3000\r\n"));
    assert!(!wire.contains("Host: relay.example.com"));
    assert!(wire.contains("Connection: close\r\n"));
    assert!(!wire.contains("keep-alive"));
    assert!(!wire.to_ascii_lowercase().contains("upgrade-insecure-requests"));
}

#[test]
fn test_cookie_is_sent_exactly_once() {
    let f = forwarder();
    let req = f.prepare(inbound(Method::Get, "/", &[("Cookie", "sid=abc; theme=dark")], b""));

    assert_eq!(req.cookie.as_deref(), Some("sid=abc; theme=dark"));
    assert!(!req.headers.contains_ignore_case("Cookie"));

    let wire = wire(&f, &req);
    assert_eq!(wire.matches("Cookie: ").count(), 1);
    assert!(wire.contains("Cookie: sid=abc; theme=dark\r\n"));
}

#[test]
fn test_cookie_variants_are_joined() {
    let f = forwarder();
    let req = f.prepare(inbound(
        Method::Get,
        "/",
        &[("Cookie", "sid=abc"), ("cookie", "theme=dark")],
        b"",
    ));

    assert_eq!(req.cookie.as_deref(), Some("sid=abc; theme=dark"));
    let wire = wire(&f, &req);
    assert_eq!(wire.to_ascii_lowercase().matches("cookie: ").count(), 1);
}

#[test]
fn test_no_cookie_header_without_cookie() {
    let f = forwarder();
    let req = f.prepare(inbound(Method::Get, "/", &[], b""));

    assert_eq!(req.cookie, None);
    assert!(!wire(&f, &req).contains("Cookie"));
}

#[test]
fn test_synthetic_headers() {
    let f = forwarder();
    let req = f.prepare(inbound(Method::Get, "/", &[("x-forwarded-for", "10.9.9.9")], b""));

    assert_eq!(req.headers.get("REMOTE_ADDR"), Some("198.51.100.7"));
    assert_eq!(req.headers.get("X-Forwarded-For"), Some("198.51.100.7"));
    assert_eq!(req.headers.get("X-app-ip"), Some("198.51.100.7"));
    assert_eq!(req.headers.get("X-app-hostname"), Some("relay.example.com"));
    assert_eq!(req.headers.get("x-forwarded-for"), None);
}

#[test]
fn test_synthetic_headers_omitted_when_unknown() {
    let f = forwarder();
    let mut request = inbound(Method::Get, "/", &[], b"");
    request.client_addr = None;
    request.host = None;

    let req = f.prepare(request);
    assert_eq!(req.headers, Headers::new());
}

#[test]
fn test_build_http_request_default_path() {
    let f = forwarder();
    let req = f.prepare(inbound(Method::Get, "", &[], b""));

    assert!(wire(&f, &req).starts_with("GET / HTTP/1.1\r\n"));
}

#[test]
fn test_build_http_request_post_with_empty_body() {
    let f = forwarder();
    let req = f.prepare(inbound(Method::Post, "/items", &[], b""));

    assert_eq!(req.body, Some(Vec::new()));
    assert!(wire(&f, &req).contains("Content-Length: 0\r\n"));
}
