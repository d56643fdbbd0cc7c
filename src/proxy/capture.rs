//! Request capture
//!
//! Turns whatever the host transport received into an immutable
//! [`InboundRequest`]. The transport is reached only through
//! [`RequestSource`], so the pipeline never reads ambient state.

use std::fmt;
use std::net::IpAddr;

use crate::error::{ProxyError, Result};
use crate::http::request::Request;
use crate::proxy::headers::Headers;

/// Methods the relay forwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
    Put,
    Delete,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Put => "PUT",
            Method::Delete => "DELETE",
        }
    }

    /// Whether the inbound body is read at all for this method.
    pub fn carries_body(&self) -> bool {
        matches!(self, Method::Post | Method::Put)
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Read-only view of an inbound request as supplied by the host transport.
pub trait RequestSource {
    /// Method token, or `None` if the transport does not know it.
    fn method(&self) -> Option<&str>;

    /// Decoded query-string parameter.
    fn query_param(&self, name: &str) -> Option<String>;

    /// All header pairs in arrival order, or `None` if they cannot be read.
    fn headers(&self) -> Option<Vec<(String, String)>>;

    fn body(&self) -> &[u8];

    fn client_addr(&self) -> Option<IpAddr>;
}

impl RequestSource for Request {
    fn method(&self) -> Option<&str> {
        Some(self.method.as_str()).filter(|m| !m.is_empty())
    }

    fn query_param(&self, name: &str) -> Option<String> {
        Request::query_param(self, name)
    }

    fn headers(&self) -> Option<Vec<(String, String)>> {
        self.headers
            .iter()
            .map(|(name, value)| {
                String::from_utf8(value.clone())
                    .ok()
                    .map(|value| (name.clone(), value))
            })
            .collect()
    }

    fn body(&self) -> &[u8] {
        &self.body
    }

    fn client_addr(&self) -> Option<IpAddr> {
        self.remote_addr.map(|addr| addr.ip())
    }
}

/// Everything the forwarder needs from the inbound request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundRequest {
    pub method: Method,
    pub route: String,
    pub headers: Headers,
    /// Empty unless the method is POST or PUT.
    pub body: Vec<u8>,
    pub client_addr: Option<IpAddr>,
    /// Host name the caller addressed, from its `Host` header.
    pub host: Option<String>,
}

pub fn capture_method<S: RequestSource + ?Sized>(source: &S) -> Result<Method> {
    let raw = source
        .method()
        .ok_or_else(|| ProxyError::UnsupportedMethod("unknown".to_string()))?;

    match raw.to_ascii_lowercase().as_str() {
        "get" => Ok(Method::Get),
        "post" => Ok(Method::Post),
        "put" => Ok(Method::Put),
        "delete" => Ok(Method::Delete),
        other => Err(ProxyError::UnsupportedMethod(other.to_string())),
    }
}

pub fn capture_route<S: RequestSource + ?Sized>(source: &S, param: &str) -> Result<String> {
    source
        .query_param(param)
        .ok_or_else(|| ProxyError::MissingRoute(param.to_string()))
}

pub fn capture_headers<S: RequestSource + ?Sized>(source: &S) -> Result<Headers> {
    source
        .headers()
        .map(|pairs| pairs.into_iter().collect::<Headers>())
        .ok_or(ProxyError::HeaderRetrievalFailure)
}

pub fn capture_body<S: RequestSource + ?Sized>(source: &S, method: Method) -> Vec<u8> {
    if method.carries_body() {
        source.body().to_vec()
    } else {
        Vec::new()
    }
}

/// Runs every capture step; the first failure aborts.
pub fn capture<S: RequestSource + ?Sized>(source: &S, route_param: &str) -> Result<InboundRequest> {
    let method = capture_method(source)?;
    let headers = capture_headers(source)?;
    let route = capture_route(source, route_param)?;
    let body = capture_body(source, method);
    let host = headers.get_ignore_case("Host").map(str::to_string);

    Ok(InboundRequest {
        method,
        route,
        headers,
        body,
        client_addr: source.client_addr(),
        host,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    struct NoHeaders;

    impl RequestSource for NoHeaders {
        fn method(&self) -> Option<&str> {
            Some("GET")
        }

        fn query_param(&self, _name: &str) -> Option<String> {
            Some("/items".to_string())
        }

        fn headers(&self) -> Option<Vec<(String, String)>> {
            None
        }

        fn body(&self) -> &[u8] {
            b""
        }

        fn client_addr(&self) -> Option<IpAddr> {
            None
        }
    }

    #[test]
    fn header_failure_aborts_capture() {
        let err = capture(&NoHeaders, "route").unwrap_err();
        assert!(matches!(err, ProxyError::HeaderRetrievalFailure));
    }
}
