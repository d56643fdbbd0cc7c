use std::time::Duration;

use thiserror::Error;

use crate::http::response::StatusCode;

/// Failures of the relay pipeline. Every variant aborts the current request.
#[derive(Error, Debug)]
pub enum ProxyError {
    #[error("You must supply a '{0}' parameter in the request")]
    MissingRoute(String),

    #[error("Request method ({0}) is not supported")]
    UnsupportedMethod(String),

    #[error("Could not get request headers")]
    HeaderRetrievalFailure,

    #[error("Invalid upstream target: {0}")]
    InvalidTarget(String),

    #[error("Upstream unreachable: {0}")]
    UpstreamUnreachable(String),

    #[error("Upstream did not respond within {0:?}")]
    UpstreamTimeout(Duration),

    #[error("Did not receive a valid response from the server: {0}")]
    InvalidUpstreamResponse(String),
}

impl ProxyError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ProxyError::MissingRoute(_) => StatusCode::BAD_REQUEST,
            ProxyError::UnsupportedMethod(_) => StatusCode::METHOD_NOT_ALLOWED,
            ProxyError::HeaderRetrievalFailure => StatusCode::BAD_REQUEST,
            ProxyError::InvalidTarget(_) => StatusCode::BAD_REQUEST,
            ProxyError::UpstreamUnreachable(_) => StatusCode::BAD_GATEWAY,
            ProxyError::UpstreamTimeout(_) => StatusCode::GATEWAY_TIMEOUT,
            ProxyError::InvalidUpstreamResponse(_) => StatusCode::BAD_GATEWAY,
        }
    }
}

impl From<std::io::Error> for ProxyError {
    fn from(err: std::io::Error) -> Self {
        ProxyError::UpstreamUnreachable(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, ProxyError>;
