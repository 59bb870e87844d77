//! Errors the proxy host turns into HTTP responses.
//!
//! Each variant maps to a status code and a small JSON body carrying the
//! stable error code.

use bytes::Bytes;
use http_body_util::Full;
use hyper::StatusCode;
use hyper::header::{CONTENT_TYPE, HeaderValue};
use klangreise_core::Error;

#[derive(Debug, thiserror::Error)]
pub enum ProxyError {
    /// The incoming request could not be turned into a fetch.
    #[error("INVALID_INPUT: {0}")]
    BadRequest(String),

    /// The request targets another origin. The proxy only serves its own.
    #[error("CROSS_ORIGIN: {0}")]
    CrossOrigin(String),

    /// A passthrough fetch produced no response.
    #[error("{0}")]
    Upstream(#[from] Error),

    /// The upstream response could not be relayed.
    #[error("BAD_GATEWAY: {0}")]
    BadGateway(String),

    /// Intercepted, but neither network nor cache could answer.
    #[error("UNAVAILABLE: {0}")]
    Unavailable(String),
}

impl ProxyError {
    pub fn code(&self) -> &'static str {
        match self {
            ProxyError::BadRequest(_) => "INVALID_INPUT",
            ProxyError::CrossOrigin(_) => "CROSS_ORIGIN",
            ProxyError::Upstream(err) => err.code(),
            ProxyError::BadGateway(_) => "BAD_GATEWAY",
            ProxyError::Unavailable(_) => "UNAVAILABLE",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ProxyError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ProxyError::CrossOrigin(_) => StatusCode::FORBIDDEN,
            ProxyError::Upstream(Error::FetchTimeout(_)) | ProxyError::Unavailable(_) => StatusCode::GATEWAY_TIMEOUT,
            ProxyError::Upstream(_) | ProxyError::BadGateway(_) => StatusCode::BAD_GATEWAY,
        }
    }
}

impl From<ProxyError> for hyper::Response<Full<Bytes>> {
    fn from(err: ProxyError) -> Self {
        let body = serde_json::json!({ "code": err.code(), "message": err.to_string() }).to_string();
        let mut response = hyper::Response::new(Full::new(Bytes::from(body)));
        *response.status_mut() = err.status();
        response
            .headers_mut()
            .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        response
    }
}
