//! Error types for proxy operations.
//!
//! Every per-request failure ends at the request boundary as an HTTP
//! status plus a short text body naming the offending request:
//! - Protocol errors (malformed request target) -> 400
//! - Denials, dial failures, upstream transport failures -> 503
//! - Upgrade failures, reload failures -> 500

use hyper::{Response, StatusCode};
use thiserror::Error;

use super::response::{text_response, ProxyBody};
use crate::rules::ConfigError;

/// Unified error type for proxy operations.
#[derive(Debug, Error)]
pub enum ProxyError {
    /// Hyper HTTP error.
    #[error("HTTP error: {0}")]
    Http(#[from] hyper::Error),

    /// Failed to bind the listening socket.
    #[error("Proxy bind failed on {addr}: {source}")]
    Bind {
        /// Address we tried to bind.
        addr: String,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The request target could not be used.
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// No whitelist rule matched the request.
    #[error("{requested} is not allowed")]
    Denied {
        /// The request as the client asked for it.
        requested: String,
    },

    /// Failed to connect to the upstream.
    #[error("Failed to connect to upstream '{addr}': {message}")]
    UpstreamConnect {
        /// The address we tried to connect to.
        addr: String,
        /// Error message.
        message: String,
    },

    /// Connecting to the upstream took too long.
    #[error("Connection to upstream '{addr}' timed out")]
    Timeout {
        /// The address we tried to connect to.
        addr: String,
    },

    /// The resolved rewrite target is not a usable authority.
    #[error("Invalid rewrite target '{target}': {message}")]
    InvalidTarget {
        /// The resolved target.
        target: String,
        /// Why it was rejected.
        message: String,
    },

    /// The forwarded round trip failed.
    #[error("Upstream request failed: {0}")]
    UpstreamTransport(String),

    /// The client connection cannot be handed over as a raw stream.
    #[error("Connection upgrade not supported: {0}")]
    UpgradeFailed(String),

    /// Whitelist reload failed.
    #[error("Reload failed: {0}")]
    Reload(#[from] ConfigError),
}

/// Result type for proxy operations.
pub type ProxyResult<T> = Result<T, ProxyError>;

impl ProxyError {
    /// HTTP status reported to the client for this error.
    pub fn status(&self) -> StatusCode {
        match self {
            ProxyError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            ProxyError::Denied { .. }
            | ProxyError::UpstreamConnect { .. }
            | ProxyError::Timeout { .. }
            | ProxyError::InvalidTarget { .. }
            | ProxyError::UpstreamTransport(_) => StatusCode::SERVICE_UNAVAILABLE,
            ProxyError::Http(_)
            | ProxyError::Bind { .. }
            | ProxyError::UpgradeFailed(_)
            | ProxyError::Reload(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Render this error as a plain-text response.
    pub fn into_response(self) -> Response<ProxyBody> {
        text_response(self.status(), self.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_denied_display_names_request() {
        let err = ProxyError::Denied {
            requested: "chain-y:30303".to_string(),
        };
        assert_eq!(err.to_string(), "chain-y:30303 is not allowed");
        assert_eq!(err.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[test]
    fn test_upstream_connect_error() {
        let err = ProxyError::UpstreamConnect {
            addr: "localhost:30308".to_string(),
            message: "connection refused".to_string(),
        };
        assert!(err.to_string().contains("localhost:30308"));
        assert!(err.to_string().contains("connection refused"));
        assert_eq!(err.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[test]
    fn test_status_mapping() {
        assert_eq!(
            ProxyError::InvalidRequest("no host".into()).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ProxyError::Timeout {
                addr: "a:1".into()
            }
            .status(),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            ProxyError::UpstreamTransport("reset".into()).status(),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            ProxyError::UpgradeFailed("no upgrade".into()).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            ProxyError::Reload(ConfigError::NoSource).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_into_response() {
        let response = ProxyError::Denied {
            requested: "http://c.d/".to_string(),
        }
        .into_response();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(
            response.headers().get("content-type").unwrap(),
            "text/plain; charset=utf-8"
        );
    }
}
