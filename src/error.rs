//! Error types for the proxy.
//!
//! Every error that reaches a client is rendered as a bare HTTP/1.0 status
//! line, see [`ProxyError::to_response`].

use crate::response::build_status_message;
use bytes::Bytes;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ProxyError {
    /// The first line did not split into the expected three fields.
    #[error("malformed message header: {line:?}")]
    MalformedHeader { line: String },

    /// Only GET is forwarded.
    #[error("method {method} is not implemented")]
    UnsupportedMethod { method: String },

    /// The request carries no target host the proxy can work out.
    #[error("no target host for request path {path:?}")]
    MissingHostContext { path: String },

    /// Upstream answered with a status the proxy does not relay.
    #[error("upstream status {code} is not supported")]
    UnsupportedStatus { code: String },

    #[error("upstream redirect carries no Location header")]
    MissingLocation,

    #[error("redirect chain exceeded {limit} hops")]
    TooManyRedirects { limit: usize },

    #[error("upstream {host}:{port} unreachable: {source}")]
    UpstreamUnreachable {
        host: String,
        port: u16,
        #[source]
        source: std::io::Error,
    },

    #[error("upstream {host} closed the connection without a response")]
    EmptyUpstreamResponse { host: String },

    #[error("invalid configuration: {message}")]
    Config { message: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ProxyError {
    /// Creates a new configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Status code sent to the client for this error.
    pub fn status_code(&self) -> u16 {
        match self {
            Self::MalformedHeader { .. } => 400,
            Self::MissingHostContext { .. } => 404,
            Self::UnsupportedMethod { .. } | Self::UnsupportedStatus { .. } => 501,
            Self::MissingLocation
            | Self::TooManyRedirects { .. }
            | Self::UpstreamUnreachable { .. }
            | Self::EmptyUpstreamResponse { .. } => 502,
            Self::Config { .. } | Self::Io(_) => 500,
        }
    }

    /// Whether talking to the upstream itself went wrong, as opposed to the
    /// proxy rejecting what it was given.
    pub fn is_upstream_failure(&self) -> bool {
        matches!(
            self,
            Self::UpstreamUnreachable { .. } | Self::EmptyUpstreamResponse { .. }
        )
    }

    /// The bytes relayed to the client in place of an upstream response.
    pub fn to_response(&self) -> Bytes {
        build_status_message(self.status_code())
    }
}

/// Result type alias using ProxyError.
pub type Result<T> = std::result::Result<T, ProxyError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_facing_responses() {
        let err = ProxyError::MalformedHeader {
            line: String::new(),
        };
        assert_eq!(&err.to_response()[..], b"HTTP/1.0 400 Bad Request\r\n\r\n");

        let err = ProxyError::UnsupportedMethod {
            method: "POST".to_string(),
        };
        assert_eq!(
            &err.to_response()[..],
            b"HTTP/1.0 501 Not Implemented\r\n\r\n"
        );

        let err = ProxyError::MissingHostContext {
            path: "/".to_string(),
        };
        assert_eq!(&err.to_response()[..], b"HTTP/1.0 404 Not Found\r\n\r\n");

        let err = ProxyError::UnsupportedStatus {
            code: "418".to_string(),
        };
        assert_eq!(err.status_code(), 501);
    }

    #[test]
    fn test_upstream_failures_are_bad_gateway() {
        let err = ProxyError::UpstreamUnreachable {
            host: "example.invalid".to_string(),
            port: 80,
            source: std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "refused"),
        };
        assert_eq!(&err.to_response()[..], b"HTTP/1.0 502 Bad Gateway\r\n\r\n");
        assert!(err.to_string().contains("example.invalid:80"));

        assert!(err.is_upstream_failure());

        assert_eq!(ProxyError::TooManyRedirects { limit: 10 }.status_code(), 502);
        assert_eq!(ProxyError::MissingLocation.status_code(), 502);
        assert!(!ProxyError::TooManyRedirects { limit: 10 }.is_upstream_failure());
        assert!(!ProxyError::MissingLocation.is_upstream_failure());
        assert!(ProxyError::EmptyUpstreamResponse {
            host: "a.example".to_string()
        }
        .is_upstream_failure());
    }

    #[test]
    fn test_error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::BrokenPipe, "pipe");
        let proxy_err: ProxyError = io_err.into();
        assert!(matches!(proxy_err, ProxyError::Io(_)));
        assert_eq!(proxy_err.status_code(), 500);
    }
}
