//! Unified error type for API calls
//!
//! Every failure a pipeline call can produce (request construction, transport,
//! status validation, decoding, cache reads) is folded into [`ApiError`]. The set
//! of variants is closed so callers can match on it exhaustively.

use std::fmt;
use thiserror::Error;

use crate::cache::CacheError;
use crate::http::{Method, TransportError};

/// Server-side failures with a dedicated meaning
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerErrorKind {
    /// 500
    Internal,
    /// 502
    BadGateway,
    /// 503
    Unavailable,
}

impl ServerErrorKind {
    pub fn status(self) -> u16 {
        match self {
            ServerErrorKind::Internal => 500,
            ServerErrorKind::BadGateway => 502,
            ServerErrorKind::Unavailable => 503,
        }
    }
}

impl fmt::Display for ServerErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            ServerErrorKind::Internal => "internal server error",
            ServerErrorKind::BadGateway => "bad gateway",
            ServerErrorKind::Unavailable => "service unavailable",
        };
        write!(f, "{} ({})", text, self.status())
    }
}

/// Errors that can occur during an API call
///
/// Payloads are rendered messages rather than source errors, which keeps the
/// type `Clone` so a single outcome can be handed to several waiters.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ApiError {
    /// The request URL could not be built
    #[error("Invalid request target: {0}")]
    InvalidTarget(String),

    /// The method requires a body and none was given
    #[error("{0} request requires a body")]
    MissingBody(Method),

    /// The request body or headers could not be encoded
    #[error("Failed to encode request: {0}")]
    EncodeFailure(String),

    /// A payload (from the network or the cache) did not decode into the requested type
    #[error("Failed to decode payload: {0}")]
    DecodeFailure(String),

    /// The transport call failed, was cancelled or timed out
    #[error("Transport failed: {0}")]
    TransportFailure(String),

    #[error("Unauthorized (401)")]
    Unauthorized,

    #[error("Forbidden (403)")]
    Forbidden,

    #[error("Not found (404)")]
    NotFound,

    #[error("Method not allowed (405)")]
    MethodNotAllowed,

    #[error("Server error: {0}")]
    ServerError(ServerErrorKind),

    /// Any other non-2xx status; `-1` when the response was not valid HTTP
    #[error("Unexpected status: {0}")]
    UnexpectedStatus(i32),

    /// Anything that fits no other variant
    #[error("Unknown error: {0}")]
    Unknown(String),
}

impl From<CacheError> for ApiError {
    fn from(err: CacheError) -> Self {
        match err {
            CacheError::Decode(e) => ApiError::DecodeFailure(e.to_string()),
            other => ApiError::Unknown(other.to_string()),
        }
    }
}

impl From<TransportError> for ApiError {
    fn from(err: TransportError) -> Self {
        ApiError::TransportFailure(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    #[test]
    fn test_cache_decode_error_maps_to_decode_failure() {
        let json_err = serde_json::from_str::<u32>("nope").unwrap_err();

        let err: ApiError = CacheError::Decode(json_err).into();

        assert!(matches!(err, ApiError::DecodeFailure(_)));
    }

    #[test]
    fn test_cache_io_error_maps_to_unknown() {
        let err: ApiError = CacheError::Io(io::Error::other("disk on fire")).into();

        match err {
            ApiError::Unknown(cause) => assert!(cause.contains("disk on fire")),
            other => panic!("expected Unknown, got {other:?}"),
        }
    }

    #[test]
    fn test_transport_error_maps_to_transport_failure() {
        let err: ApiError = TransportError::new("connection reset").into();

        assert_eq!(
            err,
            ApiError::TransportFailure("connection reset".to_string())
        );
    }

    #[test]
    fn test_error_messages_name_the_failure() {
        assert_eq!(
            ApiError::ServerError(ServerErrorKind::BadGateway).to_string(),
            "Server error: bad gateway (502)"
        );
        assert_eq!(ApiError::UnexpectedStatus(-1).to_string(), "Unexpected status: -1");
        assert_eq!(
            ApiError::MissingBody(Method::Post).to_string(),
            "POST request requires a body"
        );
    }
}
