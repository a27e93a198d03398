//! Status code classification

use super::RawResponse;
use crate::error::{ApiError, ServerErrorKind};

/// Checks that a transport response is a successful HTTP response
pub fn validate(response: &RawResponse) -> Result<(), ApiError> {
    validate_status(response.status)
}

/// Maps a status code onto the error taxonomy
///
/// `None` stands for a reply that was not a recognizable HTTP response and maps
/// to `UnexpectedStatus(-1)`.
pub fn validate_status(status: Option<u16>) -> Result<(), ApiError> {
    let Some(code) = status else {
        return Err(ApiError::UnexpectedStatus(-1));
    };

    match code {
        200..=299 => Ok(()),
        401 => Err(ApiError::Unauthorized),
        403 => Err(ApiError::Forbidden),
        404 => Err(ApiError::NotFound),
        405 => Err(ApiError::MethodNotAllowed),
        500 => Err(ApiError::ServerError(ServerErrorKind::Internal)),
        502 => Err(ApiError::ServerError(ServerErrorKind::BadGateway)),
        503 => Err(ApiError::ServerError(ServerErrorKind::Unavailable)),
        other => Err(ApiError::UnexpectedStatus(i32::from(other))),
    }
}
