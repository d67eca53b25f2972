//! Closed error taxonomy for the boundary layer.
//!
//! The engine never maps errors to transport status codes itself; it reports
//! one of a fixed set of variants and leaves the HTTP mapping to the boundary
//! crate. Each variant carries a human-readable message plus a stable
//! machine-readable code for clients.
//!
//! Almost everything inside the engine fails open: a broken shared cache,
//! tokenizer, or summarizer degrades the result instead of producing one of
//! these errors. Only malformed input surfaces as [`ApiError::BadRequest`].

use thiserror::Error;

/// Error surfaced from the engine toward the boundary layer.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),
    #[error("{0}")]
    Unauthorized(String),
    #[error("{0}")]
    Forbidden(String),
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    RateLimited(String),
    #[error("{0}")]
    ServerError(String),
}

impl ApiError {
    /// Stable machine-readable code included in error responses.
    pub fn code(&self) -> &'static str {
        match self {
            ApiError::BadRequest(_) => "bad_request",
            ApiError::Unauthorized(_) => "unauthorized",
            ApiError::Forbidden(_) => "forbidden",
            ApiError::NotFound(_) => "not_found",
            ApiError::RateLimited(_) => "rate_limit_exceeded",
            ApiError::ServerError(_) => "internal_error",
        }
    }

    /// Error family string, mirroring the taxonomy used by hosted completion
    /// APIs (`invalid_request_error`, `rate_limit_error`, ...).
    pub fn kind(&self) -> &'static str {
        match self {
            ApiError::BadRequest(_) => "invalid_request_error",
            ApiError::Unauthorized(_) => "authentication_error",
            ApiError::Forbidden(_) => "permission_error",
            ApiError::NotFound(_) => "not_found_error",
            ApiError::RateLimited(_) => "rate_limit_error",
            ApiError::ServerError(_) => "server_error",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_are_stable() {
        assert_eq!(ApiError::BadRequest("x".into()).code(), "bad_request");
        assert_eq!(
            ApiError::RateLimited("x".into()).code(),
            "rate_limit_exceeded"
        );
        assert_eq!(ApiError::ServerError("x".into()).code(), "internal_error");
    }

    #[test]
    fn kind_matches_api_families() {
        assert_eq!(
            ApiError::BadRequest("x".into()).kind(),
            "invalid_request_error"
        );
        assert_eq!(
            ApiError::Unauthorized("x".into()).kind(),
            "authentication_error"
        );
    }

    #[test]
    fn display_is_the_message() {
        let err = ApiError::NotFound("no such conversation".into());
        assert_eq!(err.to_string(), "no such conversation");
    }
}
