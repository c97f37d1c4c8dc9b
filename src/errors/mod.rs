//! Response envelopes, the error catalog and the failure signal

pub mod codes;
pub mod failure;
pub mod response;

use axum::http::StatusCode;
use thiserror::Error;

pub use codes::{CatalogError, PreHook};
pub use failure::Failure;
pub use response::{ApiError, ApiResponse};

/// Errors raised while building or writing envelopes and reading requests
#[derive(Debug, Error)]
pub enum EnvelopeError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("response already sent")]
    ResponseAlreadySent,

    #[error("request body already consumed")]
    BodyConsumed,

    #[error("failed to read request body: {0}")]
    BodyRead(String),

    #[error("invalid JSON body: {0}")]
    InvalidJson(#[source] serde_json::Error),

    #[error("invalid query string: {0}")]
    InvalidQuery(String),

    #[error("failed to serialize response: {0}")]
    Serialization(#[source] serde_json::Error),
}

impl EnvelopeError {
    /// Status used when this error escapes a handler
    pub fn status(&self) -> StatusCode {
        match self {
            Self::BodyRead(_) | Self::InvalidJson(_) | Self::InvalidQuery(_) => {
                StatusCode::BAD_REQUEST
            }
            Self::InvalidArgument(_)
            | Self::ResponseAlreadySent
            | Self::BodyConsumed
            | Self::Serialization(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}
