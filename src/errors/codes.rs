use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use tracing::error;

use super::response::ApiResponse;
use crate::metrics::PRE_HOOK_PANICS_TOTAL;

/// Callback observing the cause of an internal error before the catalog
/// response is produced
pub type PreHook = Arc<dyn Fn(&anyhow::Error) + Send + Sync>;

/// Ready-made error envelopes for standard HTTP failure classes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CatalogError {
    NotFound,
    Unauthorized,
    MethodNotAllowed,
    BadRequest,
    InternalError,
}

impl fmt::Display for CatalogError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl CatalogError {
    pub const ALL: [CatalogError; 5] = [
        Self::NotFound,
        Self::Unauthorized,
        Self::MethodNotAllowed,
        Self::BadRequest,
        Self::InternalError,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Self::NotFound => "not_found",
            Self::Unauthorized => "unauthorized",
            Self::MethodNotAllowed => "method_not_allowed",
            Self::BadRequest => "bad_request",
            Self::InternalError => "internal_error",
        }
    }

    pub fn message(&self) -> &'static str {
        match self {
            Self::NotFound => "Not found",
            Self::Unauthorized => "Unauthorized",
            Self::MethodNotAllowed => "Method not allowed",
            Self::BadRequest => "Bad request",
            Self::InternalError => "Internal error",
        }
    }

    /// HTTP status code for this entry
    pub fn status_code(&self) -> u16 {
        match self {
            Self::NotFound => 404,
            Self::Unauthorized => 403,
            Self::MethodNotAllowed => 405,
            Self::BadRequest => 400,
            Self::InternalError => 500,
        }
    }

    /// Fresh error envelope for this entry
    pub fn response(&self) -> ApiResponse {
        ApiResponse::error_with(self.name(), self.message(), None, self.status_code())
    }
}

pub fn not_found() -> ApiResponse {
    CatalogError::NotFound.response()
}

pub fn unauthorized() -> ApiResponse {
    CatalogError::Unauthorized.response()
}

pub fn method_not_allowed() -> ApiResponse {
    CatalogError::MethodNotAllowed.response()
}

pub fn bad_request() -> ApiResponse {
    CatalogError::BadRequest.response()
}

pub fn internal_error() -> ApiResponse {
    CatalogError::InternalError.response()
}

/// Internal error envelope, running `hook` on the cause first.
///
/// A panicking hook is logged and does not prevent the response.
pub fn internal_error_with(hook: Option<&PreHook>, cause: Option<&anyhow::Error>) -> ApiResponse {
    if let (Some(hook), Some(cause)) = (hook, cause) {
        if catch_unwind(AssertUnwindSafe(|| hook(cause))).is_err() {
            PRE_HOOK_PANICS_TOTAL.inc();
            error!(cause = %cause, "Internal error pre-hook panicked");
        }
    }
    internal_error()
}
