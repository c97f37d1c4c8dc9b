use std::any::Any;
use std::fmt;
use std::sync::Arc;

use axum::{
    body::Body,
    http::StatusCode,
    response::{IntoResponse, Response},
};

use super::EnvelopeError;

/// Failure signal routed to the error handler registered for its status.
///
/// Handlers return `Err(Failure::status(..).into())` to pick the status
/// explicitly; any other error is wrapped as a 500 failure.
#[derive(Debug, Clone)]
pub struct Failure {
    status: StatusCode,
    cause: Option<Arc<anyhow::Error>>,
}

impl Failure {
    pub fn status(status: StatusCode) -> Self {
        Self {
            status,
            cause: None,
        }
    }

    pub fn with_cause(status: StatusCode, cause: anyhow::Error) -> Self {
        Self {
            status,
            cause: Some(Arc::new(cause)),
        }
    }

    /// Convert a handler error, keeping explicit failures as they are
    pub fn from_error(error: anyhow::Error) -> Self {
        if let Some(failure) = error.downcast_ref::<Failure>() {
            return failure.clone();
        }
        let status = error
            .downcast_ref::<EnvelopeError>()
            .map(EnvelopeError::status)
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        Self::with_cause(status, error)
    }

    /// Convert a handler panic into a 500 failure carrying the panic message
    pub fn from_panic(payload: Box<dyn Any + Send>) -> Self {
        let message = if let Some(s) = payload.downcast_ref::<&'static str>() {
            (*s).to_string()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            "handler panicked".to_string()
        };
        Self::with_cause(StatusCode::INTERNAL_SERVER_ERROR, anyhow::anyhow!(message))
    }

    pub fn status_code(&self) -> StatusCode {
        self.status
    }

    pub fn cause(&self) -> Option<&anyhow::Error> {
        self.cause.as_deref()
    }

    /// Framework default for an unhandled failure: empty body, failure status
    pub fn default_response(&self) -> Response {
        self.status.into_response()
    }
}

impl fmt::Display for Failure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.cause {
            Some(cause) => write!(f, "request failed with status {}: {}", self.status, cause),
            None => write!(f, "request failed with status {}", self.status),
        }
    }
}

impl std::error::Error for Failure {}

impl IntoResponse for Failure {
    /// Empty response tagged with the failure for the routing middleware
    fn into_response(self) -> Response {
        let mut response = Response::new(Body::empty());
        *response.status_mut() = self.status;
        response.extensions_mut().insert(self);
        response
    }
}
