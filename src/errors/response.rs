use axum::{
    body::Body,
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
};
use serde::{Serialize, Serializer};
use serde_json::{json, Value};

use super::EnvelopeError;

/// Status code used by error envelopes when none is given
pub const DEFAULT_ERROR_STATUS: u16 = 500;

/// Content type written for every envelope
pub const JSON_UTF8: &str = "application/json; charset=UTF-8";

fn is_valid_status(code: u16) -> bool {
    StatusCode::from_u16(code).is_ok()
}

/// A single machine-readable error inside an error envelope
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ApiError {
    name: String,
    message: String,
    data: Option<Value>,
}

impl ApiError {
    pub fn new(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            message: message.into(),
            data: None,
        }
    }

    /// Attach a structured payload to the error
    pub fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn data(&self) -> Option<&Value> {
        self.data.as_ref()
    }
}

/// Uniform response envelope
///
/// Encodes to `{"success": true, "data": ...}` or
/// `{"success": false, "statusCode": ..., "errors": [...]}`.
#[derive(Debug, Clone, PartialEq)]
pub enum ApiResponse {
    Success {
        data: Option<Value>,
    },
    Error {
        errors: Vec<ApiError>,
        status_code: u16,
    },
}

impl ApiResponse {
    pub fn success(data: Option<Value>) -> Self {
        Self::Success { data }
    }

    /// Serialize `data` into a success envelope
    pub fn success_with<T: Serialize>(data: &T) -> Result<Self, EnvelopeError> {
        let value = serde_json::to_value(data).map_err(EnvelopeError::Serialization)?;
        Ok(Self::Success { data: Some(value) })
    }

    /// Single-error envelope with status 500 and no data
    pub fn error(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::error_with(name, message, None, DEFAULT_ERROR_STATUS)
    }

    /// Single-error envelope; a code that is not a valid HTTP status
    /// becomes 500
    pub fn error_with(
        name: impl Into<String>,
        message: impl Into<String>,
        data: Option<Value>,
        status_code: u16,
    ) -> Self {
        let mut error = ApiError::new(name, message);
        error.data = data;
        let status_code = if is_valid_status(status_code) {
            status_code
        } else {
            DEFAULT_ERROR_STATUS
        };
        Self::Error {
            errors: vec![error],
            status_code,
        }
    }

    /// Multi-error envelope with status 500
    pub fn errors(errors: Vec<ApiError>) -> Result<Self, EnvelopeError> {
        Self::errors_with_status(errors, DEFAULT_ERROR_STATUS)
    }

    /// Multi-error envelope; an empty list or an invalid status is rejected
    pub fn errors_with_status(
        errors: Vec<ApiError>,
        status_code: u16,
    ) -> Result<Self, EnvelopeError> {
        if errors.is_empty() {
            return Err(EnvelopeError::InvalidArgument(
                "an error envelope needs at least one error".to_string(),
            ));
        }
        if !is_valid_status(status_code) {
            return Err(EnvelopeError::InvalidArgument(format!(
                "{} is not a valid HTTP status code",
                status_code
            )));
        }
        Ok(Self::Error {
            errors,
            status_code,
        })
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }

    /// HTTP status written for this envelope
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Success { .. } => StatusCode::OK,
            Self::Error { status_code, .. } => {
                StatusCode::from_u16(*status_code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
            }
        }
    }

    /// Wire encoding of the envelope; `statusCode` always matches [`Self::status`]
    pub fn to_wire(&self) -> Value {
        match self {
            Self::Success { data } => json!({
                "success": true,
                "data": data,
            }),
            Self::Error { errors, .. } => json!({
                "success": false,
                "statusCode": self.status().as_u16(),
                "errors": errors,
            }),
        }
    }

    /// Encoded body bytes
    pub fn to_body(&self) -> Result<Vec<u8>, EnvelopeError> {
        serde_json::to_vec(&self.to_wire()).map_err(EnvelopeError::Serialization)
    }
}

impl Serialize for ApiResponse {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_wire().serialize(serializer)
    }
}

impl IntoResponse for ApiResponse {
    fn into_response(self) -> Response {
        let status = self.status();
        match self.to_body() {
            Ok(body) => {
                let mut response = Response::new(Body::from(body));
                *response.status_mut() = status;
                response
                    .headers_mut()
                    .insert(header::CONTENT_TYPE, HeaderValue::from_static(JSON_UTF8));
                response
            }
            Err(e) => {
                tracing::error!("Failed to encode response envelope: {}", e);
                StatusCode::INTERNAL_SERVER_ERROR.into_response()
            }
        }
    }
}
