use std::collections::HashMap;
use std::sync::Arc;

use axum::{
    body::{Body, Bytes},
    extract::{FromRequestParts, OriginalUri, Query, RawPathParams, Request},
    http::{header, request::Parts, HeaderMap, HeaderName, HeaderValue, Method, StatusCode, Uri},
    response::Response,
};
use serde::de::DeserializeOwned;
use tokio::sync::Mutex;

use crate::api::middleware::RequestId;
use crate::errors::{response::JSON_UTF8, ApiResponse, EnvelopeError};

/// Largest request body read by the context helpers
pub const DEFAULT_BODY_LIMIT: usize = 2 * 1024 * 1024;

/// Body limit override, read from request extensions
#[derive(Debug, Clone, Copy)]
pub struct BodyLimit(pub usize);

/// Per-request context handed to adapted handlers
pub struct RequestContext {
    parts: Parts,
    body: Option<Body>,
    path_params: HashMap<String, String>,
    response: ResponseWriter,
}

impl RequestContext {
    pub async fn from_request(request: Request) -> Self {
        let (mut parts, body) = request.into_parts();
        let path_params = match RawPathParams::from_request_parts(&mut parts, &()).await {
            Ok(params) => params
                .iter()
                .map(|(name, value)| (name.to_string(), value.to_string()))
                .collect(),
            Err(_) => HashMap::new(),
        };

        Self {
            parts,
            body: Some(body),
            path_params,
            response: ResponseWriter::new(),
        }
    }

    pub fn method(&self) -> &Method {
        &self.parts.method
    }

    /// URI as seen by the matched router (nesting prefixes stripped)
    pub fn uri(&self) -> &Uri {
        &self.parts.uri
    }

    /// URI as received by the server
    pub fn original_uri(&self) -> &Uri {
        self.parts
            .extensions
            .get::<OriginalUri>()
            .map(|original| &original.0)
            .unwrap_or(&self.parts.uri)
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.parts.headers
    }

    pub fn extensions(&self) -> &axum::http::Extensions {
        &self.parts.extensions
    }

    pub fn path_param(&self, name: &str) -> Option<&str> {
        self.path_params.get(name).map(String::as_str)
    }

    pub fn request_id(&self) -> Option<&str> {
        self.parts
            .extensions
            .get::<RequestId>()
            .map(|id| id.as_str())
    }

    /// Decode the query string
    pub fn query<T: DeserializeOwned>(&self) -> Result<T, EnvelopeError> {
        Query::try_from_uri(&self.parts.uri)
            .map(|Query(value)| value)
            .map_err(|e| EnvelopeError::InvalidQuery(e.body_text()))
    }

    /// Read the whole body; it can be taken only once
    pub async fn body_bytes(&mut self) -> Result<Bytes, EnvelopeError> {
        let body = self.body.take().ok_or(EnvelopeError::BodyConsumed)?;
        let limit = self
            .parts
            .extensions
            .get::<BodyLimit>()
            .map(|limit| limit.0)
            .unwrap_or(DEFAULT_BODY_LIMIT);
        axum::body::to_bytes(body, limit)
            .await
            .map_err(|e| EnvelopeError::BodyRead(e.to_string()))
    }

    pub async fn body_json<T: DeserializeOwned>(&mut self) -> Result<T, EnvelopeError> {
        let bytes = self.body_bytes().await?;
        serde_json::from_slice(&bytes).map_err(EnvelopeError::InvalidJson)
    }

    pub fn response(&self) -> &ResponseWriter {
        &self.response
    }
}

struct WriterState {
    status: StatusCode,
    headers: HeaderMap,
    ended: bool,
    sent: Option<Response>,
}

/// Response half of the request context.
///
/// Cloning shares the same underlying response.
#[derive(Clone)]
pub struct ResponseWriter {
    state: Arc<Mutex<WriterState>>,
}

impl std::fmt::Debug for ResponseWriter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResponseWriter").finish_non_exhaustive()
    }
}

impl Default for ResponseWriter {
    fn default() -> Self {
        Self::new()
    }
}

impl ResponseWriter {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(WriterState {
                status: StatusCode::OK,
                headers: HeaderMap::new(),
                ended: false,
                sent: None,
            })),
        }
    }

    pub async fn set_status(&self, status: StatusCode) -> Result<(), EnvelopeError> {
        let mut state = self.state.lock().await;
        if state.ended {
            return Err(EnvelopeError::ResponseAlreadySent);
        }
        state.status = status;
        Ok(())
    }

    pub async fn put_header(
        &self,
        name: HeaderName,
        value: HeaderValue,
    ) -> Result<(), EnvelopeError> {
        let mut state = self.state.lock().await;
        if state.ended {
            return Err(EnvelopeError::ResponseAlreadySent);
        }
        state.headers.insert(name, value);
        Ok(())
    }

    /// Complete the response with `body`
    pub async fn end(&self, body: impl Into<Body>) -> Result<(), EnvelopeError> {
        let mut state = self.state.lock().await;
        if state.ended {
            return Err(EnvelopeError::ResponseAlreadySent);
        }

        let mut response = Response::new(body.into());
        *response.status_mut() = state.status;
        *response.headers_mut() = std::mem::take(&mut state.headers);
        state.sent = Some(response);
        state.ended = true;
        Ok(())
    }

    /// Write an envelope as JSON with its status
    pub async fn send(&self, envelope: &ApiResponse) -> Result<(), EnvelopeError> {
        let body = envelope.to_body()?;
        self.set_status(envelope.status()).await?;
        self.put_header(header::CONTENT_TYPE, HeaderValue::from_static(JSON_UTF8))
            .await?;
        self.end(body).await
    }

    /// Whether the response has already been sent
    pub async fn ended(&self) -> bool {
        self.state.lock().await.ended
    }

    pub(crate) async fn take_sent(&self) -> Option<Response> {
        self.state.lock().await.sent.take()
    }
}
