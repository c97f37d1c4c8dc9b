use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use axum::{
    extract::{Request, State},
    http::{header, HeaderMap, Method, StatusCode, Uri},
    middleware::Next,
    response::{IntoResponse, Response},
};
use futures::future::BoxFuture;
use tracing::{debug, error};

use crate::adapter::{dispatch, Deferred, Handled};
use crate::api::middleware::RequestId;
use crate::errors::{ApiResponse, Failure};
use crate::metrics::API_FAILURES_ROUTED_TOTAL;

/// What an error handler gets to see about the failed request
#[derive(Debug, Clone)]
pub struct ErrorContext {
    failure: Failure,
    method: Method,
    uri: Uri,
    request_id: Option<String>,
}

impl ErrorContext {
    pub fn status(&self) -> StatusCode {
        self.failure.status_code()
    }

    /// Original error or panic that triggered the failure, if any
    pub fn cause(&self) -> Option<&anyhow::Error> {
        self.failure.cause()
    }

    pub fn failure(&self) -> &Failure {
        &self.failure
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn uri(&self) -> &Uri {
        &self.uri
    }

    pub fn request_id(&self) -> Option<&str> {
        self.request_id.as_deref()
    }
}

pub(crate) type ErrorHandler =
    Arc<dyn Fn(ErrorContext) -> BoxFuture<'static, anyhow::Result<Option<ApiResponse>>> + Send + Sync>;

pub(crate) fn boxed_error_handler<F, Fut>(f: F) -> ErrorHandler
where
    F: Fn(ErrorContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<Option<ApiResponse>>> + Send + 'static,
{
    Arc::new(move |ctx| -> BoxFuture<'static, anyhow::Result<Option<ApiResponse>>> {
        Box::pin(f(ctx))
    })
}

/// Error handlers keyed by status code; one per status
#[derive(Clone, Default)]
pub(crate) struct ErrorHandlerTable {
    handlers: HashMap<StatusCode, ErrorHandler>,
}

impl ErrorHandlerTable {
    /// Register `handler` for `status`, replacing any earlier one
    pub(crate) fn insert(&mut self, status: StatusCode, handler: ErrorHandler) -> bool {
        self.handlers.insert(status, handler).is_some()
    }

    pub(crate) fn contains(&self, status: StatusCode) -> bool {
        self.handlers.contains_key(&status)
    }

    pub(crate) fn len(&self) -> usize {
        self.handlers.len()
    }

    async fn handle(&self, ctx: ErrorContext) -> Response {
        let failure = ctx.failure.clone();
        let status = failure.status_code();
        let Some(handler) = self.handlers.get(&status).cloned() else {
            API_FAILURES_ROUTED_TOTAL
                .with_label_values(&[status.as_str(), "default"])
                .inc();
            debug!(status = status.as_u16(), "No error handler registered, using default response");
            return failure.default_response();
        };

        let request_id = ctx.request_id.clone();
        match dispatch(async move { handler(ctx).await }).await {
            Ok(Some(envelope)) => {
                API_FAILURES_ROUTED_TOTAL
                    .with_label_values(&[status.as_str(), "handler"])
                    .inc();
                let mut response = envelope.into_response();
                response.extensions_mut().insert(Handled);
                response
            }
            Ok(None) => {
                API_FAILURES_ROUTED_TOTAL
                    .with_label_values(&[status.as_str(), "default"])
                    .inc();
                failure.default_response()
            }
            Err(handler_failure) => {
                API_FAILURES_ROUTED_TOTAL
                    .with_label_values(&[status.as_str(), "handler_failed"])
                    .inc();
                error!(
                    request_id = ?request_id,
                    status = status.as_u16(),
                    error = %handler_failure,
                    "Error handler failed"
                );
                StatusCode::INTERNAL_SERVER_ERROR.into_response()
            }
        }
    }
}

/// Find the failure a response stands for, if it is one
fn failure_of(response: &Response) -> Option<Failure> {
    if let Some(failure) = response.extensions().get::<Failure>() {
        return Some(failure.clone());
    }
    if response.extensions().get::<Deferred>().is_some() {
        return Some(Failure::status(StatusCode::NOT_FOUND));
    }
    // axum's own method router answers unmatched methods with a bare 405
    if response.status() == StatusCode::METHOD_NOT_ALLOWED
        && response.extensions().get::<Handled>().is_none()
    {
        return Some(Failure::status(StatusCode::METHOD_NOT_ALLOWED));
    }
    None
}

/// Middleware sending failed requests to the handler for their status
pub(crate) async fn route_failures(
    State(table): State<Arc<ErrorHandlerTable>>,
    request: Request,
    next: Next,
) -> Response {
    let method = request.method().clone();
    let uri = request.uri().clone();
    let request_id = request
        .extensions()
        .get::<RequestId>()
        .map(|id| id.as_str().to_owned());

    let response = next.run(request).await;
    let Some(failure) = failure_of(&response) else {
        return response;
    };

    let (parts, _) = response.into_parts();
    let ctx = ErrorContext {
        failure,
        method,
        uri,
        request_id,
    };

    let mut routed = table.handle(ctx).await;
    carry_headers(&parts.headers, routed.headers_mut());
    routed
}

/// Keep headers set on the failed response (`Allow`, or anything added by
/// layers below this middleware) unless the routed response sets them itself.
/// Body framing headers belong to the routed body.
fn carry_headers(from: &HeaderMap, to: &mut HeaderMap) {
    for name in from.keys() {
        if name == header::CONTENT_TYPE || name == header::CONTENT_LENGTH || to.contains_key(name)
        {
            continue;
        }
        for value in from.get_all(name) {
            to.append(name.clone(), value.clone());
        }
    }
}
