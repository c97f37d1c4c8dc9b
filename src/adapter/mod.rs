//! Bridges async request logic into axum's handler slot.
//!
//! Every invocation ends in exactly one [`Outcome`]: a written response, a
//! failure signal for the error-routing middleware, or a deferral.

pub mod context;
pub(crate) mod dispatch;

use std::future::Future;

use axum::{
    body::Body,
    extract::Request,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use futures::future::BoxFuture;
use tracing::{debug, error, warn};

pub use context::{BodyLimit, RequestContext, ResponseWriter};
pub(crate) use dispatch::dispatch;

use crate::errors::{ApiResponse, Failure};
use crate::metrics::API_HANDLER_OUTCOMES_TOTAL;

/// Marks a response produced by an adapted handler
#[derive(Debug, Clone, Copy)]
pub struct Handled;

/// Marks a request the handler left for downstream processing
#[derive(Debug, Clone, Copy)]
pub struct Deferred;

/// Result of one adapted invocation
pub enum Outcome {
    Written(Response),
    Failed(Failure),
    Deferred,
}

impl Outcome {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Written(_) => "written",
            Self::Failed(_) => "failed",
            Self::Deferred => "deferred",
        }
    }
}

impl IntoResponse for Outcome {
    fn into_response(self) -> Response {
        match self {
            Self::Written(mut response) => {
                response.extensions_mut().insert(Handled);
                response
            }
            Self::Failed(failure) => failure.into_response(),
            Self::Deferred => {
                let mut response = Response::new(Body::empty());
                *response.status_mut() = StatusCode::NOT_FOUND;
                response.extensions_mut().insert(Deferred);
                response
            }
        }
    }
}

/// What a handler's return value means once it completes normally
pub trait Completion: Send + 'static {
    fn complete(self, writer: ResponseWriter) -> BoxFuture<'static, Outcome>;
}

async fn written_or_deferred(writer: &ResponseWriter) -> Outcome {
    match writer.take_sent().await {
        Some(response) => Outcome::Written(response),
        None => Outcome::Deferred,
    }
}

impl Completion for () {
    fn complete(self, writer: ResponseWriter) -> BoxFuture<'static, Outcome> {
        Box::pin(async move { written_or_deferred(&writer).await })
    }
}

impl Completion for Option<ApiResponse> {
    fn complete(self, writer: ResponseWriter) -> BoxFuture<'static, Outcome> {
        Box::pin(async move {
            let Some(envelope) = self else {
                return written_or_deferred(&writer).await;
            };

            if writer.ended().await {
                warn!("Handler returned an envelope after writing the response itself, dropping envelope");
                return written_or_deferred(&writer).await;
            }

            match writer.send(&envelope).await {
                Ok(()) => written_or_deferred(&writer).await,
                Err(e) => Outcome::Failed(Failure::from_error(e.into())),
            }
        })
    }
}

impl Completion for ApiResponse {
    fn complete(self, writer: ResponseWriter) -> BoxFuture<'static, Outcome> {
        Some(self).complete(writer)
    }
}

/// Adapt `f` into an axum handler.
///
/// `f` runs on its own task tied to the request; what its return value
/// means is decided by its [`Completion`] impl. Errors and panics are
/// turned into a [`Failure`] and never write a response.
pub fn suspend_handler<F, Fut, T>(
    f: F,
) -> impl Fn(Request) -> BoxFuture<'static, Response> + Clone + Send + Sync + 'static
where
    F: Fn(RequestContext) -> Fut + Clone + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<T>> + Send + 'static,
    T: Completion,
{
    move |request: Request| -> BoxFuture<'static, Response> {
        let f = f.clone();
        Box::pin(async move {
            let ctx = RequestContext::from_request(request).await;
            let request_id = ctx.request_id().map(str::to_owned);
            let path = ctx.original_uri().path().to_owned();
            let writer = ctx.response().clone();

            let outcome = match dispatch(async move { f(ctx).await }).await {
                Ok(value) => value.complete(writer).await,
                Err(failure) => match writer.take_sent().await {
                    Some(response) => {
                        error!(
                            request_id = ?request_id,
                            path = %path,
                            failure = %failure,
                            "Handler failed after sending its response"
                        );
                        Outcome::Written(response)
                    }
                    None => {
                        debug!(
                            request_id = ?request_id,
                            path = %path,
                            status = failure.status_code().as_u16(),
                            "Handler signalled failure"
                        );
                        Outcome::Failed(failure)
                    }
                },
            };

            API_HANDLER_OUTCOMES_TOTAL
                .with_label_values(&[outcome.label()])
                .inc();
            outcome.into_response()
        })
    }
}

/// Adapt a handler that writes its own response (or defers)
pub fn handler<F, Fut>(
    f: F,
) -> impl Fn(Request) -> BoxFuture<'static, Response> + Clone + Send + Sync + 'static
where
    F: Fn(RequestContext) -> Fut + Clone + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
{
    suspend_handler(f)
}

/// Adapt a handler returning an optional envelope.
///
/// `Some` is written as JSON with 200 or the envelope's status code; `None`
/// writes nothing.
pub fn api_handler<F, Fut>(
    f: F,
) -> impl Fn(Request) -> BoxFuture<'static, Response> + Clone + Send + Sync + 'static
where
    F: Fn(RequestContext) -> Fut + Clone + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<Option<ApiResponse>>> + Send + 'static,
{
    suspend_handler(f)
}
