//! Versioned API mounting and default error handlers

mod error_routing;

use std::convert::Infallible;
use std::future::Future;
use std::sync::Arc;

use axum::{
    extract::Request,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, MethodRouter, Route},
    Router,
};
use serde::Serialize;
use tower::{Layer, Service};
use tracing::{debug, info};

pub use error_routing::ErrorContext;
use error_routing::{boxed_error_handler, route_failures, ErrorHandlerTable};

use crate::adapter::api_handler;
use crate::errors::{codes, ApiResponse, CatalogError, EnvelopeError, Failure, PreHook};

/// Path of the API info endpoint
pub const API_INFO_PATH: &str = "/api";

/// Payload served by the info endpoint
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiInfo {
    pub current_version: String,
    pub supported_versions: Vec<String>,
}

/// Path prefix for a version token, e.g. `/api/v1`
pub fn version_prefix(version: &str) -> String {
    format!("{}/{}", API_INFO_PATH, version)
}

/// Reject version tokens that cannot be a single path segment
pub fn validate_version(version: &str) -> Result<(), EnvelopeError> {
    if version.is_empty() || version.contains('/') {
        return Err(EnvelopeError::InvalidArgument(format!(
            "invalid API version token: {:?}",
            version
        )));
    }
    Ok(())
}

/// Builder around [`axum::Router`] that mounts versioned sub-routers and
/// keeps one error handler per status code.
///
/// Registration order does not matter: re-registering a status code or the
/// info endpoint replaces the earlier registration. Call
/// [`ApiRouter::into_router`] to install the 404 fallback and the
/// failure-routing middleware.
pub struct ApiRouter<S = ()> {
    router: Router<S>,
    info: Option<ApiInfo>,
    error_handlers: ErrorHandlerTable,
}

impl<S> Default for ApiRouter<S>
where
    S: Clone + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<S> ApiRouter<S>
where
    S: Clone + Send + Sync + 'static,
{
    pub fn new() -> Self {
        Self::from_router(Router::new())
    }

    pub fn from_router(router: Router<S>) -> Self {
        Self {
            router,
            info: None,
            error_handlers: ErrorHandlerTable::default(),
        }
    }

    pub fn route(mut self, path: &str, method_router: MethodRouter<S>) -> Self {
        self.router = self.router.route(path, method_router);
        self
    }

    pub fn merge(mut self, other: Router<S>) -> Self {
        self.router = self.router.merge(other);
        self
    }

    /// Wrap the routes registered so far
    pub fn layer<L>(mut self, layer: L) -> Self
    where
        L: Layer<Route> + Clone + Send + 'static,
        L::Service: Service<Request> + Clone + Send + 'static,
        <L::Service as Service<Request>>::Response: IntoResponse + 'static,
        <L::Service as Service<Request>>::Error: Into<Infallible> + 'static,
        <L::Service as Service<Request>>::Future: Send + 'static,
    {
        self.router = self.router.layer(layer);
        self
    }

    /// Mount `sub_router` under `/api/<version>`.
    ///
    /// # Panics
    ///
    /// Panics if `version` is empty or contains `/`, or if the version is
    /// already mounted.
    pub fn mount_api_router(self, version: &str, sub_router: Router<S>) -> Self {
        match self.try_mount_api_router(version, sub_router) {
            Ok(router) => router,
            Err(e) => panic!("{}", e),
        }
    }

    pub fn try_mount_api_router(
        mut self,
        version: &str,
        sub_router: Router<S>,
    ) -> Result<Self, EnvelopeError> {
        validate_version(version)?;
        let prefix = version_prefix(version);
        info!(version = %version, prefix = %prefix, "Mounting API router");
        self.router = self.router.nest(&prefix, sub_router);
        Ok(self)
    }

    /// Serve `{"currentVersion", "supportedVersions"}` at `/api`
    pub fn default_api_info_handler<I, V>(mut self, current_version: &str, supported_versions: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<String>,
    {
        self.info = Some(ApiInfo {
            current_version: current_version.to_string(),
            supported_versions: supported_versions.into_iter().map(Into::into).collect(),
        });
        self
    }

    /// Register `f` as the error handler for `status`, replacing any
    /// earlier handler for it
    pub fn error_handler<F, Fut>(mut self, status: StatusCode, f: F) -> Self
    where
        F: Fn(ErrorContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<Option<ApiResponse>>> + Send + 'static,
    {
        if self.error_handlers.insert(status, boxed_error_handler(f)) {
            debug!(status = status.as_u16(), "Replaced error handler");
        }
        self
    }

    pub fn has_error_handler(&self, status: StatusCode) -> bool {
        self.error_handlers.contains(status)
    }

    fn catalog_handler(self, entry: CatalogError) -> Self {
        let status =
            StatusCode::from_u16(entry.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        self.error_handler(status, move |_ctx| async move { Ok(Some(entry.response())) })
    }

    pub fn default_api_not_found_handler(self) -> Self {
        self.catalog_handler(CatalogError::NotFound)
    }

    pub fn default_api_unauthorized_handler(self) -> Self {
        self.catalog_handler(CatalogError::Unauthorized)
    }

    pub fn default_api_method_not_allowed_handler(self) -> Self {
        self.catalog_handler(CatalogError::MethodNotAllowed)
    }

    pub fn default_api_bad_request_handler(self) -> Self {
        self.catalog_handler(CatalogError::BadRequest)
    }

    /// Register the 500 handler; `pre_hook` sees the failure cause first
    pub fn default_api_internal_error_handler(self, pre_hook: Option<PreHook>) -> Self {
        self.error_handler(StatusCode::INTERNAL_SERVER_ERROR, move |ctx| {
            let pre_hook = pre_hook.clone();
            async move {
                Ok(Some(codes::internal_error_with(
                    pre_hook.as_ref(),
                    ctx.cause(),
                )))
            }
        })
    }

    /// Register every catalog handler at once
    pub fn default_api_error_handlers(self, pre_hook: Option<PreHook>) -> Self {
        self.default_api_not_found_handler()
            .default_api_unauthorized_handler()
            .default_api_method_not_allowed_handler()
            .default_api_bad_request_handler()
            .default_api_internal_error_handler(pre_hook)
    }

    /// Install the info route, the 404 fallback and failure routing
    pub fn into_router(self) -> Router<S> {
        let mut router = self.router;
        if let Some(info) = self.info {
            info!(
                current_version = %info.current_version,
                supported_versions = ?info.supported_versions,
                "Registering API info endpoint"
            );
            router = router.route(API_INFO_PATH, get(info_handler(info)));
        }

        debug!(handlers = self.error_handlers.len(), "Installing failure routing");
        let table = Arc::new(self.error_handlers);
        router
            .fallback(not_found_fallback)
            .layer(axum::middleware::from_fn_with_state(table, route_failures))
    }
}

impl<S> From<ApiRouter<S>> for Router<S>
where
    S: Clone + Send + Sync + 'static,
{
    fn from(router: ApiRouter<S>) -> Self {
        router.into_router()
    }
}

fn info_handler(
    info: ApiInfo,
) -> impl Fn(Request) -> futures::future::BoxFuture<'static, Response> + Clone + Send + Sync + 'static
{
    let info = Arc::new(info);
    api_handler(move |_ctx| {
        let info = info.clone();
        async move { Ok(Some(ApiResponse::success_with(info.as_ref())?)) }
    })
}

async fn not_found_fallback() -> Response {
    Failure::status(StatusCode::NOT_FOUND).into_response()
}
