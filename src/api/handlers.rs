use axum::{
    extract::State,
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Json},
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use std::time::Instant;

use crate::adapter::RequestContext;
use crate::errors::{ApiError, ApiResponse, Failure};

pub type AppState = Arc<AppStateInner>;

pub struct AppStateInner {
    pub instance_id: String,
    pub started_at: Instant,
}

impl AppStateInner {
    pub fn new(instance_id: impl Into<String>) -> Self {
        Self {
            instance_id: instance_id.into(),
            started_at: Instant::now(),
        }
    }
}

/// Header a caller must send to reach admin endpoints
pub const ADMIN_TOKEN_HEADER: &str = "x-admin-token";

#[derive(Debug, Serialize)]
struct Echo<'a> {
    version: &'a str,
    message: &'a str,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct EchoBody {
    pub message: String,
    #[serde(default)]
    pub repeat: Option<u32>,
}

#[derive(Debug, Deserialize)]
pub struct GreetingParams {
    pub name: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct SignupParams {
    pub email: Option<String>,
    pub username: Option<String>,
}

/// Health check endpoint
pub async fn health(State(state): State<AppState>) -> impl IntoResponse {
    Json(json!({
        "status": "healthy",
        "service": "api-envelope",
        "version": env!("CARGO_PKG_VERSION"),
        "instance_id": state.instance_id,
        "uptime_seconds": state.started_at.elapsed().as_secs(),
    }))
}

/// GET /api/v1/echo/:message
pub async fn echo_v1(ctx: RequestContext) -> anyhow::Result<Option<ApiResponse>> {
    let message = ctx.path_param("message").unwrap_or_default();
    Ok(Some(ApiResponse::success_with(&Echo {
        version: "v1",
        message,
    })?))
}

/// POST /api/v1/echo
pub async fn echo_body_v1(mut ctx: RequestContext) -> anyhow::Result<Option<ApiResponse>> {
    let body: EchoBody = ctx.body_json().await?;
    let repeat = body.repeat.unwrap_or(1).min(16) as usize;
    Ok(Some(ApiResponse::success(Some(json!({
        "version": "v1",
        "message": body.message.repeat(repeat),
    })))))
}

/// GET /api/v1/greeting?name=
pub async fn greeting_v1(ctx: RequestContext) -> anyhow::Result<Option<ApiResponse>> {
    let params: GreetingParams = ctx.query()?;
    let name = params.name.as_deref().unwrap_or("world");
    Ok(Some(ApiResponse::success(Some(json!({
        "greeting": format!("Hello, {}!", name),
    })))))
}

/// GET /api/v2/echo/:message
pub async fn echo_v2(ctx: RequestContext) -> anyhow::Result<Option<ApiResponse>> {
    let message = ctx.path_param("message").unwrap_or_default();
    Ok(Some(ApiResponse::success(Some(json!({
        "version": "v2",
        "message": message,
        "length": message.chars().count(),
    })))))
}

/// GET /api/v2/admin, forbidden without the admin token header
pub async fn admin_v2(ctx: RequestContext) -> anyhow::Result<Option<ApiResponse>> {
    let authorized = ctx
        .headers()
        .get(ADMIN_TOKEN_HEADER)
        .is_some_and(|token| !token.is_empty());
    if !authorized {
        return Err(Failure::status(StatusCode::FORBIDDEN).into());
    }
    Ok(Some(ApiResponse::success(Some(json!({ "admin": true })))))
}

/// GET /api/v2/plain, writes its own text response
pub async fn plain_v2(ctx: RequestContext) -> anyhow::Result<Option<ApiResponse>> {
    let writer = ctx.response();
    writer
        .put_header(
            header::CONTENT_TYPE,
            HeaderValue::from_static("text/plain; charset=UTF-8"),
        )
        .await?;
    writer.end("plain text from v2").await?;
    Ok(None)
}

/// GET /api/v2/signup?email=&username=, reports every invalid field at once
pub async fn signup_check_v2(ctx: RequestContext) -> anyhow::Result<Option<ApiResponse>> {
    let params: SignupParams = ctx.query()?;
    let mut errors = Vec::new();

    match params.email.as_deref() {
        Some(email) if email.contains('@') => {}
        _ => errors.push(
            ApiError::new("invalid_email", "Email address is missing or malformed")
                .with_data(json!({ "field": "email" })),
        ),
    }
    match params.username.as_deref() {
        Some(name) if (3..=32).contains(&name.len()) => {}
        _ => errors.push(
            ApiError::new("invalid_username", "Username must be 3 to 32 characters")
                .with_data(json!({ "field": "username" })),
        ),
    }

    if errors.is_empty() {
        return Ok(Some(ApiResponse::success(Some(json!({ "valid": true })))));
    }
    Ok(Some(ApiResponse::errors_with_status(errors, 422)?))
}
