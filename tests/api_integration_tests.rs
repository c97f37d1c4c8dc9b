use axum::{
    body::Body,
    http::{header, HeaderMap, Request, StatusCode},
    routing::{get, post},
    Router,
};
use serde_json::{json, Value};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tower::ServiceExt;
use tower_http::set_header::SetResponseHeaderLayer;

use api_envelope::{
    api_handler, handler, ApiResponse, ApiRouter, Failure, PreHook, RequestContext, ResponseWriter,
};

// Helper to send a request and split the response into status, headers and raw body
async fn send(app: &Router, method: &str, uri: &str, body: Body) -> (StatusCode, HeaderMap, Vec<u8>) {
    let request = Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json")
        .body(body)
        .unwrap();

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let headers = response.headers().clone();

    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();

    (status, headers, body.to_vec())
}

// Helper to send request and parse JSON response
async fn send_json_request(app: &Router, method: &str, uri: &str) -> (StatusCode, Value) {
    let (status, _, body) = send(app, method, uri, Body::empty()).await;
    let json: Value = serde_json::from_slice(&body).unwrap_or(json!({}));
    (status, json)
}

fn version_router(version: &'static str) -> Router {
    Router::new().route(
        "/x",
        get(api_handler(move |_ctx| async move {
            Ok(Some(ApiResponse::success(Some(json!({ "servedBy": version })))))
        })),
    )
}

fn recording_hook() -> (PreHook, Arc<Mutex<Vec<String>>>) {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    let hook: PreHook = Arc::new(move |cause| sink.lock().unwrap().push(cause.to_string()));
    (hook, seen)
}

#[tokio::test]
async fn test_versions_are_isolated() {
    let app: Router = ApiRouter::new()
        .mount_api_router("v1", version_router("v1"))
        .mount_api_router("v2", version_router("v2"))
        .default_api_not_found_handler()
        .into();

    let (status, body) = send_json_request(&app, "GET", "/api/v1/x").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["servedBy"], "v1");

    let (status, body) = send_json_request(&app, "GET", "/api/v2/x").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["servedBy"], "v2");

    let (status, body) = send_json_request(&app, "GET", "/api/v3/x").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["errors"][0]["name"], "not_found");
}

#[tokio::test]
async fn test_info_endpoint() {
    let app: Router = ApiRouter::new()
        .default_api_info_handler("v2", ["v1", "v2"])
        .into();

    let (status, headers, body) = send(&app, "GET", "/api", Body::empty()).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        headers.get(header::CONTENT_TYPE).unwrap(),
        "application/json; charset=UTF-8"
    );
    let body: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(
        body,
        json!({"success": true, "data": {"currentVersion": "v2", "supportedVersions": ["v1", "v2"]}})
    );
}

#[tokio::test]
async fn test_info_handler_reregistration_overwrites() {
    let app: Router = ApiRouter::new()
        .default_api_info_handler("v1", ["v1"])
        .default_api_info_handler("v2", ["v1", "v2"])
        .into();

    let (_, body) = send_json_request(&app, "GET", "/api").await;
    assert_eq!(body["data"]["currentVersion"], "v2");
}

#[tokio::test]
async fn test_thrown_error_routes_to_internal_error_handler() {
    let (hook, seen) = recording_hook();
    let app: Router = ApiRouter::new()
        .route(
            "/boom",
            get(api_handler(|_ctx| async {
                Err(anyhow::anyhow!("database unreachable"))
            })),
        )
        .default_api_internal_error_handler(Some(hook))
        .into();

    let (status, body) = send_json_request(&app, "GET", "/boom").await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["success"], false);
    assert_eq!(body["statusCode"], 500);
    assert_eq!(body["errors"][0]["name"], "internal_error");
    assert_eq!(*seen.lock().unwrap(), vec!["database unreachable".to_string()]);
}

#[tokio::test]
async fn test_panicking_handler_routes_to_internal_error_handler() {
    let (hook, seen) = recording_hook();
    let app: Router = ApiRouter::new()
        .route(
            "/panic",
            get(handler(|_ctx| async {
                if true {
                    panic!("index out of range");
                }
                Ok(())
            })),
        )
        .default_api_internal_error_handler(Some(hook))
        .into();

    let (status, body) = send_json_request(&app, "GET", "/panic").await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["errors"][0]["name"], "internal_error");
    assert_eq!(*seen.lock().unwrap(), vec!["index out of range".to_string()]);
}

#[tokio::test]
async fn test_panicking_pre_hook_still_answers() {
    let hook: PreHook = Arc::new(|_| panic!("logger offline"));
    let app: Router = ApiRouter::new()
        .route(
            "/boom",
            get(api_handler(|_ctx| async { Err(anyhow::anyhow!("boom")) })),
        )
        .default_api_internal_error_handler(Some(hook))
        .into();

    let (status, body) = send_json_request(&app, "GET", "/boom").await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["errors"][0]["name"], "internal_error");
}

#[tokio::test]
async fn test_failure_without_registered_handler_uses_framework_default() {
    let app: Router = ApiRouter::new()
        .route(
            "/boom",
            get(api_handler(|_ctx| async { Err(anyhow::anyhow!("boom")) })),
        )
        .into();

    let (status, _, body) = send(&app, "GET", "/boom", Body::empty()).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(body.is_empty());
}

#[tokio::test]
async fn test_self_written_response_sets_sent_flag() {
    let captured: Arc<Mutex<Option<ResponseWriter>>> = Arc::new(Mutex::new(None));
    let slot = captured.clone();
    let app: Router = ApiRouter::new()
        .route(
            "/raw",
            get(api_handler(move |ctx: RequestContext| {
                let slot = slot.clone();
                async move {
                    *slot.lock().unwrap() = Some(ctx.response().clone());
                    ctx.response().set_status(StatusCode::CREATED).await?;
                    ctx.response().end("raw body").await?;
                    Ok(None)
                }
            })),
        )
        .default_api_not_found_handler()
        .into();

    let (status, _, body) = send(&app, "GET", "/raw", Body::empty()).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body, b"raw body");

    let writer = captured.lock().unwrap().clone().unwrap();
    assert!(writer.ended().await);
}

#[tokio::test]
async fn test_deferred_request_continues_to_not_found() {
    let captured: Arc<Mutex<Option<ResponseWriter>>> = Arc::new(Mutex::new(None));
    let slot = captured.clone();
    let app: Router = ApiRouter::new()
        .route(
            "/maybe",
            get(api_handler(move |ctx: RequestContext| {
                let slot = slot.clone();
                async move {
                    *slot.lock().unwrap() = Some(ctx.response().clone());
                    Ok(None)
                }
            })),
        )
        .default_api_not_found_handler()
        .into();

    let (status, body) = send_json_request(&app, "GET", "/maybe").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["errors"][0]["name"], "not_found");

    let writer = captured.lock().unwrap().clone().unwrap();
    assert!(!writer.ended().await);
}

#[tokio::test]
async fn test_unregistered_path_is_not_found() {
    let app: Router = ApiRouter::new()
        .default_api_not_found_handler()
        .into();

    let (status, body) = send_json_request(&app, "GET", "/nowhere").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(
        body,
        json!({
            "success": false,
            "statusCode": 404,
            "errors": [{"name": "not_found", "message": "Not found", "data": null}]
        })
    );
}

#[tokio::test]
async fn test_wrong_method_is_method_not_allowed() {
    let app: Router = ApiRouter::new()
        .route(
            "/only-get",
            get(api_handler(|_ctx| async { Ok(Some(ApiResponse::success(None))) })),
        )
        .default_api_method_not_allowed_handler()
        .into();

    let (status, headers, body) = send(&app, "DELETE", "/only-get", Body::empty()).await;
    assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED);
    assert!(headers.get(header::ALLOW).is_some());
    let body: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(body["errors"][0]["name"], "method_not_allowed");
}

#[tokio::test]
async fn test_explicit_failure_status_routes_to_unauthorized() {
    let app: Router = ApiRouter::new()
        .route(
            "/secret",
            get(handler(|_ctx| async {
                Err(anyhow::Error::from(Failure::status(StatusCode::FORBIDDEN)))
            })),
        )
        .default_api_unauthorized_handler()
        .into();

    let (status, body) = send_json_request(&app, "GET", "/secret").await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["errors"][0]["name"], "unauthorized");
    assert_eq!(body["errors"][0]["message"], "Unauthorized");
}

#[tokio::test]
async fn test_malformed_body_routes_to_bad_request() {
    let app: Router = ApiRouter::new()
        .route(
            "/items",
            post(api_handler(|mut ctx: RequestContext| async move {
                let item: Value = ctx.body_json().await?;
                Ok(Some(ApiResponse::success(Some(item))))
            })),
        )
        .default_api_bad_request_handler()
        .into();

    let (status, _, body) = send(&app, "POST", "/items", Body::from("{not json")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let body: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(body["errors"][0]["name"], "bad_request");
}

#[tokio::test]
async fn test_custom_error_handler_replaced_by_default() {
    let app: Router = ApiRouter::new()
        .error_handler(StatusCode::NOT_FOUND, |_ctx| async {
            Ok(Some(ApiResponse::error_with("custom", "Custom", None, 404)))
        })
        .default_api_not_found_handler()
        .into();

    let (_, body) = send_json_request(&app, "GET", "/missing").await;
    assert_eq!(body["errors"][0]["name"], "not_found");
}

#[tokio::test]
async fn test_custom_error_handler_sees_context() {
    let app: Router = ApiRouter::new()
        .route(
            "/teapot",
            get(api_handler(|_ctx| async {
                Err(anyhow::Error::from(Failure::with_cause(
                    StatusCode::IM_A_TEAPOT,
                    anyhow::anyhow!("short and stout"),
                )))
            })),
        )
        .error_handler(StatusCode::IM_A_TEAPOT, |ctx| async move {
            let cause = ctx.cause().map(|c| c.to_string());
            Ok(Some(ApiResponse::error_with(
                "teapot",
                "I'm a teapot",
                Some(json!({ "cause": cause, "path": ctx.uri().path() })),
                ctx.status().as_u16(),
            )))
        })
        .into();

    let (status, body) = send_json_request(&app, "GET", "/teapot").await;
    assert_eq!(status, StatusCode::IM_A_TEAPOT);
    assert_eq!(body["errors"][0]["data"]["cause"], "short and stout");
    assert_eq!(body["errors"][0]["data"]["path"], "/teapot");
}

#[tokio::test]
async fn test_declared_error_is_not_rerouted() {
    let app: Router = ApiRouter::new()
        .route(
            "/gone",
            get(api_handler(|_ctx| async {
                Ok(Some(ApiResponse::error_with("gone", "Gone for good", None, 404)))
            })),
        )
        .default_api_not_found_handler()
        .into();

    let (status, body) = send_json_request(&app, "GET", "/gone").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["errors"][0]["name"], "gone");
}

#[tokio::test]
async fn test_concurrent_requests_are_isolated() {
    let app: Router = ApiRouter::new()
        .mount_api_router(
            "v1",
            Router::new().route(
                "/echo/:id",
                get(api_handler(|ctx: RequestContext| async move {
                    let id: u64 = ctx.path_param("id").unwrap_or("0").parse()?;
                    // Finish out of order
                    tokio::time::sleep(Duration::from_millis((37 * id) % 20)).await;
                    Ok(Some(ApiResponse::success(Some(json!({ "id": id })))))
                })),
            ),
        )
        .into();

    let requests = (0..32u64).map(|id| {
        let app = app.clone();
        async move {
            let (status, body) = send_json_request(&app, "GET", &format!("/api/v1/echo/{}", id)).await;
            (id, status, body)
        }
    });

    for (id, status, body) in futures::future::join_all(requests).await {
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["id"], id);
    }
}

#[tokio::test]
async fn test_layer_headers_survive_error_routing() {
    let app: Router = ApiRouter::new()
        .route(
            "/ok",
            get(api_handler(|_ctx| async { Ok(Some(ApiResponse::success(None))) })),
        )
        .route(
            "/boom",
            get(api_handler(|_ctx| async { Err(anyhow::anyhow!("disk full")) })),
        )
        .layer(SetResponseHeaderLayer::overriding(
            header::HeaderName::from_static("x-frame-options"),
            header::HeaderValue::from_static("DENY"),
        ))
        .default_api_internal_error_handler(None)
        .into();

    let (status, headers, _) = send(&app, "GET", "/ok", Body::empty()).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(headers.get("x-frame-options").unwrap(), "DENY");

    let (status, headers, body) = send(&app, "GET", "/boom", Body::empty()).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(headers.get("x-frame-options").unwrap(), "DENY");
    assert_eq!(
        headers.get(header::CONTENT_TYPE).unwrap(),
        "application/json; charset=UTF-8"
    );
    let body: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(body["errors"][0]["name"], "internal_error");
}

#[tokio::test]
async fn test_merged_and_wrapped_routers_get_error_routing() {
    let existing = Router::new().route(
        "/legacy",
        get(api_handler(|_ctx| async {
            Ok(Some(ApiResponse::success(Some(json!("legacy")))))
        })),
    );
    let extra = Router::new().route(
        "/denied",
        get(handler(|_ctx| async {
            Err(anyhow::Error::from(Failure::status(StatusCode::FORBIDDEN)))
        })),
    );

    let app: Router = ApiRouter::from_router(existing)
        .merge(extra)
        .default_api_error_handlers(None)
        .into();

    let (status, body) = send_json_request(&app, "GET", "/legacy").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"], "legacy");

    let (status, body) = send_json_request(&app, "GET", "/denied").await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["errors"][0]["name"], "unauthorized");

    let (status, body) = send_json_request(&app, "GET", "/nowhere").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["errors"][0]["name"], "not_found");
}

mod demo_service {
    use super::*;
    use api_envelope::api::handlers::{AppStateInner, ADMIN_TOKEN_HEADER};
    use api_envelope::api::middleware::REQUEST_ID_HEADER;
    use api_envelope::api::routes::create_router;
    use api_envelope::config::ApiConfig;

    fn create_test_app() -> Router {
        let api = ApiConfig {
            current_version: "v2".to_string(),
            supported_versions: vec!["v1".to_string(), "v2".to_string()],
            max_body_bytes: 1024,
        };
        create_router(Arc::new(AppStateInner::new("test-instance")), &api)
    }

    #[tokio::test]
    async fn test_health_endpoint() {
        let app = create_test_app();
        let (status, body) = send_json_request(&app, "GET", "/health").await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "healthy");
        assert_eq!(body["instance_id"], "test-instance");
    }

    #[tokio::test]
    async fn test_info_and_request_id() {
        let app = create_test_app();
        let (status, headers, body) = send(&app, "GET", "/api", Body::empty()).await;

        assert_eq!(status, StatusCode::OK);
        assert!(headers.get(REQUEST_ID_HEADER).is_some());
        let body: Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(body["data"]["supportedVersions"], json!(["v1", "v2"]));
    }

    #[tokio::test]
    async fn test_echo_per_version() {
        let app = create_test_app();

        let (_, body) = send_json_request(&app, "GET", "/api/v1/echo/hello").await;
        assert_eq!(body["data"], json!({"version": "v1", "message": "hello"}));

        let (_, body) = send_json_request(&app, "GET", "/api/v2/echo/hello").await;
        assert_eq!(body["data"]["version"], "v2");
        assert_eq!(body["data"]["length"], 5);
    }

    #[tokio::test]
    async fn test_echo_body() {
        let app = create_test_app();
        let payload = json!({"message": "ab", "repeat": 3}).to_string();
        let (status, _, body) = send(&app, "POST", "/api/v1/echo", Body::from(payload)).await;

        assert_eq!(status, StatusCode::OK);
        let body: Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(body["data"]["message"], "ababab");
    }

    #[tokio::test]
    async fn test_oversized_body_is_bad_request() {
        let app = create_test_app();
        let payload = json!({"message": "x".repeat(4096)}).to_string();
        let (status, _, body) = send(&app, "POST", "/api/v1/echo", Body::from(payload)).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        let body: Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(body["errors"][0]["name"], "bad_request");
    }

    #[tokio::test]
    async fn test_greeting_query() {
        let app = create_test_app();
        let (_, body) = send_json_request(&app, "GET", "/api/v1/greeting?name=Ada").await;
        assert_eq!(body["data"]["greeting"], "Hello, Ada!");
    }

    #[tokio::test]
    async fn test_admin_requires_token() {
        let app = create_test_app();
        let (status, body) = send_json_request(&app, "GET", "/api/v2/admin").await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(body["errors"][0]["name"], "unauthorized");

        let request = Request::builder()
            .uri("/api/v2/admin")
            .header(ADMIN_TOKEN_HEADER, "letmein")
            .body(Body::empty())
            .unwrap();
        let response = app.clone().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_plain_text_written_by_handler() {
        let app = create_test_app();
        let (status, headers, body) = send(&app, "GET", "/api/v2/plain", Body::empty()).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(
            headers.get(header::CONTENT_TYPE).unwrap(),
            "text/plain; charset=UTF-8"
        );
        assert_eq!(body, b"plain text from v2");
    }

    #[tokio::test]
    async fn test_signup_check_reports_all_errors() {
        let app = create_test_app();
        let (status, body) =
            send_json_request(&app, "GET", "/api/v2/signup/check?email=nope&username=a").await;

        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(body["statusCode"], 422);
        let names: Vec<&str> = body["errors"]
            .as_array()
            .unwrap()
            .iter()
            .map(|e| e["name"].as_str().unwrap())
            .collect();
        assert_eq!(names, vec!["invalid_email", "invalid_username"]);
    }

    #[tokio::test]
    async fn test_v1_routes_not_on_v2() {
        let app = create_test_app();
        let (status, body) = send_json_request(&app, "GET", "/api/v2/greeting").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["errors"][0]["name"], "not_found");
    }
}
