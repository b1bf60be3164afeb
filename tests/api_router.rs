mod support;

use axum::Router;
use axum::body::Body;
use axum::http::{Method, Request, StatusCode, header};
use axum::response::Response;
use http_body_util::BodyExt;
use serde_json::{Value, json};
use tempfile::tempdir;
use time::OffsetDateTime;
use tower::ServiceExt;

use quire::cache::CACHE_INVALIDATE_HEADER;
use quire::domain::entities::UserRecord;
use quire::domain::types::RoleName;
use quire::infra::http::{ApiState, build_router};

use support::{Harness, STAFF_HEADER};

const BOUNDARY: &str = "quire-test-boundary";

fn router(harness: &Harness, state: ApiState) -> Router {
    build_router(harness.router_state(state, true))
}

fn staff_request(
    user: &UserRecord,
    method: Method,
    uri: &str,
    body: Option<Value>,
) -> Request<Body> {
    let builder = Request::builder()
        .method(method)
        .uri(uri)
        .header(STAFF_HEADER, user.id.to_string());
    match body {
        Some(body) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .expect("request"),
        None => builder.body(Body::empty()).expect("request"),
    }
}

async fn json_body(response: Response) -> Value {
    let bytes = response
        .into_body()
        .collect()
        .await
        .expect("body")
        .to_bytes();
    serde_json::from_slice(&bytes).expect("json")
}

fn header_str<'a>(response: &'a Response, name: &str) -> Option<&'a str> {
    response
        .headers()
        .get(name)
        .and_then(|value| value.to_str().ok())
}

#[tokio::test]
async fn health_reflects_the_store() {
    let dir = tempdir().expect("tempdir");
    let harness = Harness::new(dir.path());

    let healthy = build_router(harness.router_state(harness.api_state(100, 1 << 20), true));
    let response = healthy
        .oneshot(Request::get("/health").body(Body::empty()).expect("request"))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    let failing = build_router(harness.router_state(harness.api_state(100, 1 << 20), false));
    let response = failing
        .oneshot(Request::get("/health").body(Body::empty()).expect("request"))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn anonymous_callers_are_rejected() {
    let dir = tempdir().expect("tempdir");
    let harness = Harness::new(dir.path());
    let app = router(&harness, harness.api_state(100, 1 << 20));

    let response = app
        .oneshot(
            Request::get("/api/admin/posts")
                .body(Body::empty())
                .expect("request"),
        )
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert!(header_str(&response, "x-request-id").is_some());
    let body = json_body(response).await;
    assert_eq!(body["errors"][0]["type"], "UnauthorizedError");
}

#[tokio::test]
async fn request_ids_are_echoed() {
    let dir = tempdir().expect("tempdir");
    let harness = Harness::new(dir.path());
    let editor = harness.user(RoleName::Editor).await;
    let app = router(&harness, harness.api_state(100, 1 << 20));

    let mut request = staff_request(&editor, Method::GET, "/api/admin/posts", None);
    request
        .headers_mut()
        .insert("x-request-id", "trace-123".parse().expect("header"));
    let response = app.oneshot(request).await.expect("response");
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(header_str(&response, "x-request-id"), Some("trace-123"));
}

#[tokio::test]
async fn publishing_sets_the_invalidation_header_and_queues_a_purge() {
    let dir = tempdir().expect("tempdir");
    let harness = Harness::new(dir.path());
    let editor = harness.user(RoleName::Editor).await;
    let state = harness.api_state(100, 1 << 20);
    let app = router(&harness, state.clone());

    let response = app
        .clone()
        .oneshot(staff_request(
            &editor,
            Method::POST,
            "/api/admin/posts",
            Some(json!({"posts": [{"title": "Draft only"}]})),
        ))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::CREATED);
    assert!(header_str(&response, CACHE_INVALIDATE_HEADER).is_none());
    assert!(state.cache.queue().is_empty());

    let response = app
        .oneshot(staff_request(
            &editor,
            Method::POST,
            "/api/admin/posts",
            Some(json!({"posts": [{"title": "Out now", "status": "published"}]})),
        ))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::CREATED);
    assert_eq!(header_str(&response, CACHE_INVALIDATE_HEADER), Some("/*"));
    assert_eq!(state.cache.queue().len(), 1);

    let body = json_body(response).await;
    assert_eq!(body["posts"][0]["slug"], "out-now");
}

#[tokio::test]
async fn post_routes_cover_read_edit_and_destroy() {
    let dir = tempdir().expect("tempdir");
    let harness = Harness::new(dir.path());
    let editor = harness.user(RoleName::Editor).await;
    let app = router(&harness, harness.api_state(100, 1 << 20));
    let post = harness.create_post(&editor, json!({"title": "Routed"})).await;
    let id = post["id"].as_str().expect("id");

    let response = app
        .clone()
        .oneshot(staff_request(&editor, Method::GET, "/api/admin/posts/slug/routed", None))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(json_body(response).await["posts"][0]["id"], id);

    let response = app
        .clone()
        .oneshot(staff_request(
            &editor,
            Method::PUT,
            &format!("/api/admin/posts/{id}"),
            Some(json!({"posts": [{"title": "Routed again"}]})),
        ))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::OK);
    let preview = format!("/p/{}/", post["uuid"].as_str().expect("uuid"));
    assert_eq!(
        header_str(&response, CACHE_INVALIDATE_HEADER),
        Some(preview.as_str())
    );

    let response = app
        .clone()
        .oneshot(staff_request(
            &editor,
            Method::DELETE,
            &format!("/api/admin/posts/{id}"),
            None,
        ))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::NO_CONTENT);
    assert_eq!(header_str(&response, CACHE_INVALIDATE_HEADER), Some("/*"));

    let response = app
        .oneshot(staff_request(
            &editor,
            Method::GET,
            &format!("/api/admin/posts/{id}"),
            None,
        ))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let body = json_body(response).await;
    assert_eq!(body["errors"][0]["type"], "NotFoundError");
    assert_eq!(body["errors"][0]["message"], "Post not found.");
}

#[tokio::test]
async fn validation_and_malformed_bodies_map_to_client_errors() {
    let dir = tempdir().expect("tempdir");
    let harness = Harness::new(dir.path());
    let editor = harness.user(RoleName::Editor).await;
    let app = router(&harness, harness.api_state(100, 1 << 20));

    let response = app
        .clone()
        .oneshot(staff_request(
            &editor,
            Method::GET,
            "/api/admin/posts?include=comments",
            None,
        ))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    let body = json_body(response).await;
    assert_eq!(body["errors"][0]["type"], "ValidationError");
    assert_eq!(body["errors"][0]["context"], "include");

    let request = Request::post("/api/admin/posts")
        .header(STAFF_HEADER, editor.id.to_string())
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from("{not json"))
        .expect("request");
    let response = app.oneshot(request).await.expect("response");
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(json_body(response).await["errors"][0]["type"], "BadRequestError");
}

#[tokio::test]
async fn api_keys_act_as_integrations() {
    let dir = tempdir().expect("tempdir");
    let harness = Harness::new(dir.path());
    let app = router(&harness, harness.api_state(100, 1 << 20));
    let token = harness.issue_token(None).await;

    let response = app
        .clone()
        .oneshot(
            Request::get("/api/admin/settings")
                .header(header::AUTHORIZATION, format!("Bearer {token}"))
                .body(Body::empty())
                .expect("request"),
        )
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    let keys: Vec<&str> = body["settings"]
        .as_array()
        .expect("settings")
        .iter()
        .filter_map(|entry| entry["key"].as_str())
        .collect();
    assert!(keys.contains(&"title"));
    assert!(!keys.contains(&"mailgun_api_key"));

    let response = app
        .clone()
        .oneshot(
            Request::get("/api/admin/settings")
                .header("x-api-key", format!("{token}x"))
                .body(Body::empty())
                .expect("request"),
        )
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let expired = harness
        .issue_token(Some(OffsetDateTime::now_utc() - time::Duration::days(1)))
        .await;
    let response = app
        .oneshot(
            Request::get("/api/admin/settings")
                .header("x-api-key", expired)
                .body(Body::empty())
                .expect("request"),
        )
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(
        json_body(response).await["errors"][0]["message"],
        "API key is no longer active"
    );
}

#[tokio::test]
async fn routes_download_is_a_yaml_attachment() {
    let dir = tempdir().expect("tempdir");
    let harness = Harness::new(dir.path());
    let admin = harness.user(RoleName::Administrator).await;
    let app = router(&harness, harness.api_state(100, 1 << 20));

    let response = app
        .oneshot(staff_request(
            &admin,
            Method::GET,
            "/api/admin/settings/routes/yaml",
            None,
        ))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        header_str(&response, "content-type"),
        Some("application/yaml; charset=utf-8")
    );
    assert_eq!(
        header_str(&response, "content-disposition"),
        Some("Attachment; filename=\"routes.yaml\"")
    );
    let bytes = response
        .into_body()
        .collect()
        .await
        .expect("body")
        .to_bytes();
    assert!(String::from_utf8_lossy(&bytes).contains("taxonomies:"));
}

fn multipart(field: &str, contents: &str) -> Body {
    Body::from(format!(
        "--{BOUNDARY}\r\n\
         Content-Disposition: form-data; name=\"{field}\"; filename=\"routes.yaml\"\r\n\
         Content-Type: application/yaml\r\n\r\n\
         {contents}\r\n\
         --{BOUNDARY}--\r\n"
    ))
}

fn upload_request(user: &UserRecord, body: Body) -> Request<Body> {
    Request::post("/api/admin/settings/routes/yaml")
        .header(STAFF_HEADER, user.id.to_string())
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={BOUNDARY}"),
        )
        .body(body)
        .expect("request")
}

#[tokio::test]
async fn routes_upload_through_multipart() {
    let dir = tempdir().expect("tempdir");
    let harness = Harness::new(dir.path());
    let admin = harness.user(RoleName::Administrator).await;
    let app = router(&harness, harness.api_state(100, 1 << 20));
    let routes = "routes:\n  /about/: about\n";

    let response = app
        .clone()
        .oneshot(upload_request(&admin, multipart("routes", routes)))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(header_str(&response, CACHE_INVALIDATE_HEADER), Some("/*"));
    assert_eq!(
        std::fs::read_to_string(harness.routes.path()).expect("routes"),
        routes
    );

    let response = app
        .oneshot(upload_request(&admin, multipart("other", routes)))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn oversized_uploads_are_refused() {
    let dir = tempdir().expect("tempdir");
    let harness = Harness::new(dir.path());
    let admin = harness.user(RoleName::Administrator).await;
    let app = router(&harness, harness.api_state(100, 256));
    let routes = format!("routes:\n{}", "  /a/: a\n".repeat(64));

    let response = app
        .oneshot(upload_request(&admin, multipart("routes", &routes)))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
    assert!(!harness.routes.path().exists());
}

#[tokio::test]
async fn rate_limit_answers_too_many_requests() {
    let dir = tempdir().expect("tempdir");
    let harness = Harness::new(dir.path());
    let editor = harness.user(RoleName::Editor).await;
    let app = router(&harness, harness.api_state(2, 1 << 20));

    for _ in 0..2 {
        let response = app
            .clone()
            .oneshot(staff_request(&editor, Method::GET, "/api/admin/settings", None))
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::OK);
    }

    let response = app
        .clone()
        .oneshot(staff_request(&editor, Method::GET, "/api/admin/settings", None))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(header_str(&response, "retry-after"), Some("60"));
    assert_eq!(
        json_body(response).await["errors"][0]["type"],
        "TooManyRequestsError"
    );

    // Other routes keep their own budget.
    let response = app
        .oneshot(staff_request(&editor, Method::GET, "/api/admin/posts", None))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::OK);
}
