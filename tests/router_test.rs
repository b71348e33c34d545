mod common;

use axum::{
    body::{to_bytes, Body},
    http::{Request, StatusCode},
};
use serde_json::{json, Value as JsonValue};
use tower::ServiceExt;
use training_backend::routes;
use training_backend::services::auth_service::issue_token;

fn app() -> axum::Router {
    routes::router(common::offline_state(), 1000, 1000)
}

async fn body_json(res: axum::response::Response) -> JsonValue {
    let bytes = to_bytes(res.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn health_reports_ok() {
    let res = app()
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(body_json(res).await["status"], "ok");
}

#[tokio::test]
async fn admin_routes_require_a_token() {
    let res = app()
        .oneshot(
            Request::builder()
                .uri("/api/admin/courses")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(body_json(res).await["error"], "missing_authorization");
}

#[tokio::test]
async fn admin_routes_reject_other_roles() {
    let (token, _) = issue_token(common::JWT_SECRET, "viewer@example.com", "viewer", 1).unwrap();
    let res = app()
        .oneshot(
            Request::builder()
                .uri("/api/admin/dashboard/stats")
                .header("Authorization", format!("Bearer {}", token))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::FORBIDDEN);
    assert_eq!(body_json(res).await["error"], "forbidden");
}

#[tokio::test]
async fn admin_routes_reject_forged_tokens() {
    let (token, _) = issue_token("not-the-server-secret", "admin@example.com", "admin", 1).unwrap();
    let res = app()
        .oneshot(
            Request::builder()
                .uri("/api/admin/certificates")
                .header("Authorization", format!("Bearer {}", token))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(body_json(res).await["error"], "invalid_token");
}

#[tokio::test]
async fn redeem_rejects_invalid_email_before_touching_storage() {
    let payload = json!({
        "code": "SAFETY24",
        "student_name": "Dana Weiss",
        "student_email": "dana-at-example"
    });
    let res = app()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/public/access-codes/redeem")
                .header("Content-Type", "application/json")
                .body(Body::from(payload.to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(res).await["error"], "validation_error");
}

#[tokio::test]
async fn login_validates_payload() {
    let res = app()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/admin/login")
                .header("Content-Type", "application/json")
                .body(Body::from(json!({ "email": "nope", "password": "" }).to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn public_rate_limit_applies() {
    let app = routes::router(common::offline_state(), 1, 1000);
    let request = || {
        Request::builder()
            .method("POST")
            .uri("/api/public/access-codes/redeem")
            .header("Content-Type", "application/json")
            .body(Body::from(
                json!({ "code": "X", "student_name": "A", "student_email": "bad" }).to_string(),
            ))
            .unwrap()
    };
    let first = app.clone().oneshot(request()).await.unwrap();
    assert_eq!(first.status(), StatusCode::BAD_REQUEST);
    let second = app.oneshot(request()).await.unwrap();
    assert_eq!(second.status(), StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(second.headers()["retry-after"], "1");
}
