pub mod admin;
pub mod health;
pub mod public;

use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use tower_http::trace::TraceLayer;

use crate::config::get_config;
use crate::middleware::auth::require_admin;
use crate::middleware::cors::cors_layer;
use crate::middleware::rate_limit::{limit_requests, RateLimiter};
use crate::AppState;

/// Builds the full HTTP application: health, public student API and admin API.
pub fn router(state: AppState, public_rps: u32, admin_rps: u32) -> Router {
    let base_routes = Router::new()
        .route("/health", get(health::health))
        .route("/health/ready", get(health::ready));

    let public_api = Router::new()
        .route("/api/public/access-codes/redeem", post(public::redeem_code))
        .route("/api/public/sessions/:token", get(public::get_session))
        .route("/api/public/sessions/:token/theory", get(public::get_theory))
        .route(
            "/api/public/sessions/:token/theory/start",
            post(public::start_theory),
        )
        .route(
            "/api/public/sessions/:token/theory/complete",
            post(public::complete_theory),
        )
        .route(
            "/api/public/sessions/:token/attempts",
            post(public::start_attempt),
        )
        .route(
            "/api/public/sessions/:token/attempts/submit",
            post(public::submit_attempt),
        )
        .route(
            "/api/public/sessions/:token/certificate",
            get(public::get_certificate),
        )
        .route(
            "/api/public/certificates/verify/:code",
            get(public::verify_certificate),
        )
        .layer(axum::middleware::from_fn_with_state(
            RateLimiter::per_second(public_rps),
            limit_requests,
        ));

    let admin_api = Router::new()
        .route(
            "/api/admin/companies",
            get(admin::list_companies).post(admin::create_company),
        )
        .route(
            "/api/admin/companies/:id",
            axum::routing::patch(admin::update_company).delete(admin::delete_company),
        )
        .route(
            "/api/admin/courses",
            get(admin::list_courses).post(admin::create_course),
        )
        .route(
            "/api/admin/courses/:id",
            get(admin::get_course)
                .patch(admin::update_course)
                .delete(admin::delete_course),
        )
        .route(
            "/api/admin/courses/:id/slides",
            get(admin::list_slides).post(admin::create_slide),
        )
        .route(
            "/api/admin/courses/:id/slides/reorder",
            post(admin::reorder_slides),
        )
        .route(
            "/api/admin/slides/:id",
            axum::routing::patch(admin::update_slide).delete(admin::delete_slide),
        )
        .route(
            "/api/admin/courses/:id/questions",
            get(admin::list_questions).post(admin::create_question),
        )
        .route(
            "/api/admin/courses/:id/questions/reorder",
            post(admin::reorder_questions),
        )
        .route(
            "/api/admin/questions/:id",
            get(admin::get_question)
                .patch(admin::update_question)
                .delete(admin::delete_question),
        )
        .route(
            "/api/admin/courses/:id/sessions",
            get(admin::list_course_sessions),
        )
        .route(
            "/api/admin/access-codes",
            get(admin::list_access_codes).post(admin::create_access_code),
        )
        .route(
            "/api/admin/access-codes/:id",
            axum::routing::patch(admin::update_access_code).delete(admin::delete_access_code),
        )
        .route(
            "/api/admin/sessions/:id/attempts",
            get(admin::list_session_attempts),
        )
        .route("/api/admin/attempts/:id", get(admin::get_attempt))
        .route("/api/admin/certificates", get(admin::list_certificates))
        .route("/api/admin/certificates/:id", get(admin::get_certificate))
        .route(
            "/api/admin/certificates/:id/revoke",
            post(admin::revoke_certificate),
        )
        .route(
            "/api/admin/certificates/:id/requeue",
            post(admin::requeue_certificate_delivery),
        )
        .route("/api/admin/dashboard/stats", get(admin::dashboard_stats))
        .route("/api/admin/audit/:id", get(admin::audit_trail))
        .layer(axum::middleware::from_fn(require_admin));

    // Login sits outside the auth layer but shares the admin rate limit.
    let admin_api = admin_api
        .route("/api/admin/login", post(admin::login))
        .layer(axum::middleware::from_fn_with_state(
            RateLimiter::per_second(admin_rps),
            limit_requests,
        ));

    base_routes
        .merge(public_api)
        .merge(admin_api)
        .with_state(state)
        .layer(cors_layer(&get_config().cors_allowed_origins))
        .layer(TraceLayer::new_for_http())
        .layer(DefaultBodyLimit::max(2 * 1024 * 1024))
}
