use axum::{
    http::StatusCode,
    response::{IntoResponse, Json},
};
use serde_json::json;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Access code has expired")]
    CodeExpired,

    #[error("Access code is not active")]
    CodeInactive,

    #[error("Access code has reached its participant limit")]
    CapacityExceeded,

    #[error("Maximum number of attempts ({0}) reached")]
    AttemptLimitExceeded(i32),

    #[error("Theory must be completed before starting the test")]
    TheoryNotCompleted,

    #[error("A certificate has already been issued for this session")]
    AlreadyCertified,

    #[error("Database error: {0}")]
    Database(sqlx::Error),

    #[error("Migration error: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),

    #[error("Validation error: {0}")]
    Validation(#[from] validator::ValidationErrors),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    Reqwest(#[from] reqwest::Error),

    #[error("Mail error: {0}")]
    Mail(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Stable machine-readable kind returned to clients.
    pub fn kind(&self) -> &'static str {
        match self {
            Error::Config(_) => "config_error",
            Error::BadRequest(_) | Error::Validation(_) | Error::Json(_) => "validation_error",
            Error::Unauthorized(_) => "unauthorized",
            Error::Forbidden(_) => "forbidden",
            Error::NotFound(_) => "not_found",
            Error::Conflict(_) => "conflict",
            Error::CodeExpired => "code_expired",
            Error::CodeInactive => "code_inactive",
            Error::CapacityExceeded => "capacity_exceeded",
            Error::AttemptLimitExceeded(_) => "attempt_limit_exceeded",
            Error::TheoryNotCompleted => "theory_not_completed",
            Error::AlreadyCertified => "already_certified",
            Error::Database(_) | Error::Migrate(_) => "database_error",
            Error::Reqwest(_) | Error::Mail(_) => "upstream_error",
            Error::Internal(_) => "internal_error",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Error::BadRequest(_) | Error::Validation(_) | Error::Json(_) => StatusCode::BAD_REQUEST,
            Error::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Error::Forbidden(_) | Error::CodeInactive => StatusCode::FORBIDDEN,
            Error::NotFound(_) => StatusCode::NOT_FOUND,
            Error::CodeExpired => StatusCode::GONE,
            Error::Conflict(_)
            | Error::CapacityExceeded
            | Error::AttemptLimitExceeded(_)
            | Error::TheoryNotCompleted
            | Error::AlreadyCertified => StatusCode::CONFLICT,
            Error::Reqwest(_) | Error::Mail(_) => StatusCode::BAD_GATEWAY,
            Error::Config(_) | Error::Database(_) | Error::Migrate(_) | Error::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> axum::response::Response {
        let status = self.status();
        let message = match &self {
            Error::Database(err) => {
                tracing::error!(error = ?err, "database error");
                "A database error occurred".to_string()
            }
            Error::Internal(msg) | Error::Config(msg) => {
                tracing::error!(error = %msg, "internal error");
                "An unexpected error occurred".to_string()
            }
            Error::Reqwest(err) => format!("External service error: {}", err),
            other => other.to_string(),
        };

        let body = Json(json!({ "error": self.kind(), "message": message }));
        (status, body).into_response()
    }
}

impl From<sqlx::Error> for Error {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => Error::NotFound("Resource not found".to_string()),
            other => Error::Database(other),
        }
    }
}

/// Name of the unique constraint a database error violated, if any.
pub fn unique_violation(err: &sqlx::Error) -> Option<String> {
    match err {
        sqlx::Error::Database(db) if db.is_unique_violation() => {
            Some(db.constraint().unwrap_or_default().to_string())
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;
    use serde_json::Value as JsonValue;

    #[test]
    fn domain_errors_map_to_stable_kinds() {
        assert_eq!(Error::CapacityExceeded.kind(), "capacity_exceeded");
        assert_eq!(Error::AttemptLimitExceeded(3).kind(), "attempt_limit_exceeded");
        assert_eq!(Error::AlreadyCertified.kind(), "already_certified");
        assert_eq!(Error::NotFound("code".into()).kind(), "not_found");
        assert_eq!(Error::BadRequest("x".into()).kind(), "validation_error");
    }

    #[test]
    fn domain_errors_map_to_http_statuses() {
        assert_eq!(Error::CodeExpired.status(), StatusCode::GONE);
        assert_eq!(Error::CodeInactive.status(), StatusCode::FORBIDDEN);
        assert_eq!(Error::CapacityExceeded.status(), StatusCode::CONFLICT);
        assert_eq!(Error::TheoryNotCompleted.status(), StatusCode::CONFLICT);
        assert_eq!(Error::Unauthorized("t".into()).status(), StatusCode::UNAUTHORIZED);
    }

    #[test]
    fn row_not_found_becomes_not_found() {
        let err: Error = sqlx::Error::RowNotFound.into();
        assert!(matches!(err, Error::NotFound(_)));
    }

    #[tokio::test]
    async fn response_body_carries_kind_and_message() {
        let resp = Error::AttemptLimitExceeded(2).into_response();
        assert_eq!(resp.status(), StatusCode::CONFLICT);
        let bytes = to_bytes(resp.into_body(), 1024).await.unwrap();
        let body: JsonValue = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["error"], "attempt_limit_exceeded");
        assert_eq!(body["message"], "Maximum number of attempts (2) reached");
    }

    #[tokio::test]
    async fn internal_errors_hide_details() {
        let resp = Error::Internal("secret detail".into()).into_response();
        let bytes = to_bytes(resp.into_body(), 1024).await.unwrap();
        let body: JsonValue = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["error"], "internal_error");
        assert!(!body["message"].as_str().unwrap().contains("secret"));
    }
}
