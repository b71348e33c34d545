use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Certificate {
    pub id: Uuid,
    pub student_session_id: Uuid,
    pub test_attempt_id: Uuid,
    pub certificate_number: String,
    pub verification_code: String,
    pub document_url: Option<String>,
    pub is_valid: bool,
    pub revoked_at: Option<DateTime<Utc>>,
    pub revoked_reason: Option<String>,
    pub issued_at: DateTime<Utc>,
}
