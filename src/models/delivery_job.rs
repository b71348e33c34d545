use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use sqlx::FromRow;
use uuid::Uuid;

pub const KIND_RENDER_DOCUMENT: &str = "render_document";
pub const KIND_SEND_EMAIL: &str = "send_email";

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct DeliveryJob {
    pub id: Uuid,
    pub certificate_id: Uuid,
    pub kind: String,
    pub payload: JsonValue,
    pub status: String,
    pub attempts: i32,
    pub max_attempts: i32,
    pub next_retry_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
