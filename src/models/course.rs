use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Course {
    pub id: Uuid,
    pub company_id: Option<Uuid>,
    pub name: String,
    pub description: Option<String>,
    /// Minimum percentage (1..=100) required to pass.
    pub passing_score: i32,
    pub time_limit_minutes: Option<i32>,
    pub max_attempts: i32,
    /// `None` means every active question is used.
    pub max_questions_in_test: Option<i32>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
