use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct StudentSession {
    pub id: Uuid,
    pub access_code_id: Uuid,
    pub course_id: Uuid,
    pub student_name: String,
    pub student_email: String,
    #[serde(skip_serializing)]
    pub access_token: String,
    pub theory_started_at: Option<DateTime<Utc>>,
    pub theory_completed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl StudentSession {
    pub fn theory_completed(&self) -> bool {
        self.theory_completed_at.is_some()
    }
}
