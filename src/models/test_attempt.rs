use crate::models::question::AnswerValue;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use sqlx::FromRow;
use std::collections::BTreeMap;
use uuid::Uuid;

pub const STATUS_IN_PROGRESS: &str = "in_progress";
pub const STATUS_COMPLETED: &str = "completed";

pub type AnswerSheet = BTreeMap<Uuid, AnswerValue>;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct TestAttempt {
    pub id: Uuid,
    pub student_session_id: Uuid,
    pub attempt_number: i32,
    pub question_ids: Json<Vec<Uuid>>,
    pub answers: Option<Json<AnswerSheet>>,
    pub score: Option<i32>,
    pub max_score: Option<i32>,
    pub percentage: Option<i32>,
    pub passed: Option<bool>,
    pub time_exceeded: bool,
    pub status: String,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl TestAttempt {
    pub fn is_in_progress(&self) -> bool {
        self.status == STATUS_IN_PROGRESS
    }

    pub fn is_passed(&self) -> bool {
        self.status == STATUS_COMPLETED && self.passed.unwrap_or(false)
    }

    /// Wall-clock deadline shown to the student.
    pub fn deadline(&self, time_limit_minutes: Option<i32>) -> Option<DateTime<Utc>> {
        time_limit_minutes.map(|m| self.started_at + Duration::minutes(m as i64))
    }

    /// True when a submission at `submitted_at` falls past the deadline plus grace.
    pub fn is_overtime(
        &self,
        time_limit_minutes: Option<i32>,
        grace_seconds: i64,
        submitted_at: DateTime<Utc>,
    ) -> bool {
        match self.deadline(time_limit_minutes) {
            Some(deadline) => submitted_at > deadline + Duration::seconds(grace_seconds),
            None => false,
        }
    }
}
