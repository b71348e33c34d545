use crate::models::question::{AnswerValue, QuestionType};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use uuid::Uuid;
use validator::Validate;

#[derive(Debug, Deserialize, Validate)]
pub struct LoginRequest {
    #[validate(email)]
    pub email: String,
    #[validate(length(min = 1))]
    pub password: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct LoginResponse {
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct CompanyPayload {
    #[validate(length(min = 1, max = 200))]
    pub name: String,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CreateCoursePayload {
    pub company_id: Option<Uuid>,
    #[validate(length(min = 1, max = 300))]
    pub name: String,
    pub description: Option<String>,
    #[validate(range(min = 1, max = 100, message = "Passing score must be between 1 and 100"))]
    pub passing_score: i32,
    #[validate(range(min = 1, message = "Time limit must be at least 1 minute"))]
    pub time_limit_minutes: Option<i32>,
    #[validate(range(min = 1, message = "Max attempts must be at least 1"))]
    pub max_attempts: Option<i32>,
    #[validate(range(min = 1, message = "Question count must be at least 1"))]
    pub max_questions_in_test: Option<i32>,
    pub is_active: Option<bool>,
}

#[derive(Debug, Default, Deserialize, Validate)]
pub struct UpdateCoursePayload {
    #[serde(default, deserialize_with = "double_option")]
    pub company_id: Option<Option<Uuid>>,

    #[serde(default, deserialize_with = "trim_optional_string")]
    pub name: Option<String>,

    #[serde(default, deserialize_with = "trim_optional_string")]
    pub description: Option<String>,

    #[validate(range(min = 1, max = 100, message = "Passing score must be between 1 and 100"))]
    pub passing_score: Option<i32>,

    /// Absent leaves the limit untouched, `null` removes it.
    #[serde(default, deserialize_with = "double_option")]
    pub time_limit_minutes: Option<Option<i32>>,

    #[validate(range(min = 1, message = "Max attempts must be at least 1"))]
    pub max_attempts: Option<i32>,

    #[serde(default, deserialize_with = "double_option")]
    pub max_questions_in_test: Option<Option<i32>>,

    pub is_active: Option<bool>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateSlidePayload {
    #[validate(length(min = 1, max = 300))]
    pub title: String,
    #[serde(default)]
    pub content: String,
    pub image_url: Option<String>,
    pub is_active: Option<bool>,
}

#[derive(Debug, Default, Deserialize, Validate)]
pub struct UpdateSlidePayload {
    #[serde(default, deserialize_with = "trim_optional_string")]
    pub title: Option<String>,
    pub content: Option<String>,
    #[serde(default, deserialize_with = "double_option")]
    pub image_url: Option<Option<String>>,
    pub is_active: Option<bool>,
}

/// Full ordering of a course's slides or questions, first to last.
#[derive(Debug, Deserialize, Validate)]
pub struct ReorderPayload {
    #[validate(length(min = 1))]
    pub ids: Vec<Uuid>,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CreateQuestionPayload {
    #[validate(length(min = 1))]
    pub question_text: String,
    pub question_type: QuestionType,
    pub options: Vec<String>,
    pub correct_answers: AnswerValue,
    #[validate(range(min = 1, max = 1000, message = "Points must be between 1 and 1000"))]
    pub points: Option<i32>,
    pub is_active: Option<bool>,
}

#[derive(Debug, Default, Deserialize, Validate)]
pub struct UpdateQuestionPayload {
    #[serde(default, deserialize_with = "trim_optional_string")]
    pub question_text: Option<String>,
    pub question_type: Option<QuestionType>,
    pub options: Option<Vec<String>>,
    pub correct_answers: Option<AnswerValue>,
    #[validate(range(min = 1, max = 1000, message = "Points must be between 1 and 1000"))]
    pub points: Option<i32>,
    pub is_active: Option<bool>,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CreateAccessCodePayload {
    /// Generated when omitted.
    #[serde(default, deserialize_with = "trim_optional_string")]
    #[validate(length(min = 4, max = 64))]
    pub code: Option<String>,
    pub course_id: Uuid,
    pub company_id: Option<Uuid>,
    pub valid_until: DateTime<Utc>,
    #[validate(range(min = 1, message = "Max participants must be at least 1"))]
    pub max_participants: Option<i32>,
    #[serde(default)]
    pub unlimited_participants: bool,
    pub requires_theory: Option<bool>,
    pub is_active: Option<bool>,
}

#[derive(Debug, Default, Deserialize, Validate)]
pub struct UpdateAccessCodePayload {
    pub valid_until: Option<DateTime<Utc>>,
    #[validate(range(min = 1, message = "Max participants must be at least 1"))]
    pub max_participants: Option<i32>,
    pub unlimited_participants: Option<bool>,
    pub requires_theory: Option<bool>,
    pub is_active: Option<bool>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct RevokeCertificatePayload {
    #[validate(length(min = 1, max = 500))]
    pub reason: String,
}

#[derive(Debug, serde::Deserialize, Default)]
#[serde(default)]
pub struct ListQuery {
    pub page: Option<i64>,
    pub per_page: Option<i64>,
    pub is_active: Option<bool>,
    pub search: Option<String>,
    pub course_id: Option<Uuid>,
    pub company_id: Option<Uuid>,
}

impl ListQuery {
    pub fn page(&self) -> i64 {
        self.page.unwrap_or(1).max(1)
    }

    pub fn per_page(&self) -> i64 {
        self.per_page.unwrap_or(20).clamp(1, 100)
    }
}

#[derive(Debug, Serialize)]
pub struct Paginated<T> {
    pub items: Vec<T>,
    pub total: i64,
    pub page: i64,
    pub per_page: i64,
    pub total_pages: i64,
}

impl<T> Paginated<T> {
    pub fn new(items: Vec<T>, total: i64, page: i64, per_page: i64) -> Self {
        let total_pages = if per_page > 0 {
            ((total as f64) / (per_page as f64)).ceil() as i64
        } else {
            1
        };
        Self {
            items,
            total,
            page,
            per_page,
            total_pages,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct DashboardStats {
    pub courses: i64,
    pub active_access_codes: i64,
    pub sessions: i64,
    pub completed_attempts: i64,
    pub passed_attempts: i64,
    pub pass_rate: f64,
    pub certificates_issued: i64,
    pub certificates_revoked: i64,
    pub pending_deliveries: i64,
    pub failed_deliveries: i64,
}

// Custom deserializer to trim strings and convert empty strings to None
fn trim_optional_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let opt: Option<String> = Option::deserialize(deserializer)?;
    Ok(opt.and_then(|s| {
        let trimmed = s.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        }
    }))
}

// Distinguishes an explicit `null` (Some(None)) from an absent field (None).
fn double_option<'de, T, D>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    T: Deserialize<'de>,
    D: Deserializer<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}
