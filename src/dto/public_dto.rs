use crate::models::company::Company;
use crate::models::course::Course;
use crate::models::question::{AnswerValue, TestQuestion};
use crate::models::theory_slide::TheorySlide;
use crate::services::grading_service::GradedAnswer;
use crate::models::test_attempt::AnswerSheet;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct RedeemCodeRequest {
    #[validate(length(min = 1, max = 64, message = "Access code is required"))]
    pub code: String,
    #[validate(length(min = 1, max = 200, message = "Name is required"))]
    pub student_name: String,
    #[validate(email(message = "A valid email is required"))]
    pub student_email: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublicCompanySummary {
    pub id: Uuid,
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublicCourseSummary {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub passing_score: i32,
    pub time_limit_minutes: Option<i32>,
    pub max_attempts: i32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedeemCodeResponse {
    pub access_token: String,
    pub session_id: Uuid,
    pub student_name: String,
    pub resumed: bool,
    pub requires_theory: bool,
    pub course: PublicCourseSummary,
    pub company: Option<PublicCompanySummary>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublicCertificate {
    pub certificate_number: String,
    pub verification_code: String,
    pub verification_url: String,
    pub document_url: Option<String>,
    pub issued_at: DateTime<Utc>,
    pub is_valid: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionProgressResponse {
    pub session_id: Uuid,
    pub student_name: String,
    pub course: PublicCourseSummary,
    pub requires_theory: bool,
    pub theory_started_at: Option<DateTime<Utc>>,
    pub theory_completed_at: Option<DateTime<Utc>>,
    pub attempts_used: i64,
    pub attempts_allowed: i32,
    pub attempt_in_progress: bool,
    pub best_percentage: Option<i32>,
    pub passed: bool,
    pub certificate: Option<PublicCertificate>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TheorySlideView {
    pub id: Uuid,
    pub title: String,
    pub content: String,
    pub image_url: Option<String>,
    pub slide_order: i32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TheoryResponse {
    pub slides: Vec<TheorySlideView>,
    pub theory_started_at: Option<DateTime<Utc>>,
    pub theory_completed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TheoryStatusResponse {
    pub theory_started_at: Option<DateTime<Utc>>,
    pub theory_completed_at: Option<DateTime<Utc>>,
}

/// A question as presented to a student: no correct answers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuestionView {
    pub id: Uuid,
    pub question_text: String,
    pub question_type: String,
    pub options: Vec<String>,
    pub points: i32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StartAttemptResponse {
    pub attempt_id: Uuid,
    pub attempt_number: i32,
    pub attempts_allowed: i32,
    pub resumed: bool,
    pub started_at: DateTime<Utc>,
    pub deadline: Option<DateTime<Utc>>,
    pub questions: Vec<QuestionView>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct SubmitAttemptRequest {
    #[serde(default)]
    pub answers: AnswerSheet,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuestionResultView {
    pub question_id: Uuid,
    pub submitted: Option<AnswerValue>,
    pub correct: bool,
    pub points_awarded: i32,
    pub max_points: i32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmitAttemptResponse {
    pub attempt_id: Uuid,
    pub attempt_number: i32,
    pub score: i32,
    pub max_score: i32,
    pub percentage: i32,
    pub passing_score: i32,
    pub passed: bool,
    pub time_exceeded: bool,
    pub attempts_remaining: i32,
    pub results: Vec<QuestionResultView>,
    pub certificate: Option<PublicCertificate>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerifyCertificateResponse {
    pub valid: bool,
    pub certificate_number: String,
    pub student_name: String,
    pub course_name: String,
    pub issued_at: DateTime<Utc>,
    pub revoked_at: Option<DateTime<Utc>>,
}

impl From<&Course> for PublicCourseSummary {
    fn from(course: &Course) -> Self {
        Self {
            id: course.id,
            name: course.name.clone(),
            description: course.description.clone(),
            passing_score: course.passing_score,
            time_limit_minutes: course.time_limit_minutes,
            max_attempts: course.max_attempts,
        }
    }
}

impl From<&Company> for PublicCompanySummary {
    fn from(company: &Company) -> Self {
        Self {
            id: company.id,
            name: company.name.clone(),
        }
    }
}

impl From<&TheorySlide> for TheorySlideView {
    fn from(slide: &TheorySlide) -> Self {
        Self {
            id: slide.id,
            title: slide.title.clone(),
            content: slide.content.clone(),
            image_url: slide.image_url.clone(),
            slide_order: slide.slide_order,
        }
    }
}

impl From<&TestQuestion> for QuestionView {
    fn from(q: &TestQuestion) -> Self {
        Self {
            id: q.id,
            question_text: q.question_text.clone(),
            question_type: q.question_type.clone(),
            options: q.options.0.clone(),
            points: q.points,
        }
    }
}

impl From<GradedAnswer> for QuestionResultView {
    fn from(g: GradedAnswer) -> Self {
        Self {
            question_id: g.question_id,
            submitted: g.submitted,
            correct: g.correct,
            points_awarded: g.points_awarded,
            max_points: g.max_points,
        }
    }
}
