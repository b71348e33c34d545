use crate::error::{Error, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use sqlx::FromRow;
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuestionType {
    SingleChoice,
    MultipleChoice,
}

impl QuestionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            QuestionType::SingleChoice => "single_choice",
            QuestionType::MultipleChoice => "multiple_choice",
        }
    }
}

impl fmt::Display for QuestionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for QuestionType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "single_choice" => Ok(QuestionType::SingleChoice),
            "multiple_choice" => Ok(QuestionType::MultipleChoice),
            other => Err(Error::Internal(format!("Unknown question type '{}'", other))),
        }
    }
}

/// A submitted or stored answer: one option, or a set of options.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AnswerValue {
    Single(String),
    Multiple(Vec<String>),
}

impl AnswerValue {
    pub fn as_set(&self) -> BTreeSet<&str> {
        match self {
            AnswerValue::Single(v) => std::iter::once(v.as_str()).collect(),
            AnswerValue::Multiple(vs) => vs.iter().map(String::as_str).collect(),
        }
    }

    pub fn into_vec(self) -> Vec<String> {
        match self {
            AnswerValue::Single(v) => vec![v],
            AnswerValue::Multiple(vs) => vs,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct TestQuestion {
    pub id: Uuid,
    pub course_id: Uuid,
    pub question_text: String,
    pub question_type: String,
    pub options: Json<Vec<String>>,
    pub correct_answers: Json<Vec<String>>,
    pub points: i32,
    pub question_order: i32,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TestQuestion {
    pub fn kind(&self) -> Result<QuestionType> {
        self.question_type.parse()
    }
}

/// Upper bound on a single question's weight.
pub const MAX_QUESTION_POINTS: i32 = 1000;

/// Checks the shape rules for an authored question.
pub fn validate_question_shape(
    question_type: QuestionType,
    options: &[String],
    correct_answers: &[String],
    points: i32,
) -> Result<()> {
    if !(1..=MAX_QUESTION_POINTS).contains(&points) {
        return Err(Error::BadRequest(format!(
            "Points must be between 1 and {}",
            MAX_QUESTION_POINTS
        )));
    }
    if options.len() < 2 {
        return Err(Error::BadRequest("A question needs at least two options".into()));
    }
    if options.iter().any(|o| o.trim().is_empty()) {
        return Err(Error::BadRequest("Options must not be empty".into()));
    }
    let unique: BTreeSet<&str> = options.iter().map(String::as_str).collect();
    if unique.len() != options.len() {
        return Err(Error::BadRequest("Options must be unique".into()));
    }
    let correct: BTreeSet<&str> = correct_answers.iter().map(String::as_str).collect();
    if correct.len() != correct_answers.len() {
        return Err(Error::BadRequest("Correct answers must not repeat".into()));
    }
    if let Some(missing) = correct.iter().find(|c| !unique.contains(*c)) {
        return Err(Error::BadRequest(format!(
            "Correct answer '{}' is not one of the options",
            missing
        )));
    }
    match question_type {
        QuestionType::SingleChoice if correct.len() != 1 => Err(Error::BadRequest(
            "Single choice questions need exactly one correct answer".into(),
        )),
        QuestionType::MultipleChoice if correct.is_empty() => Err(Error::BadRequest(
            "Multiple choice questions need at least one correct answer".into(),
        )),
        _ => Ok(()),
    }
}
