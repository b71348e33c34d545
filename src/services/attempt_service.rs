use crate::error::{unique_violation, Error, Result};
use crate::models::certificate::Certificate;
use crate::models::question::TestQuestion;
use crate::models::test_attempt::{AnswerSheet, TestAttempt, STATUS_COMPLETED, STATUS_IN_PROGRESS};
use crate::services::audit_service::AuditService;
use crate::services::certificate_service::CertificateService;
use crate::services::content_service::ContentService;
use crate::services::grading_service::{GradeOutcome, GradingService};
use crate::services::session_service::SessionContext;
use chrono::{DateTime, Utc};
use rand::seq::SliceRandom;
use rand::Rng;
use serde_json::json;
use sqlx::types::Json;
use sqlx::PgPool;
use uuid::Uuid;

/// Questions handed to the student for one attempt.
#[derive(Debug, Clone)]
pub struct QuestionSet {
    pub attempt: TestAttempt,
    pub questions: Vec<TestQuestion>,
    pub resumed: bool,
    pub attempts_allowed: i32,
    pub deadline: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone)]
pub struct ScoredResult {
    pub attempt: TestAttempt,
    pub outcome: GradeOutcome,
    pub passing_score: i32,
    pub attempts_remaining: i32,
    pub certificate: Option<Certificate>,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct AttemptDetail {
    pub attempt: TestAttempt,
    pub questions: Vec<TestQuestion>,
}

#[derive(Clone)]
pub struct AttemptService {
    pool: PgPool,
    content: ContentService,
    certificates: CertificateService,
    audit: AuditService,
    grace_seconds: i64,
}

impl AttemptService {
    pub fn new(
        pool: PgPool,
        content: ContentService,
        certificates: CertificateService,
        audit: AuditService,
        grace_seconds: i64,
    ) -> Self {
        Self {
            pool,
            content,
            certificates,
            audit,
            grace_seconds,
        }
    }

    async fn in_progress_attempt(&self, session_id: Uuid) -> Result<Option<TestAttempt>> {
        let row = sqlx::query_as::<_, TestAttempt>(
            r#"
            SELECT * FROM test_attempts
            WHERE student_session_id = $1 AND status = $2
            ORDER BY attempt_number DESC
            LIMIT 1
            "#,
        )
        .bind(session_id)
        .bind(STATUS_IN_PROGRESS)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    async fn passed_attempt(&self, session_id: Uuid) -> Result<Option<TestAttempt>> {
        let row = sqlx::query_as::<_, TestAttempt>(
            r#"
            SELECT * FROM test_attempts
            WHERE student_session_id = $1 AND status = $2 AND passed
            ORDER BY percentage DESC, attempt_number ASC
            LIMIT 1
            "#,
        )
        .bind(session_id)
        .bind(STATUS_COMPLETED)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    pub async fn start_attempt(&self, ctx: &SessionContext) -> Result<QuestionSet> {
        let session = &ctx.session;
        let course = &ctx.course;

        if ctx.access_code.requires_theory && !session.theory_completed() {
            return Err(Error::TheoryNotCompleted);
        }

        if let Some(attempt) = self.in_progress_attempt(session.id).await? {
            return self.resume(ctx, attempt).await;
        }

        if self.certificates.get_for_session(session.id).await?.is_some()
            || self.passed_attempt(session.id).await?.is_some()
        {
            return Err(Error::AlreadyCertified);
        }

        let used: i64 = sqlx::query_scalar(
            r#"SELECT COUNT(*) FROM test_attempts WHERE student_session_id = $1"#,
        )
        .bind(session.id)
        .fetch_one(&self.pool)
        .await?;
        if used >= course.max_attempts as i64 {
            return Err(Error::AttemptLimitExceeded(course.max_attempts));
        }

        let pool = self.content.list_questions(course.id, true).await?;
        let questions = select_questions(pool, course.max_questions_in_test, &mut rand::thread_rng());
        if questions.is_empty() {
            return Err(Error::BadRequest("This course has no active questions".into()));
        }
        let question_ids: Vec<Uuid> = questions.iter().map(|q| q.id).collect();

        // The HAVING clause re-checks the cap in the same statement that numbers the attempt.
        // A session holds at most one in-progress attempt (partial unique index), so a
        // concurrent start loses on a unique key and resumes the winner's attempt.
        let inserted = sqlx::query_as::<_, TestAttempt>(
            r#"
            INSERT INTO test_attempts (student_session_id, attempt_number, question_ids, status)
            SELECT $1, COALESCE(MAX(attempt_number), 0) + 1, $2, $3
            FROM test_attempts
            WHERE student_session_id = $1
            HAVING COUNT(*) < $4
            RETURNING *
            "#,
        )
        .bind(session.id)
        .bind(Json(&question_ids))
        .bind(STATUS_IN_PROGRESS)
        .bind(course.max_attempts as i64)
        .fetch_optional(&self.pool)
        .await;

        let attempt = match inserted {
            Ok(Some(attempt)) => attempt,
            Ok(None) => return Err(Error::AttemptLimitExceeded(course.max_attempts)),
            Err(e) if unique_violation(&e).is_some() => {
                return match self.in_progress_attempt(session.id).await? {
                    Some(open) => self.resume(ctx, open).await,
                    None => Err(Error::Conflict(
                        "Another attempt was started at the same time".into(),
                    )),
                };
            }
            Err(e) => return Err(e.into()),
        };

        tracing::info!(
            attempt_id = %attempt.id,
            session_id = %session.id,
            attempt_number = attempt.attempt_number,
            questions = question_ids.len(),
            "attempt started"
        );

        Ok(QuestionSet {
            deadline: attempt.deadline(course.time_limit_minutes),
            attempt,
            questions,
            resumed: false,
            attempts_allowed: course.max_attempts,
        })
    }

    async fn resume(&self, ctx: &SessionContext, attempt: TestAttempt) -> Result<QuestionSet> {
        let questions = self.content.questions_in_order(&attempt.question_ids).await?;
        tracing::info!(attempt_id = %attempt.id, session_id = %ctx.session.id, "attempt resumed");
        Ok(QuestionSet {
            deadline: attempt.deadline(ctx.course.time_limit_minutes),
            attempt,
            questions,
            resumed: true,
            attempts_allowed: ctx.course.max_attempts,
        })
    }

    pub async fn submit_attempt(&self, ctx: &SessionContext, answers: AnswerSheet) -> Result<ScoredResult> {
        let course = &ctx.course;
        let attempt = self
            .in_progress_attempt(ctx.session.id)
            .await?
            .ok_or_else(|| Error::NotFound("No attempt in progress".into()))?;

        let questions = self.content.questions_in_order(&attempt.question_ids).await?;
        let submitted_at = Utc::now();
        let time_exceeded = attempt.is_overtime(course.time_limit_minutes, self.grace_seconds, submitted_at);
        let outcome = GradingService::grade(&questions, &answers)?;
        let passed = GradingService::passed(outcome.percentage, course.passing_score, time_exceeded);

        let kept: AnswerSheet = answers
            .into_iter()
            .filter(|(id, _)| attempt.question_ids.contains(id))
            .collect();

        let completed = sqlx::query_as::<_, TestAttempt>(
            r#"
            UPDATE test_attempts
            SET answers = $1, score = $2, max_score = $3, percentage = $4, passed = $5,
                time_exceeded = $6, status = $7, completed_at = $8
            WHERE id = $9 AND status = $10
            RETURNING *
            "#,
        )
        .bind(Json(&kept))
        .bind(outcome.score)
        .bind(outcome.max_score)
        .bind(outcome.percentage)
        .bind(passed)
        .bind(time_exceeded)
        .bind(STATUS_COMPLETED)
        .bind(submitted_at)
        .bind(attempt.id)
        .bind(STATUS_IN_PROGRESS)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| Error::Conflict("Attempt was already submitted".into()))?;

        tracing::info!(
            attempt_id = %completed.id,
            session_id = %ctx.session.id,
            score = outcome.score,
            max_score = outcome.max_score,
            percentage = outcome.percentage,
            passed,
            time_exceeded,
            "attempt submitted"
        );

        self.audit
            .record(
                Some(&ctx.session.student_email),
                "attempt_submitted",
                "test_attempt",
                completed.id,
                Some(json!({
                    "attempt_number": completed.attempt_number,
                    "score": outcome.score,
                    "max_score": outcome.max_score,
                    "percentage": outcome.percentage,
                    "passed": passed,
                    "time_exceeded": time_exceeded,
                })),
            )
            .await;

        // The attempt is already stored; a failed issue is healed by `ensure_certificate`.
        let certificate = if passed {
            match self.certificates.issue_certificate_if_passed(&completed).await {
                Ok(c) => c,
                Err(Error::AlreadyCertified) => self.certificates.get_for_session(ctx.session.id).await?,
                Err(e) => {
                    tracing::error!(error = ?e, attempt_id = %completed.id, "certificate issue failed");
                    None
                }
            }
        } else {
            None
        };

        Ok(ScoredResult {
            attempts_remaining: (course.max_attempts - completed.attempt_number).max(0),
            passing_score: course.passing_score,
            attempt: completed,
            outcome,
            certificate,
        })
    }

    /// Returns the session's certificate, issuing it when a passing attempt exists without one.
    pub async fn ensure_certificate(&self, session_id: Uuid) -> Result<Option<Certificate>> {
        if let Some(existing) = self.certificates.get_for_session(session_id).await? {
            return Ok(Some(existing));
        }
        let Some(attempt) = self.passed_attempt(session_id).await? else {
            return Ok(None);
        };
        match self.certificates.issue_certificate_if_passed(&attempt).await {
            Err(Error::AlreadyCertified) => self.certificates.get_for_session(session_id).await,
            other => other,
        }
    }

    pub async fn list_attempts(&self, session_id: Uuid) -> Result<Vec<TestAttempt>> {
        let rows = sqlx::query_as::<_, TestAttempt>(
            r#"SELECT * FROM test_attempts WHERE student_session_id = $1 ORDER BY attempt_number ASC"#,
        )
        .bind(session_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    pub async fn get_attempt_detail(&self, attempt_id: Uuid) -> Result<AttemptDetail> {
        let attempt = sqlx::query_as::<_, TestAttempt>(r#"SELECT * FROM test_attempts WHERE id = $1"#)
            .bind(attempt_id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| Error::NotFound(format!("Attempt {} not found", attempt_id)))?;
        let questions = self.content.questions_in_order(&attempt.question_ids).await?;
        Ok(AttemptDetail { attempt, questions })
    }
}

/// Draws `limit` questions at random without replacement, or keeps the whole
/// ordered pool when no limit is set or the pool is not larger than it.
pub fn select_questions<R: Rng + ?Sized>(
    pool: Vec<TestQuestion>,
    limit: Option<i32>,
    rng: &mut R,
) -> Vec<TestQuestion> {
    match limit {
        Some(n) if n >= 1 && (n as usize) < pool.len() => {
            pool.choose_multiple(rng, n as usize).cloned().collect()
        }
        _ => pool,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::question::QuestionType;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use std::collections::HashSet;

    fn pool(n: i32) -> Vec<TestQuestion> {
        let course_id = Uuid::new_v4();
        let now = Utc::now();
        (1..=n)
            .map(|i| TestQuestion {
                id: Uuid::new_v4(),
                course_id,
                question_text: format!("Question {}", i),
                question_type: QuestionType::SingleChoice.as_str().into(),
                options: Json(vec!["A".into(), "B".into()]),
                correct_answers: Json(vec!["A".into()]),
                points: 1,
                question_order: i,
                is_active: true,
                created_at: now,
                updated_at: now,
            })
            .collect()
    }

    #[test]
    fn no_limit_keeps_pool_order() {
        let qs = pool(5);
        let ids: Vec<Uuid> = qs.iter().map(|q| q.id).collect();
        let picked = select_questions(qs, None, &mut StdRng::seed_from_u64(7));
        assert_eq!(picked.iter().map(|q| q.id).collect::<Vec<_>>(), ids);
    }

    #[test]
    fn limit_at_or_above_pool_size_uses_all() {
        let picked = select_questions(pool(4), Some(4), &mut StdRng::seed_from_u64(7));
        assert_eq!(picked.len(), 4);
        let picked = select_questions(pool(4), Some(10), &mut StdRng::seed_from_u64(7));
        assert_eq!(picked.len(), 4);
    }

    #[test]
    fn limit_draws_without_replacement() {
        let qs = pool(20);
        let all: HashSet<Uuid> = qs.iter().map(|q| q.id).collect();
        for seed in 0..25 {
            let picked = select_questions(qs.clone(), Some(8), &mut StdRng::seed_from_u64(seed));
            assert_eq!(picked.len(), 8);
            let unique: HashSet<Uuid> = picked.iter().map(|q| q.id).collect();
            assert_eq!(unique.len(), 8);
            assert!(unique.is_subset(&all));
        }
    }

    #[test]
    fn empty_pool_stays_empty() {
        assert!(select_questions(Vec::new(), Some(3), &mut StdRng::seed_from_u64(1)).is_empty());
    }
}
