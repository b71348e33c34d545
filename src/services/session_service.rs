use crate::error::{Error, Result};
use crate::models::access_code::AccessCode;
use crate::models::course::Course;
use crate::models::student_session::StudentSession;
use crate::models::test_attempt::STATUS_COMPLETED;
use serde::Serialize;
use sqlx::PgPool;
use uuid::Uuid;

/// A session together with the code it was admitted through and its course.
#[derive(Debug, Clone)]
pub struct SessionContext {
    pub session: StudentSession,
    pub access_code: AccessCode,
    pub course: Course,
}

#[derive(Debug, Clone, Default, Serialize, sqlx::FromRow)]
pub struct AttemptStats {
    pub attempts_used: i64,
    pub in_progress: i64,
    pub best_percentage: Option<i32>,
    pub passed: bool,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct SessionOverview {
    pub id: Uuid,
    pub student_name: String,
    pub student_email: String,
    pub code: String,
    pub theory_completed_at: Option<chrono::DateTime<chrono::Utc>>,
    pub attempts_used: i64,
    pub best_percentage: Option<i32>,
    pub passed: bool,
    pub certificate_number: Option<String>,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

#[derive(Clone)]
pub struct SessionService {
    pool: PgPool,
}

impl SessionService {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn get_session(&self, session_id: Uuid) -> Result<StudentSession> {
        sqlx::query_as::<_, StudentSession>(r#"SELECT * FROM student_sessions WHERE id = $1"#)
            .bind(session_id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| Error::NotFound("Session not found".into()))
    }

    pub async fn context_by_token(&self, token: &str) -> Result<SessionContext> {
        let session = sqlx::query_as::<_, StudentSession>(
            r#"SELECT * FROM student_sessions WHERE access_token = $1"#,
        )
        .bind(token)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| Error::NotFound("Session not found".into()))?;
        self.context_for(session).await
    }

    pub async fn context_by_id(&self, session_id: Uuid) -> Result<SessionContext> {
        let session = self.get_session(session_id).await?;
        self.context_for(session).await
    }

    async fn context_for(&self, session: StudentSession) -> Result<SessionContext> {
        let access_code =
            sqlx::query_as::<_, AccessCode>(r#"SELECT * FROM access_codes WHERE id = $1"#)
                .bind(session.access_code_id)
                .fetch_one(&self.pool)
                .await?;
        let course = sqlx::query_as::<_, Course>(r#"SELECT * FROM courses WHERE id = $1"#)
            .bind(session.course_id)
            .fetch_one(&self.pool)
            .await?;
        Ok(SessionContext {
            session,
            access_code,
            course,
        })
    }

    /// Idempotent: the first start time is kept.
    pub async fn start_theory(&self, session_id: Uuid) -> Result<StudentSession> {
        let session = sqlx::query_as::<_, StudentSession>(
            r#"
            UPDATE student_sessions
            SET theory_started_at = COALESCE(theory_started_at, NOW())
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(session_id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| Error::NotFound("Session not found".into()))?;
        Ok(session)
    }

    /// Idempotent; also records a start time when theory was never opened.
    pub async fn complete_theory(&self, session_id: Uuid) -> Result<StudentSession> {
        let session = sqlx::query_as::<_, StudentSession>(
            r#"
            UPDATE student_sessions
            SET theory_started_at = COALESCE(theory_started_at, NOW()),
                theory_completed_at = COALESCE(theory_completed_at, NOW())
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(session_id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| Error::NotFound("Session not found".into()))?;
        tracing::info!(session_id = %session.id, "theory completed");
        Ok(session)
    }

    pub async fn attempt_stats(&self, session_id: Uuid) -> Result<AttemptStats> {
        let stats = sqlx::query_as::<_, AttemptStats>(
            r#"
            SELECT
                COUNT(*) AS attempts_used,
                COUNT(*) FILTER (WHERE status <> $2) AS in_progress,
                MAX(percentage) FILTER (WHERE status = $2) AS best_percentage,
                COALESCE(BOOL_OR(passed) FILTER (WHERE status = $2), FALSE) AS passed
            FROM test_attempts
            WHERE student_session_id = $1
            "#,
        )
        .bind(session_id)
        .bind(STATUS_COMPLETED)
        .fetch_one(&self.pool)
        .await?;
        Ok(stats)
    }

    pub async fn list_sessions_for_course(&self, course_id: Uuid) -> Result<Vec<SessionOverview>> {
        let rows = sqlx::query_as::<_, SessionOverview>(
            r#"
            SELECT
                s.id, s.student_name, s.student_email, ac.code, s.theory_completed_at,
                COUNT(ta.id) AS attempts_used,
                MAX(ta.percentage) FILTER (WHERE ta.status = $2) AS best_percentage,
                COALESCE(BOOL_OR(ta.passed) FILTER (WHERE ta.status = $2), FALSE) AS passed,
                c.certificate_number,
                s.created_at
            FROM student_sessions s
            JOIN access_codes ac ON ac.id = s.access_code_id
            LEFT JOIN test_attempts ta ON ta.student_session_id = s.id
            LEFT JOIN certificates c ON c.student_session_id = s.id
            WHERE s.course_id = $1
            GROUP BY s.id, ac.code, c.certificate_number
            ORDER BY s.created_at DESC
            "#,
        )
        .bind(course_id)
        .bind(STATUS_COMPLETED)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }
}
