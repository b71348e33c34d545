use crate::dto::admin_dto::{CreateAccessCodePayload, UpdateAccessCodePayload};
use crate::error::{unique_violation, Error, Result};
use crate::models::access_code::{normalize_code, AccessCode};
use crate::models::company::Company;
use crate::models::course::Course;
use crate::models::student_session::StudentSession;
use crate::utils::token::{generate_access_code, generate_access_token};
use chrono::Utc;
use sqlx::PgPool;
use uuid::Uuid;

const GENERATED_CODE_RETRIES: usize = 5;

#[derive(Debug, Clone)]
pub struct StudentIdentity {
    pub name: String,
    pub email: String,
}

#[derive(Debug, Clone)]
pub struct Redemption {
    pub session: StudentSession,
    pub access_code: AccessCode,
    pub course: Course,
    pub company: Option<Company>,
    /// True when the student re-entered an existing session.
    pub resumed: bool,
}

#[derive(Clone)]
pub struct AccessCodeService {
    pool: PgPool,
}

impl AccessCodeService {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn get_by_code(&self, code: &str) -> Result<AccessCode> {
        sqlx::query_as::<_, AccessCode>(r#"SELECT * FROM access_codes WHERE code = $1"#)
            .bind(normalize_code(code))
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| Error::NotFound("Access code not found".to_string()))
    }

    pub async fn get_by_id(&self, id: Uuid) -> Result<AccessCode> {
        sqlx::query_as::<_, AccessCode>(r#"SELECT * FROM access_codes WHERE id = $1"#)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| Error::NotFound(format!("Access code {} not found", id)))
    }

    /// Validates `code` and admits the student, creating their session.
    ///
    /// The capacity slot is taken with a single conditional UPDATE inside the
    /// same transaction as the session insert, so two concurrent redemptions
    /// cannot both take the last slot and a failed insert releases it.
    pub async fn validate_and_redeem_code(
        &self,
        code: &str,
        student: StudentIdentity,
    ) -> Result<Redemption> {
        let normalized = normalize_code(code);
        if normalized.is_empty() {
            return Err(Error::BadRequest("Access code is required".into()));
        }
        let email = student.email.trim().to_lowercase();
        let name = student.name.trim().to_string();
        if name.is_empty() || email.is_empty() {
            return Err(Error::BadRequest("Student name and email are required".into()));
        }

        let current = self.get_by_code(&normalized).await?;
        let course = sqlx::query_as::<_, Course>(r#"SELECT * FROM courses WHERE id = $1"#)
            .bind(current.course_id)
            .fetch_one(&self.pool)
            .await?;
        if !course.is_active {
            return Err(Error::CodeInactive);
        }
        let company = self.company_for(&current, &course).await?;

        let existing = sqlx::query_as::<_, StudentSession>(
            r#"SELECT * FROM student_sessions WHERE access_code_id = $1 AND LOWER(student_email) = $2"#,
        )
        .bind(current.id)
        .bind(&email)
        .fetch_optional(&self.pool)
        .await?;
        if let Some(session) = existing {
            current.check_usable(Utc::now())?;
            tracing::info!(session_id = %session.id, code = %current.code, "student resumed session");
            return Ok(Redemption {
                session,
                access_code: current,
                course,
                company,
                resumed: true,
            });
        }

        let mut tx = self.pool.begin().await?;
        let claimed = sqlx::query_as::<_, AccessCode>(
            r#"
            UPDATE access_codes
            SET usage_count = usage_count + 1, updated_at = NOW()
            WHERE id = $1
              AND is_active
              AND valid_until > NOW()
              AND (unlimited_participants OR usage_count < max_participants)
            RETURNING *
            "#,
        )
        .bind(current.id)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(access_code) = claimed else {
            tx.rollback().await?;
            let latest = self.get_by_id(current.id).await?;
            let reason = latest
                .check_redeemable(Utc::now())
                .err()
                .unwrap_or(Error::CapacityExceeded);
            tracing::warn!(code = %latest.code, reason = reason.kind(), "access code redemption rejected");
            return Err(reason);
        };

        let inserted = sqlx::query_as::<_, StudentSession>(
            r#"
            INSERT INTO student_sessions (access_code_id, course_id, student_name, student_email, access_token)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING *
            "#,
        )
        .bind(access_code.id)
        .bind(access_code.course_id)
        .bind(&name)
        .bind(&email)
        .bind(generate_access_token(48))
        .fetch_one(&mut *tx)
        .await;

        let session = match inserted {
            Ok(session) => session,
            Err(e) if unique_violation(&e).is_some() => {
                // Same student redeemed concurrently; the slot taken above is released.
                tx.rollback().await?;
                let session = sqlx::query_as::<_, StudentSession>(
                    r#"SELECT * FROM student_sessions WHERE access_code_id = $1 AND LOWER(student_email) = $2"#,
                )
                .bind(current.id)
                .bind(&email)
                .fetch_one(&self.pool)
                .await?;
                return Ok(Redemption {
                    session,
                    access_code: current,
                    course,
                    company,
                    resumed: true,
                });
            }
            Err(e) => return Err(e.into()),
        };
        tx.commit().await?;

        tracing::info!(
            session_id = %session.id,
            code = %access_code.code,
            usage_count = access_code.usage_count,
            "access code redeemed"
        );

        Ok(Redemption {
            session,
            access_code,
            course,
            company,
            resumed: false,
        })
    }

    async fn company_for(&self, code: &AccessCode, course: &Course) -> Result<Option<Company>> {
        let Some(company_id) = code.company_id.or(course.company_id) else {
            return Ok(None);
        };
        let company = sqlx::query_as::<_, Company>(r#"SELECT * FROM companies WHERE id = $1"#)
            .bind(company_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(company)
    }

    pub async fn create_code(&self, payload: CreateAccessCodePayload) -> Result<AccessCode> {
        check_capacity_settings(payload.unlimited_participants, payload.max_participants)?;

        let explicit = payload.code.as_deref().map(normalize_code);
        let tries = if explicit.is_some() { 1 } else { GENERATED_CODE_RETRIES };

        for _ in 0..tries {
            let code = explicit.clone().unwrap_or_else(generate_access_code);
            let inserted = sqlx::query_as::<_, AccessCode>(
                r#"
                INSERT INTO access_codes (
                    code, course_id, company_id, valid_until, max_participants,
                    unlimited_participants, requires_theory, is_active
                )
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
                RETURNING *
                "#,
            )
            .bind(&code)
            .bind(payload.course_id)
            .bind(payload.company_id)
            .bind(payload.valid_until)
            .bind(if payload.unlimited_participants { None } else { payload.max_participants })
            .bind(payload.unlimited_participants)
            .bind(payload.requires_theory.unwrap_or(true))
            .bind(payload.is_active.unwrap_or(true))
            .fetch_one(&self.pool)
            .await;

            match inserted {
                Ok(row) => {
                    tracing::info!(code = %row.code, course_id = %row.course_id, "access code created");
                    return Ok(row);
                }
                Err(e) if unique_violation(&e).is_some() => {
                    if explicit.is_some() {
                        return Err(Error::Conflict(format!("Access code '{}' already exists", code)));
                    }
                }
                Err(e) => return Err(e.into()),
            }
        }

        Err(Error::Internal("Could not generate a unique access code".into()))
    }

    pub async fn update_code(&self, id: Uuid, payload: UpdateAccessCodePayload) -> Result<AccessCode> {
        let current = self.get_by_id(id).await?;
        let unlimited = payload.unlimited_participants.unwrap_or(current.unlimited_participants);
        let max = if unlimited {
            None
        } else {
            payload.max_participants.or(current.max_participants)
        };
        check_capacity_settings(unlimited, max)?;
        if let Some(m) = max {
            if !unlimited && m < current.usage_count {
                return Err(Error::BadRequest(format!(
                    "Max participants cannot be lower than current usage ({})",
                    current.usage_count
                )));
            }
        }

        let updated = sqlx::query_as::<_, AccessCode>(
            r#"
            UPDATE access_codes
            SET
                valid_until = COALESCE($1, valid_until),
                max_participants = $2,
                unlimited_participants = $3,
                requires_theory = COALESCE($4, requires_theory),
                is_active = COALESCE($5, is_active),
                updated_at = NOW()
            WHERE id = $6
            RETURNING *
            "#,
        )
        .bind(payload.valid_until)
        .bind(max)
        .bind(unlimited)
        .bind(payload.requires_theory)
        .bind(payload.is_active)
        .bind(id)
        .fetch_one(&self.pool)
        .await?;
        Ok(updated)
    }

    pub async fn list_codes(&self, course_id: Option<Uuid>) -> Result<Vec<AccessCode>> {
        let rows = sqlx::query_as::<_, AccessCode>(
            r#"
            SELECT * FROM access_codes
            WHERE ($1::uuid IS NULL OR course_id = $1)
            ORDER BY created_at DESC
            "#,
        )
        .bind(course_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    /// Only never-redeemed codes can be removed; used codes are deactivated instead.
    pub async fn delete_code(&self, id: Uuid) -> Result<()> {
        let code = self.get_by_id(id).await?;
        if code.usage_count > 0 {
            return Err(Error::Conflict(format!(
                "Access code '{}' has been used {} time(s); deactivate it instead",
                code.code, code.usage_count
            )));
        }
        sqlx::query(r#"DELETE FROM access_codes WHERE id = $1 AND usage_count = 0"#)
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

pub fn check_capacity_settings(unlimited: bool, max_participants: Option<i32>) -> Result<()> {
    match (unlimited, max_participants) {
        (true, _) => Ok(()),
        (false, Some(m)) if m >= 1 => Ok(()),
        (false, _) => Err(Error::BadRequest(
            "Limited access codes need max_participants of at least 1".into(),
        )),
    }
}
