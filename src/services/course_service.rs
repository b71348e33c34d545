use crate::dto::admin_dto::{CreateCoursePayload, Paginated, UpdateCoursePayload};
use crate::error::{unique_violation, Error, Result};
use crate::models::company::Company;
use crate::models::course::Course;
use sqlx::PgPool;
use uuid::Uuid;

#[derive(Debug, Default)]
pub struct CourseFilter {
    pub is_active: Option<bool>,
    pub company_id: Option<Uuid>,
    pub search: Option<String>,
}

#[derive(Clone)]
pub struct CourseService {
    pool: PgPool,
}

impl CourseService {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn create_course(&self, payload: CreateCoursePayload) -> Result<Course> {
        if let Some(company_id) = payload.company_id {
            self.get_company(company_id).await?;
        }

        let course = sqlx::query_as::<_, Course>(
            r#"
            INSERT INTO courses (
                company_id, name, description, passing_score, time_limit_minutes,
                max_attempts, max_questions_in_test, is_active
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING *
            "#,
        )
        .bind(payload.company_id)
        .bind(payload.name.trim())
        .bind(payload.description)
        .bind(payload.passing_score)
        .bind(payload.time_limit_minutes)
        .bind(payload.max_attempts.unwrap_or(3))
        .bind(payload.max_questions_in_test)
        .bind(payload.is_active.unwrap_or(true))
        .fetch_one(&self.pool)
        .await?;

        tracing::info!(course_id = %course.id, name = %course.name, "course created");
        Ok(course)
    }

    pub async fn get_course(&self, course_id: Uuid) -> Result<Course> {
        sqlx::query_as::<_, Course>(r#"SELECT * FROM courses WHERE id = $1"#)
            .bind(course_id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| Error::NotFound(format!("Course {} not found", course_id)))
    }

    pub async fn update_course(&self, course_id: Uuid, payload: UpdateCoursePayload) -> Result<Course> {
        if matches!(payload.time_limit_minutes, Some(Some(m)) if m < 1) {
            return Err(Error::BadRequest("Time limit must be at least 1 minute".into()));
        }
        if matches!(payload.max_questions_in_test, Some(Some(n)) if n < 1) {
            return Err(Error::BadRequest("Question count must be at least 1".into()));
        }
        if let Some(Some(company_id)) = payload.company_id {
            self.get_company(company_id).await?;
        }

        let course = sqlx::query_as::<_, Course>(
            r#"
            UPDATE courses
            SET
                company_id = CASE WHEN $1 THEN $2 ELSE company_id END,
                name = COALESCE($3, name),
                description = COALESCE($4, description),
                passing_score = COALESCE($5, passing_score),
                time_limit_minutes = CASE WHEN $6 THEN $7 ELSE time_limit_minutes END,
                max_attempts = COALESCE($8, max_attempts),
                max_questions_in_test = CASE WHEN $9 THEN $10 ELSE max_questions_in_test END,
                is_active = COALESCE($11, is_active),
                updated_at = NOW()
            WHERE id = $12
            RETURNING *
            "#,
        )
        .bind(payload.company_id.is_some())
        .bind(payload.company_id.flatten())
        .bind(payload.name)
        .bind(payload.description)
        .bind(payload.passing_score)
        .bind(payload.time_limit_minutes.is_some())
        .bind(payload.time_limit_minutes.flatten())
        .bind(payload.max_attempts)
        .bind(payload.max_questions_in_test.is_some())
        .bind(payload.max_questions_in_test.flatten())
        .bind(payload.is_active)
        .bind(course_id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| Error::NotFound(format!("Course {} not found", course_id)))?;

        Ok(course)
    }

    pub async fn list_courses(
        &self,
        page: i64,
        per_page: i64,
        filter: CourseFilter,
    ) -> Result<Paginated<Course>> {
        let offset = (page - 1) * per_page;
        let search_param: Option<String> = filter.search.map(|s| format!("%{}%", s));

        let total: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*) FROM courses
            WHERE ($1::bool IS NULL OR is_active = $1)
              AND ($2::uuid IS NULL OR company_id = $2)
              AND ($3::text IS NULL OR (name ILIKE $3 OR description ILIKE $3))
            "#,
        )
        .bind(filter.is_active)
        .bind(filter.company_id)
        .bind(search_param.clone())
        .fetch_one(&self.pool)
        .await?;

        let courses = sqlx::query_as::<_, Course>(
            r#"
            SELECT * FROM courses
            WHERE ($1::bool IS NULL OR is_active = $1)
              AND ($2::uuid IS NULL OR company_id = $2)
              AND ($3::text IS NULL OR (name ILIKE $3 OR description ILIKE $3))
            ORDER BY created_at DESC
            LIMIT $4 OFFSET $5
            "#,
        )
        .bind(filter.is_active)
        .bind(filter.company_id)
        .bind(search_param)
        .bind(per_page)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;

        Ok(Paginated::new(courses, total, page, per_page))
    }

    /// Courses with recorded student sessions are kept; deactivate them instead.
    pub async fn delete_course(&self, course_id: Uuid) -> Result<()> {
        let sessions: i64 =
            sqlx::query_scalar(r#"SELECT COUNT(*) FROM student_sessions WHERE course_id = $1"#)
                .bind(course_id)
                .fetch_one(&self.pool)
                .await?;
        if sessions > 0 {
            return Err(Error::Conflict(format!(
                "Course has {} student session(s); deactivate it instead",
                sessions
            )));
        }

        let result = sqlx::query(r#"DELETE FROM courses WHERE id = $1"#)
            .bind(course_id)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(Error::NotFound(format!("Course {} not found", course_id)));
        }
        Ok(())
    }

    pub async fn create_company(&self, name: &str) -> Result<Company> {
        sqlx::query_as::<_, Company>(r#"INSERT INTO companies (name) VALUES ($1) RETURNING *"#)
            .bind(name.trim())
            .fetch_one(&self.pool)
            .await
            .map_err(|e| match unique_violation(&e) {
                Some(_) => Error::Conflict(format!("Company '{}' already exists", name.trim())),
                None => e.into(),
            })
    }

    pub async fn get_company(&self, company_id: Uuid) -> Result<Company> {
        sqlx::query_as::<_, Company>(r#"SELECT * FROM companies WHERE id = $1"#)
            .bind(company_id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| Error::NotFound(format!("Company {} not found", company_id)))
    }

    pub async fn list_companies(&self) -> Result<Vec<Company>> {
        let rows = sqlx::query_as::<_, Company>(r#"SELECT * FROM companies ORDER BY name ASC"#)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows)
    }

    pub async fn update_company(&self, company_id: Uuid, name: &str) -> Result<Company> {
        sqlx::query_as::<_, Company>(
            r#"UPDATE companies SET name = $1, updated_at = NOW() WHERE id = $2 RETURNING *"#,
        )
        .bind(name.trim())
        .bind(company_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| match unique_violation(&e) {
            Some(_) => Error::Conflict(format!("Company '{}' already exists", name.trim())),
            None => e.into(),
        })?
        .ok_or_else(|| Error::NotFound(format!("Company {} not found", company_id)))
    }

    pub async fn delete_company(&self, company_id: Uuid) -> Result<()> {
        let result = sqlx::query(r#"DELETE FROM companies WHERE id = $1"#)
            .bind(company_id)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(Error::NotFound(format!("Company {} not found", company_id)));
        }
        Ok(())
    }
}
