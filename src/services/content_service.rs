use crate::dto::admin_dto::{
    CreateQuestionPayload, CreateSlidePayload, UpdateQuestionPayload, UpdateSlidePayload,
};
use crate::error::{Error, Result};
use crate::models::question::{validate_question_shape, QuestionType, TestQuestion};
use crate::models::theory_slide::TheorySlide;
use sqlx::types::Json;
use sqlx::PgPool;
use std::collections::HashSet;
use uuid::Uuid;

/// Theory slides and test questions of a course, including ordering.
#[derive(Clone)]
pub struct ContentService {
    pool: PgPool,
}

impl ContentService {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn list_slides(&self, course_id: Uuid, active_only: bool) -> Result<Vec<TheorySlide>> {
        let rows = sqlx::query_as::<_, TheorySlide>(
            r#"
            SELECT * FROM theory_slides
            WHERE course_id = $1 AND ($2 = FALSE OR is_active)
            ORDER BY slide_order ASC, created_at ASC
            "#,
        )
        .bind(course_id)
        .bind(active_only)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    pub async fn create_slide(&self, course_id: Uuid, payload: CreateSlidePayload) -> Result<TheorySlide> {
        let slide = sqlx::query_as::<_, TheorySlide>(
            r#"
            INSERT INTO theory_slides (course_id, title, content, image_url, slide_order, is_active)
            VALUES (
                $1, $2, $3, $4,
                (SELECT COALESCE(MAX(slide_order), 0) + 1 FROM theory_slides WHERE course_id = $1),
                $5
            )
            RETURNING *
            "#,
        )
        .bind(course_id)
        .bind(payload.title.trim())
        .bind(payload.content)
        .bind(payload.image_url)
        .bind(payload.is_active.unwrap_or(true))
        .fetch_one(&self.pool)
        .await?;
        Ok(slide)
    }

    pub async fn update_slide(&self, slide_id: Uuid, payload: UpdateSlidePayload) -> Result<TheorySlide> {
        sqlx::query_as::<_, TheorySlide>(
            r#"
            UPDATE theory_slides
            SET
                title = COALESCE($1, title),
                content = COALESCE($2, content),
                image_url = CASE WHEN $3 THEN $4 ELSE image_url END,
                is_active = COALESCE($5, is_active),
                updated_at = NOW()
            WHERE id = $6
            RETURNING *
            "#,
        )
        .bind(payload.title)
        .bind(payload.content)
        .bind(payload.image_url.is_some())
        .bind(payload.image_url.flatten())
        .bind(payload.is_active)
        .bind(slide_id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| Error::NotFound(format!("Slide {} not found", slide_id)))
    }

    pub async fn delete_slide(&self, slide_id: Uuid) -> Result<()> {
        let result = sqlx::query(r#"DELETE FROM theory_slides WHERE id = $1"#)
            .bind(slide_id)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(Error::NotFound(format!("Slide {} not found", slide_id)));
        }
        Ok(())
    }

    pub async fn reorder_slides(&self, course_id: Uuid, ids: &[Uuid]) -> Result<Vec<TheorySlide>> {
        let mut tx = self.pool.begin().await?;
        let existing: Vec<Uuid> = sqlx::query_scalar(
            r#"SELECT id FROM theory_slides WHERE course_id = $1 FOR UPDATE"#,
        )
        .bind(course_id)
        .fetch_all(&mut *tx)
        .await?;
        check_reorder(&existing, ids)?;

        for (position, id) in ids.iter().enumerate() {
            sqlx::query(r#"UPDATE theory_slides SET slide_order = $1, updated_at = NOW() WHERE id = $2"#)
                .bind(position as i32 + 1)
                .bind(id)
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;

        self.list_slides(course_id, false).await
    }

    pub async fn list_questions(&self, course_id: Uuid, active_only: bool) -> Result<Vec<TestQuestion>> {
        let rows = sqlx::query_as::<_, TestQuestion>(
            r#"
            SELECT * FROM test_questions
            WHERE course_id = $1 AND ($2 = FALSE OR is_active)
            ORDER BY question_order ASC, created_at ASC
            "#,
        )
        .bind(course_id)
        .bind(active_only)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    pub async fn get_question(&self, question_id: Uuid) -> Result<TestQuestion> {
        sqlx::query_as::<_, TestQuestion>(r#"SELECT * FROM test_questions WHERE id = $1"#)
            .bind(question_id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| Error::NotFound(format!("Question {} not found", question_id)))
    }

    /// Loads the given questions in the order of `ids`. Questions deleted since
    /// the attempt was drawn are left out.
    pub async fn questions_in_order(&self, ids: &[Uuid]) -> Result<Vec<TestQuestion>> {
        let rows = sqlx::query_as::<_, TestQuestion>(
            r#"SELECT * FROM test_questions WHERE id = ANY($1)"#,
        )
        .bind(ids)
        .fetch_all(&self.pool)
        .await?;

        let ordered: Vec<TestQuestion> = ids
            .iter()
            .filter_map(|id| rows.iter().find(|q| q.id == *id).cloned())
            .collect();
        if ordered.len() < ids.len() {
            tracing::warn!(
                expected = ids.len(),
                found = ordered.len(),
                "some drawn questions no longer exist"
            );
        }
        Ok(ordered)
    }

    pub async fn create_question(
        &self,
        course_id: Uuid,
        payload: CreateQuestionPayload,
    ) -> Result<TestQuestion> {
        let points = payload.points.unwrap_or(1);
        let correct = payload.correct_answers.into_vec();
        validate_question_shape(payload.question_type, &payload.options, &correct, points)?;

        let question = sqlx::query_as::<_, TestQuestion>(
            r#"
            INSERT INTO test_questions (
                course_id, question_text, question_type, options, correct_answers,
                points, question_order, is_active
            )
            VALUES (
                $1, $2, $3, $4, $5, $6,
                (SELECT COALESCE(MAX(question_order), 0) + 1 FROM test_questions WHERE course_id = $1),
                $7
            )
            RETURNING *
            "#,
        )
        .bind(course_id)
        .bind(payload.question_text.trim())
        .bind(payload.question_type.as_str())
        .bind(Json(&payload.options))
        .bind(Json(&correct))
        .bind(points)
        .bind(payload.is_active.unwrap_or(true))
        .fetch_one(&self.pool)
        .await?;
        Ok(question)
    }

    /// Partial updates are merged with the stored question and re-validated as a whole.
    pub async fn update_question(
        &self,
        question_id: Uuid,
        payload: UpdateQuestionPayload,
    ) -> Result<TestQuestion> {
        let current = self.get_question(question_id).await?;

        let question_type: QuestionType = match payload.question_type {
            Some(t) => t,
            None => current.kind()?,
        };
        let options = payload.options.unwrap_or_else(|| current.options.0.clone());
        let correct = payload
            .correct_answers
            .map(|a| a.into_vec())
            .unwrap_or_else(|| current.correct_answers.0.clone());
        let points = payload.points.unwrap_or(current.points);
        validate_question_shape(question_type, &options, &correct, points)?;

        let question = sqlx::query_as::<_, TestQuestion>(
            r#"
            UPDATE test_questions
            SET
                question_text = COALESCE($1, question_text),
                question_type = $2,
                options = $3,
                correct_answers = $4,
                points = $5,
                is_active = COALESCE($6, is_active),
                updated_at = NOW()
            WHERE id = $7
            RETURNING *
            "#,
        )
        .bind(payload.question_text)
        .bind(question_type.as_str())
        .bind(Json(&options))
        .bind(Json(&correct))
        .bind(points)
        .bind(payload.is_active)
        .bind(question_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(question)
    }

    pub async fn delete_question(&self, question_id: Uuid) -> Result<()> {
        let result = sqlx::query(r#"DELETE FROM test_questions WHERE id = $1"#)
            .bind(question_id)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(Error::NotFound(format!("Question {} not found", question_id)));
        }
        Ok(())
    }

    pub async fn reorder_questions(&self, course_id: Uuid, ids: &[Uuid]) -> Result<Vec<TestQuestion>> {
        let mut tx = self.pool.begin().await?;
        let existing: Vec<Uuid> = sqlx::query_scalar(
            r#"SELECT id FROM test_questions WHERE course_id = $1 FOR UPDATE"#,
        )
        .bind(course_id)
        .fetch_all(&mut *tx)
        .await?;
        check_reorder(&existing, ids)?;

        for (position, id) in ids.iter().enumerate() {
            sqlx::query(
                r#"UPDATE test_questions SET question_order = $1, updated_at = NOW() WHERE id = $2"#,
            )
            .bind(position as i32 + 1)
            .bind(id)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;

        self.list_questions(course_id, false).await
    }
}

/// A reorder request must name every existing item exactly once.
pub fn check_reorder(existing: &[Uuid], requested: &[Uuid]) -> Result<()> {
    let requested_set: HashSet<&Uuid> = requested.iter().collect();
    if requested_set.len() != requested.len() {
        return Err(Error::BadRequest("Reorder list contains duplicates".into()));
    }
    let existing_set: HashSet<&Uuid> = existing.iter().collect();
    if existing_set != requested_set {
        return Err(Error::BadRequest(
            "Reorder list must contain exactly the course's items".into(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reorder_accepts_permutation() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let c = Uuid::new_v4();
        assert!(check_reorder(&[a, b, c], &[c, a, b]).is_ok());
    }

    #[test]
    fn reorder_rejects_missing_items() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        assert!(matches!(check_reorder(&[a, b], &[a]), Err(Error::BadRequest(_))));
    }

    #[test]
    fn reorder_rejects_foreign_items() {
        let a = Uuid::new_v4();
        assert!(check_reorder(&[a], &[Uuid::new_v4()]).is_err());
    }

    #[test]
    fn reorder_rejects_duplicates() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let err = check_reorder(&[a, b], &[a, a, b]).unwrap_err();
        assert!(err.to_string().contains("duplicates"));
    }
}
