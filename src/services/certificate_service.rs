use crate::dto::admin_dto::Paginated;
use crate::dto::public_dto::{PublicCertificate, VerifyCertificateResponse};
use crate::error::{Error, Result};
use crate::models::certificate::Certificate;
use crate::models::delivery_job::{DeliveryJob, KIND_RENDER_DOCUMENT, KIND_SEND_EMAIL};
use crate::models::test_attempt::TestAttempt;
use crate::services::delivery_service::enqueue_job;
use crate::utils::token::{generate_certificate_number, generate_verification_code};
use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::{PgExecutor, PgPool};
use url::Url;
use uuid::Uuid;

const ISSUE_RETRIES: usize = 5;

/// A certificate joined with the student and course it was issued for.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct CertificateDetails {
    pub id: Uuid,
    pub student_session_id: Uuid,
    pub test_attempt_id: Uuid,
    pub certificate_number: String,
    pub verification_code: String,
    pub document_url: Option<String>,
    pub is_valid: bool,
    pub revoked_at: Option<DateTime<Utc>>,
    pub revoked_reason: Option<String>,
    pub issued_at: DateTime<Utc>,
    pub student_name: String,
    pub student_email: String,
    pub course_id: Uuid,
    pub course_name: String,
    pub company_name: Option<String>,
    pub percentage: Option<i32>,
    pub delivery_status: Option<String>,
}

const DETAILS_SELECT: &str = r#"
    SELECT
        c.id, c.student_session_id, c.test_attempt_id, c.certificate_number,
        c.verification_code, c.document_url, c.is_valid, c.revoked_at,
        c.revoked_reason, c.issued_at,
        s.student_name, s.student_email,
        co.id AS course_id, co.name AS course_name,
        cp.name AS company_name,
        ta.percentage,
        (SELECT dj.status FROM delivery_jobs dj
         WHERE dj.certificate_id = c.id
         ORDER BY dj.created_at DESC LIMIT 1) AS delivery_status
    FROM certificates c
    JOIN student_sessions s ON s.id = c.student_session_id
    JOIN access_codes ac ON ac.id = s.access_code_id
    JOIN courses co ON co.id = s.course_id
    LEFT JOIN companies cp ON cp.id = COALESCE(ac.company_id, co.company_id)
    JOIN test_attempts ta ON ta.id = c.test_attempt_id
"#;

pub async fn load_details<'e, E: PgExecutor<'e>>(
    executor: E,
    certificate_id: Uuid,
) -> Result<CertificateDetails> {
    let sql = format!("{} WHERE c.id = $1", DETAILS_SELECT);
    sqlx::query_as::<_, CertificateDetails>(&sql)
        .bind(certificate_id)
        .fetch_optional(executor)
        .await?
        .ok_or_else(|| Error::NotFound(format!("Certificate {} not found", certificate_id)))
}

/// Public link a third party opens to check a certificate.
pub fn verification_url(public_base_url: &str, verification_code: &str) -> Result<String> {
    let mut base = public_base_url.trim().to_string();
    if !base.ends_with('/') {
        base.push('/');
    }
    let url = Url::parse(&base)
        .and_then(|b| b.join(&format!("verify/{}", verification_code)))
        .map_err(|e| Error::Config(format!("PUBLIC_BASE_URL is not a valid URL: {}", e)))?;
    Ok(url.to_string())
}

#[derive(Clone)]
pub struct CertificateService {
    pool: PgPool,
    public_base_url: String,
    delivery_max_attempts: i32,
}

impl CertificateService {
    pub fn new(pool: PgPool, public_base_url: String, delivery_max_attempts: i32) -> Self {
        Self {
            pool,
            public_base_url,
            delivery_max_attempts,
        }
    }

    /// Issues the session's certificate for a completed, passing attempt.
    ///
    /// Returns `Ok(None)` for attempts that did not pass. The render job is
    /// written in the same transaction, so a certificate never exists without
    /// its delivery being queued.
    pub async fn issue_certificate_if_passed(
        &self,
        attempt: &TestAttempt,
    ) -> Result<Option<Certificate>> {
        if !attempt.is_passed() {
            return Ok(None);
        }

        let mut tx = self.pool.begin().await?;
        if session_has_certificate(&mut *tx, attempt.student_session_id).await? {
            return Err(Error::AlreadyCertified);
        }

        let mut issued = None;
        for _ in 0..ISSUE_RETRIES {
            let now = Utc::now();
            // Conflicts on any unique key leave no row; the session check below tells them apart.
            let row = sqlx::query_as::<_, Certificate>(
                r#"
                INSERT INTO certificates (
                    student_session_id, test_attempt_id, certificate_number,
                    verification_code, issued_at
                )
                VALUES ($1, $2, $3, $4, $5)
                ON CONFLICT DO NOTHING
                RETURNING *
                "#,
            )
            .bind(attempt.student_session_id)
            .bind(attempt.id)
            .bind(generate_certificate_number(now))
            .bind(generate_verification_code())
            .bind(now)
            .fetch_optional(&mut *tx)
            .await?;

            if let Some(row) = row {
                issued = Some(row);
                break;
            }
            if session_has_certificate(&mut *tx, attempt.student_session_id).await? {
                return Err(Error::AlreadyCertified);
            }
            tracing::warn!(attempt_id = %attempt.id, "certificate number collision, retrying");
        }

        let Some(certificate) = issued else {
            return Err(Error::Internal(
                "Could not generate a unique certificate number".into(),
            ));
        };

        enqueue_job(
            &mut *tx,
            certificate.id,
            KIND_RENDER_DOCUMENT,
            serde_json::json!({}),
            self.delivery_max_attempts,
        )
        .await?;
        tx.commit().await?;

        tracing::info!(
            certificate_id = %certificate.id,
            number = %certificate.certificate_number,
            session_id = %certificate.student_session_id,
            "certificate issued"
        );
        Ok(Some(certificate))
    }

    pub async fn get_for_session(&self, session_id: Uuid) -> Result<Option<Certificate>> {
        let row = sqlx::query_as::<_, Certificate>(
            r#"SELECT * FROM certificates WHERE student_session_id = $1"#,
        )
        .bind(session_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    pub async fn get_details(&self, certificate_id: Uuid) -> Result<CertificateDetails> {
        load_details(&self.pool, certificate_id).await
    }

    pub async fn verify_certificate(&self, verification_code: &str) -> Result<VerifyCertificateResponse> {
        let code = verification_code.trim().to_uppercase();
        let sql = format!("{} WHERE c.verification_code = $1", DETAILS_SELECT);
        let details = sqlx::query_as::<_, CertificateDetails>(&sql)
            .bind(&code)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| Error::NotFound("Certificate not found".into()))?;

        Ok(VerifyCertificateResponse {
            valid: details.is_valid,
            certificate_number: details.certificate_number,
            student_name: details.student_name,
            course_name: details.course_name,
            issued_at: details.issued_at,
            revoked_at: details.revoked_at,
        })
    }

    pub async fn revoke_certificate(&self, certificate_id: Uuid, reason: &str) -> Result<Certificate> {
        let certificate = sqlx::query_as::<_, Certificate>(
            r#"
            UPDATE certificates
            SET is_valid = FALSE,
                revoked_at = COALESCE(revoked_at, NOW()),
                revoked_reason = $2
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(certificate_id)
        .bind(reason.trim())
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| Error::NotFound(format!("Certificate {} not found", certificate_id)))?;

        tracing::info!(certificate_id = %certificate.id, "certificate revoked");
        Ok(certificate)
    }

    pub async fn list_certificates(
        &self,
        page: i64,
        per_page: i64,
        course_id: Option<Uuid>,
        search: Option<String>,
    ) -> Result<Paginated<CertificateDetails>> {
        let offset = (page - 1) * per_page;
        let search_param = search.map(|s| format!("%{}%", s.trim()));
        let filter = r#"
            WHERE ($1::uuid IS NULL OR co.id = $1)
              AND ($2::text IS NULL OR s.student_name ILIKE $2
                   OR s.student_email ILIKE $2 OR c.certificate_number ILIKE $2)
        "#;

        let count_sql = format!(
            r#"
            SELECT COUNT(*)
            FROM certificates c
            JOIN student_sessions s ON s.id = c.student_session_id
            JOIN courses co ON co.id = s.course_id
            {}
            "#,
            filter
        );
        let total: i64 = sqlx::query_scalar(&count_sql)
            .bind(course_id)
            .bind(search_param.clone())
            .fetch_one(&self.pool)
            .await?;

        let list_sql = format!(
            "{} {} ORDER BY c.issued_at DESC LIMIT $3 OFFSET $4",
            DETAILS_SELECT, filter
        );
        let items = sqlx::query_as::<_, CertificateDetails>(&list_sql)
            .bind(course_id)
            .bind(search_param)
            .bind(per_page)
            .bind(offset)
            .fetch_all(&self.pool)
            .await?;

        Ok(Paginated::new(items, total, page, per_page))
    }

    /// Queues delivery again: a render when no document exists yet, otherwise the email.
    pub async fn requeue_delivery(&self, certificate_id: Uuid) -> Result<DeliveryJob> {
        let details = self.get_details(certificate_id).await?;
        if !details.is_valid {
            return Err(Error::Conflict("Revoked certificates are not delivered".into()));
        }
        let kind = if details.document_url.is_some() {
            KIND_SEND_EMAIL
        } else {
            KIND_RENDER_DOCUMENT
        };
        let job = enqueue_job(
            &self.pool,
            certificate_id,
            kind,
            serde_json::json!({ "requeued": true }),
            self.delivery_max_attempts,
        )
        .await?;
        tracing::info!(certificate_id = %certificate_id, kind, "certificate delivery re-queued");
        Ok(job)
    }

    pub fn to_public(&self, certificate: &Certificate) -> Result<PublicCertificate> {
        Ok(PublicCertificate {
            certificate_number: certificate.certificate_number.clone(),
            verification_code: certificate.verification_code.clone(),
            verification_url: verification_url(&self.public_base_url, &certificate.verification_code)?,
            document_url: certificate.document_url.clone(),
            issued_at: certificate.issued_at,
            is_valid: certificate.is_valid,
        })
    }
}

async fn session_has_certificate<'e, E: PgExecutor<'e>>(executor: E, session_id: Uuid) -> Result<bool> {
    let exists: bool = sqlx::query_scalar(
        r#"SELECT EXISTS (SELECT 1 FROM certificates WHERE student_session_id = $1)"#,
    )
    .bind(session_id)
    .fetch_one(executor)
    .await?;
    Ok(exists)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verification_url_keeps_base_path() {
        assert_eq!(
            verification_url("https://academy.example.com/portal", "ABCDEFGH2345").unwrap(),
            "https://academy.example.com/portal/verify/ABCDEFGH2345"
        );
        assert_eq!(
            verification_url("https://academy.example.com/", "ABCDEFGH2345").unwrap(),
            "https://academy.example.com/verify/ABCDEFGH2345"
        );
    }

    #[test]
    fn verification_url_rejects_relative_base() {
        assert!(matches!(
            verification_url("not a url", "ABC"),
            Err(Error::Config(_))
        ));
    }
}
