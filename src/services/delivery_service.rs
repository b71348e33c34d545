use crate::config::{Config, SmtpConfig};
use crate::dto::delivery_dto::{CertificateDocumentRequest, DocumentServiceResponse, OutgoingEmail};
use crate::error::{Error, Result};
use crate::models::delivery_job::{DeliveryJob, KIND_RENDER_DOCUMENT, KIND_SEND_EMAIL};
use crate::services::certificate_service::{load_details, verification_url, CertificateDetails};
use crate::utils::crypto::sign_payload;
use async_trait::async_trait;
use chrono::{Duration, Utc};
use lettre::message::{header::ContentType, Mailbox};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{Address, AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use reqwest::Client;
use serde_json::Value as JsonValue;
use sqlx::{PgExecutor, PgPool};
use std::sync::Arc;
use uuid::Uuid;

pub const STATUS_PENDING: &str = "pending";
pub const STATUS_PROCESSING: &str = "processing";
pub const STATUS_SUCCESS: &str = "success";
pub const STATUS_FAILED: &str = "failed";

/// Renders a certificate document and returns where it can be downloaded.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait DocumentRenderer: Send + Sync {
    async fn render(&self, request: &CertificateDocumentRequest) -> Result<String>;
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, email: &OutgoingEmail) -> Result<()>;
}

pub struct HttpDocumentRenderer {
    client: Client,
    url: String,
    secret: Option<String>,
}

impl HttpDocumentRenderer {
    pub fn new(url: String, secret: Option<String>) -> Self {
        Self {
            client: Client::new(),
            url,
            secret,
        }
    }
}

#[async_trait]
impl DocumentRenderer for HttpDocumentRenderer {
    async fn render(&self, request: &CertificateDocumentRequest) -> Result<String> {
        let body = serde_json::to_vec(request)?;
        let mut req = self
            .client
            .post(&self.url)
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .timeout(std::time::Duration::from_secs(30));
        if let Some(signature) = self.secret.as_deref().and_then(|s| sign_payload(s, &body)) {
            req = req.header("X-Signature", signature);
        }
        let response = req.body(body).send().await?.error_for_status()?;
        let parsed: DocumentServiceResponse = response.json().await?;
        Ok(parsed.document_url)
    }
}

pub struct SmtpMailer {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
}

impl SmtpMailer {
    pub fn new(config: &SmtpConfig) -> Result<Self> {
        let from: Mailbox = config
            .from
            .parse()
            .map_err(|e| Error::Config(format!("Invalid SMTP_FROM address: {}", e)))?;

        let transport = match (&config.username, &config.password) {
            (Some(user), Some(pass)) => {
                AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.host)
                    .map_err(|e| Error::Config(format!("SMTP relay error: {}", e)))?
                    .port(config.port)
                    .credentials(Credentials::new(user.clone(), pass.clone()))
                    .build()
            }
            _ => AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(&config.host)
                .port(config.port)
                .build(),
        };

        Ok(Self { transport, from })
    }
}

#[async_trait]
impl Mailer for SmtpMailer {
    async fn send(&self, email: &OutgoingEmail) -> Result<()> {
        let address: Address = email
            .to_email
            .parse()
            .map_err(|e| Error::Mail(format!("Invalid recipient address: {}", e)))?;
        let message = Message::builder()
            .from(self.from.clone())
            .to(Mailbox::new(Some(email.to_name.clone()), address))
            .subject(email.subject.clone())
            .header(ContentType::TEXT_PLAIN)
            .body(email.body.clone())
            .map_err(|e| Error::Mail(format!("Failed to build email: {}", e)))?;

        self.transport
            .send(message)
            .await
            .map_err(|e| Error::Mail(format!("Failed to send email: {}", e)))?;
        tracing::info!(to = %email.to_email, subject = %email.subject, "email sent");
        Ok(())
    }
}

/// Used when SMTP is not configured: the email is written to the log instead.
pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    async fn send(&self, email: &OutgoingEmail) -> Result<()> {
        tracing::info!(
            to = %email.to_email,
            subject = %email.subject,
            body = %email.body,
            "SMTP not configured; certificate email logged"
        );
        Ok(())
    }
}

pub fn backends_from_config(
    config: &Config,
) -> Result<(Option<Arc<dyn DocumentRenderer>>, Arc<dyn Mailer>)> {
    let renderer: Option<Arc<dyn DocumentRenderer>> = config
        .document_service_url
        .as_ref()
        .filter(|u| !u.trim().is_empty())
        .map(|url| {
            Arc::new(HttpDocumentRenderer::new(
                url.clone(),
                config.document_service_secret.clone(),
            )) as Arc<dyn DocumentRenderer>
        });
    let mailer: Arc<dyn Mailer> = match &config.smtp {
        Some(smtp) => Arc::new(SmtpMailer::new(smtp)?),
        None => Arc::new(LogMailer),
    };
    Ok((renderer, mailer))
}

pub async fn enqueue_job<'e, E: PgExecutor<'e>>(
    executor: E,
    certificate_id: Uuid,
    kind: &str,
    payload: JsonValue,
    max_attempts: i32,
) -> Result<DeliveryJob> {
    let job = sqlx::query_as::<_, DeliveryJob>(
        r#"
        INSERT INTO delivery_jobs (certificate_id, kind, payload, status, max_attempts)
        VALUES ($1, $2, $3, $4, $5)
        RETURNING *
        "#,
    )
    .bind(certificate_id)
    .bind(kind)
    .bind(payload)
    .bind(STATUS_PENDING)
    .bind(max_attempts.max(1))
    .fetch_one(executor)
    .await?;
    Ok(job)
}

/// Seconds to wait before retrying after the `attempts`-th failure:
/// 30, 60, 120, ... capped at one hour.
pub fn next_retry_delay_secs(attempts: i32) -> i64 {
    let exponent = (attempts.max(1) - 1).min(20) as u32;
    (30i64 * 2i64.pow(exponent)).min(3600)
}

pub fn certificate_email(details: &CertificateDetails, verification_url: &str) -> OutgoingEmail {
    let mut body = format!(
        "Hello {},\n\nCongratulations on passing \"{}\".\n\nCertificate number: {}\nVerify it at: {}\n",
        details.student_name, details.course_name, details.certificate_number, verification_url
    );
    if let Some(url) = &details.document_url {
        body.push_str(&format!("Download your certificate: {}\n", url));
    }
    if let Some(company) = &details.company_name {
        body.push_str(&format!("\n{}\n", company));
    }

    OutgoingEmail {
        to_name: details.student_name.clone(),
        to_email: details.student_email.clone(),
        subject: format!("Your certificate for {}", details.course_name),
        body,
    }
}

pub fn document_request(details: &CertificateDetails, verification_url: &str) -> CertificateDocumentRequest {
    CertificateDocumentRequest {
        event: "certificate.issued".to_string(),
        certificate_id: details.id,
        certificate_number: details.certificate_number.clone(),
        verification_code: details.verification_code.clone(),
        verification_url: verification_url.to_string(),
        student_name: details.student_name.clone(),
        student_email: details.student_email.clone(),
        course_name: details.course_name.clone(),
        company_name: details.company_name.clone(),
        percentage: details.percentage.unwrap_or(0),
        issued_at: details.issued_at,
    }
}

#[derive(Debug, Default, PartialEq)]
pub struct StepOutcome {
    pub document_url: Option<String>,
    pub follow_up: Option<&'static str>,
}

/// Runs one delivery step for a certificate. Revoked certificates are skipped.
pub async fn perform_step(
    kind: &str,
    details: &CertificateDetails,
    verification_url: &str,
    renderer: Option<&dyn DocumentRenderer>,
    mailer: &dyn Mailer,
) -> Result<StepOutcome> {
    if !details.is_valid {
        tracing::info!(certificate_id = %details.id, kind, "certificate revoked; delivery skipped");
        return Ok(StepOutcome::default());
    }

    match kind {
        KIND_RENDER_DOCUMENT => {
            let document_url = match renderer {
                Some(r) => Some(r.render(&document_request(details, verification_url)).await?),
                None => None,
            };
            Ok(StepOutcome {
                document_url,
                follow_up: Some(KIND_SEND_EMAIL),
            })
        }
        KIND_SEND_EMAIL => {
            mailer.send(&certificate_email(details, verification_url)).await?;
            Ok(StepOutcome::default())
        }
        other => Err(Error::Internal(format!("Unknown delivery job kind '{}'", other))),
    }
}

#[derive(Clone)]
pub struct DeliveryService {
    pool: PgPool,
    renderer: Option<Arc<dyn DocumentRenderer>>,
    mailer: Arc<dyn Mailer>,
    public_base_url: String,
}

impl DeliveryService {
    pub fn new(
        pool: PgPool,
        renderer: Option<Arc<dyn DocumentRenderer>>,
        mailer: Arc<dyn Mailer>,
        public_base_url: String,
    ) -> Self {
        Self {
            pool,
            renderer,
            mailer,
            public_base_url,
        }
    }

    /// Returns jobs left in `processing` by a worker that died to the queue.
    /// The interrupted run counts as an attempt, so a job that keeps killing
    /// its worker still ends up `failed`.
    pub async fn reclaim_stale(&self) -> Result<u64> {
        let result = sqlx::query(
            r#"
            UPDATE delivery_jobs
            SET attempts = attempts + 1,
                status = CASE WHEN attempts + 1 >= max_attempts THEN $1 ELSE $2 END,
                next_retry_at = CASE
                    WHEN attempts + 1 >= max_attempts THEN NULL
                    ELSE NOW() + make_interval(secs => LEAST(3600, 30 * power(2::float, attempts)::int))
                END,
                last_error = 'worker stopped while processing',
                updated_at = NOW()
            WHERE status = $3 AND updated_at < NOW() - INTERVAL '10 minutes'
            "#,
        )
        .bind(STATUS_FAILED)
        .bind(STATUS_PENDING)
        .bind(STATUS_PROCESSING)
        .execute(&self.pool)
        .await?;

        let reclaimed = result.rows_affected();
        if reclaimed > 0 {
            tracing::warn!(reclaimed, "reclaimed stale delivery jobs");
        }
        Ok(reclaimed)
    }

    /// Claims the oldest due `pending` job.
    async fn claim_next(&self) -> Result<Option<DeliveryJob>> {
        let job = sqlx::query_as::<_, DeliveryJob>(
            r#"
            UPDATE delivery_jobs
            SET status = $1, updated_at = NOW()
            WHERE id = (
                SELECT id FROM delivery_jobs
                WHERE status = $2 AND (next_retry_at IS NULL OR next_retry_at <= NOW())
                ORDER BY created_at ASC
                FOR UPDATE SKIP LOCKED
                LIMIT 1
            )
            RETURNING *
            "#,
        )
        .bind(STATUS_PROCESSING)
        .bind(STATUS_PENDING)
        .fetch_optional(&self.pool)
        .await?;
        Ok(job)
    }

    /// Processes at most one job. Returns `false` when nothing was due.
    pub async fn run_once(&self) -> Result<bool> {
        self.reclaim_stale().await?;
        let Some(job) = self.claim_next().await? else {
            return Ok(false);
        };

        match self.execute(&job).await {
            Ok(()) => {
                tracing::info!(job_id = %job.id, kind = %job.kind, "delivery job completed");
            }
            Err(e) => self.record_failure(&job, &e.to_string()).await?,
        }
        Ok(true)
    }

    async fn execute(&self, job: &DeliveryJob) -> Result<()> {
        let details = load_details(&self.pool, job.certificate_id).await?;
        let url = verification_url(&self.public_base_url, &details.verification_code)?;
        let outcome = perform_step(
            &job.kind,
            &details,
            &url,
            self.renderer.as_deref(),
            self.mailer.as_ref(),
        )
        .await?;

        let mut tx = self.pool.begin().await?;
        if let Some(document_url) = &outcome.document_url {
            sqlx::query(r#"UPDATE certificates SET document_url = $1 WHERE id = $2"#)
                .bind(document_url)
                .bind(details.id)
                .execute(&mut *tx)
                .await?;
        }
        if let Some(kind) = outcome.follow_up {
            enqueue_job(&mut *tx, details.id, kind, serde_json::json!({}), job.max_attempts).await?;
        }
        sqlx::query(
            r#"UPDATE delivery_jobs SET status = $1, last_error = NULL, updated_at = NOW() WHERE id = $2"#,
        )
        .bind(STATUS_SUCCESS)
        .bind(job.id)
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;
        Ok(())
    }

    async fn record_failure(&self, job: &DeliveryJob, error: &str) -> Result<()> {
        let attempts = job.attempts + 1;
        let (status, next_retry_at) = if attempts < job.max_attempts {
            (
                STATUS_PENDING,
                Some(Utc::now() + Duration::seconds(next_retry_delay_secs(attempts))),
            )
        } else {
            (STATUS_FAILED, None)
        };

        sqlx::query(
            r#"
            UPDATE delivery_jobs
            SET attempts = $1, status = $2, next_retry_at = $3, last_error = $4, updated_at = NOW()
            WHERE id = $5
            "#,
        )
        .bind(attempts)
        .bind(status)
        .bind(next_retry_at)
        .bind(error)
        .bind(job.id)
        .execute(&self.pool)
        .await?;

        tracing::warn!(
            job_id = %job.id,
            kind = %job.kind,
            attempts,
            status,
            error,
            "delivery job failed"
        );
        Ok(())
    }

    pub async fn list_jobs(&self, certificate_id: Uuid) -> Result<Vec<DeliveryJob>> {
        let rows = sqlx::query_as::<_, DeliveryJob>(
            r#"SELECT * FROM delivery_jobs WHERE certificate_id = $1 ORDER BY created_at ASC"#,
        )
        .bind(certificate_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }
}
