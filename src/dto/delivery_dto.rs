use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Body POSTed to the document service to render a certificate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CertificateDocumentRequest {
    pub event: String,
    pub certificate_id: Uuid,
    pub certificate_number: String,
    pub verification_code: String,
    pub verification_url: String,
    pub student_name: String,
    pub student_email: String,
    pub course_name: String,
    pub company_name: Option<String>,
    pub percentage: i32,
    pub issued_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentServiceResponse {
    pub document_url: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutgoingEmail {
    pub to_name: String,
    pub to_email: String,
    pub subject: String,
    pub body: String,
}
