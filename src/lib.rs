pub mod config;
pub mod database;
pub mod dto;
pub mod error;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod services;
pub mod utils;

use crate::config::Config;
use crate::services::{
    access_code_service::AccessCodeService,
    attempt_service::AttemptService,
    audit_service::AuditService,
    auth_service::AuthService,
    certificate_service::CertificateService,
    content_service::ContentService,
    course_service::CourseService,
    delivery_service::{backends_from_config, DeliveryService, DocumentRenderer, Mailer},
    session_service::SessionService,
    stats_service::StatsService,
};
use sqlx::PgPool;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub access_code_service: AccessCodeService,
    pub session_service: SessionService,
    pub content_service: ContentService,
    pub course_service: CourseService,
    pub attempt_service: AttemptService,
    pub certificate_service: CertificateService,
    pub delivery_service: DeliveryService,
    pub audit_service: AuditService,
    pub auth_service: AuthService,
    pub stats_service: StatsService,
}

impl AppState {
    pub fn new(pool: PgPool) -> error::Result<Self> {
        let config = config::get_config();
        let (renderer, mailer) = backends_from_config(config)?;
        Ok(Self::with_backends(pool, config, renderer, mailer))
    }

    pub fn with_backends(
        pool: PgPool,
        config: &Config,
        renderer: Option<Arc<dyn DocumentRenderer>>,
        mailer: Arc<dyn Mailer>,
    ) -> Self {
        let audit_service = AuditService::new(pool.clone());
        let content_service = ContentService::new(pool.clone());
        let certificate_service = CertificateService::new(
            pool.clone(),
            config.public_base_url.clone(),
            config.delivery_max_attempts,
        );
        let attempt_service = AttemptService::new(
            pool.clone(),
            content_service.clone(),
            certificate_service.clone(),
            audit_service.clone(),
            config.time_limit_grace_seconds,
        );
        let delivery_service =
            DeliveryService::new(pool.clone(), renderer, mailer, config.public_base_url.clone());

        Self {
            access_code_service: AccessCodeService::new(pool.clone()),
            session_service: SessionService::new(pool.clone()),
            course_service: CourseService::new(pool.clone()),
            auth_service: AuthService::new(
                pool.clone(),
                config.jwt_secret.clone(),
                config.jwt_ttl_hours,
            ),
            stats_service: StatsService::new(pool.clone()),
            content_service,
            attempt_service,
            certificate_service,
            delivery_service,
            audit_service,
            pool,
        }
    }
}
