use crate::error::{Error, Result};
use dotenvy::dotenv;
use std::env;
use std::sync::OnceLock;

#[derive(Debug, Clone)]
pub struct Config {
    pub server_address: String,
    pub database_url: String,
    pub database_max_connections: u32,
    pub jwt_secret: String,
    pub jwt_ttl_hours: i64,
    pub public_rps: u32,
    pub admin_rps: u32,
    pub public_base_url: String,
    /// Empty allows any origin.
    pub cors_allowed_origins: Vec<String>,
    pub time_limit_grace_seconds: i64,
    pub delivery_max_attempts: i32,
    pub document_service_url: Option<String>,
    pub document_service_secret: Option<String>,
    pub smtp: Option<SmtpConfig>,
    pub admin_email: Option<String>,
    pub admin_password: Option<String>,
}

#[derive(Debug, Clone)]
pub struct SmtpConfig {
    pub host: String,
    pub port: u16,
    pub username: Option<String>,
    pub password: Option<String>,
    pub from: String,
}

pub static CONFIG: OnceLock<Config> = OnceLock::new();

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenv().ok();

        let smtp = match env::var("SMTP_HOST").ok().filter(|h| !h.trim().is_empty()) {
            Some(host) => Some(SmtpConfig {
                host,
                port: get_env_parse_or("SMTP_PORT", 587)?,
                username: env::var("SMTP_USER").ok(),
                password: env::var("SMTP_PASS").ok(),
                from: get_env("SMTP_FROM")?,
            }),
            None => None,
        };

        Ok(Self {
            server_address: get_env("SERVER_ADDRESS")?,
            database_url: get_env("DATABASE_URL")?,
            database_max_connections: get_env_parse_or("DATABASE_MAX_CONNECTIONS", 20)?,
            jwt_secret: get_env("JWT_SECRET")?,
            jwt_ttl_hours: get_env_parse_or("JWT_TTL_HOURS", 12)?,
            public_rps: get_env_parse("PUBLIC_RPS")?,
            admin_rps: get_env_parse("ADMIN_RPS")?,
            public_base_url: get_env("PUBLIC_BASE_URL")?,
            cors_allowed_origins: env::var("CORS_ALLOWED_ORIGINS")
                .map(|raw| split_list(&raw))
                .unwrap_or_default(),
            time_limit_grace_seconds: get_env_parse_or("TIME_LIMIT_GRACE_SECONDS", 30)?,
            delivery_max_attempts: get_env_parse_or("DELIVERY_MAX_ATTEMPTS", 5)?,
            document_service_url: env::var("DOCUMENT_SERVICE_URL").ok(),
            document_service_secret: env::var("DOCUMENT_SERVICE_SECRET").ok(),
            smtp,
            admin_email: env::var("ADMIN_EMAIL").ok(),
            admin_password: env::var("ADMIN_PASSWORD").ok(),
        })
    }
}

fn get_env(name: &str) -> Result<String> {
    env::var(name).map_err(|_| Error::Config(format!("Missing environment variable: {}", name)))
}

fn get_env_parse<T>(name: &str) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    let raw = get_env(name)?;
    parse_value(name, &raw)
}

fn get_env_parse_or<T>(name: &str, default: T) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(name) {
        Ok(raw) => parse_value(name, &raw),
        Err(_) => Ok(default),
    }
}

fn parse_value<T>(name: &str, raw: &str) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    raw.trim()
        .parse()
        .map_err(|e| Error::Config(format!("Invalid value for {}: {}", name, e)))
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}

pub fn init_config() -> Result<()> {
    let config = Config::from_env()?;
    CONFIG
        .set(config)
        .map_err(|_| Error::Config("Configuration has already been initialized".to_string()))?;
    Ok(())
}

pub fn get_config() -> &'static Config {
    CONFIG
        .get()
        .expect("Configuration has not been initialized")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_value_reports_variable_name() {
        let err = parse_value::<u32>("PUBLIC_RPS", "fast").unwrap_err();
        assert!(err.to_string().contains("PUBLIC_RPS"));
    }

    #[test]
    fn parse_value_trims_whitespace() {
        let rps: u32 = parse_value("PUBLIC_RPS", " 25 ").unwrap();
        assert_eq!(rps, 25);
    }

    #[test]
    fn origin_list_skips_blanks() {
        assert_eq!(
            split_list(" https://a.example.com, ,https://b.example.com "),
            vec!["https://a.example.com", "https://b.example.com"]
        );
    }

    #[test]
    fn missing_optional_variable_uses_default() {
        let grace: i64 = get_env_parse_or("TRAINING_TEST_UNSET_GRACE_SECONDS", 30).unwrap();
        assert_eq!(grace, 30);
    }
}
