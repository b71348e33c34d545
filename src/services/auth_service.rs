use crate::error::{Error, Result};
use crate::middleware::auth::Claims;
use crate::models::admin_user::AdminUser;
use crate::utils::crypto::{hash_password, verify_password};
use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{encode, EncodingKey, Header};
use sqlx::PgPool;

#[derive(Clone)]
pub struct AuthService {
    pool: PgPool,
    jwt_secret: String,
    ttl_hours: i64,
}

impl AuthService {
    pub fn new(pool: PgPool, jwt_secret: String, ttl_hours: i64) -> Self {
        Self {
            pool,
            jwt_secret,
            ttl_hours,
        }
    }

    pub async fn login(&self, email: &str, password: &str) -> Result<(String, DateTime<Utc>)> {
        let user = sqlx::query_as::<_, AdminUser>(
            r#"SELECT * FROM admin_users WHERE LOWER(email) = LOWER($1)"#,
        )
        .bind(email.trim())
        .fetch_optional(&self.pool)
        .await?;

        let Some(user) = user.filter(|u| u.is_active) else {
            tracing::warn!(email = %email, "admin login rejected: unknown or inactive user");
            return Err(Error::Unauthorized("Invalid email or password".into()));
        };

        let ok = verify_password(password, &user.password_hash)
            .map_err(|e| Error::Internal(format!("Stored password hash is invalid: {}", e)))?;
        if !ok {
            tracing::warn!(email = %email, "admin login rejected: wrong password");
            return Err(Error::Unauthorized("Invalid email or password".into()));
        }

        self.issue_token(&user)
    }

    pub fn issue_token(&self, user: &AdminUser) -> Result<(String, DateTime<Utc>)> {
        issue_token(&self.jwt_secret, &user.email, &user.role, self.ttl_hours)
    }

    /// Creates the configured admin account on first start.
    pub async fn ensure_admin(&self, email: &str, password: &str) -> Result<()> {
        let exists: bool = sqlx::query_scalar(
            r#"SELECT EXISTS(SELECT 1 FROM admin_users WHERE LOWER(email) = LOWER($1))"#,
        )
        .bind(email)
        .fetch_one(&self.pool)
        .await?;
        if exists {
            return Ok(());
        }

        let hash = hash_password(password)
            .map_err(|e| Error::Internal(format!("Failed to hash admin password: {}", e)))?;
        sqlx::query(
            r#"INSERT INTO admin_users (email, name, password_hash, role) VALUES ($1, $2, $3, 'admin')"#,
        )
        .bind(email.trim())
        .bind("Administrator")
        .bind(hash)
        .execute(&self.pool)
        .await?;
        tracing::info!(email = %email, "bootstrap admin account created");
        Ok(())
    }
}

pub fn issue_token(
    secret: &str,
    subject: &str,
    role: &str,
    ttl_hours: i64,
) -> Result<(String, DateTime<Utc>)> {
    let expires_at = Utc::now() + Duration::hours(ttl_hours);
    let claims = Claims {
        sub: subject.to_string(),
        exp: expires_at.timestamp() as usize,
        role: Some(role.to_string()),
    };
    let token = encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .map_err(|e| Error::Internal(format!("Failed to sign token: {}", e)))?;
    Ok((token, expires_at))
}

#[cfg(test)]
mod tests {
    use super::*;
    use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};

    #[test]
    fn issued_token_decodes_with_role() {
        let (token, expires_at) = issue_token("s3cret", "admin@example.com", "admin", 2).unwrap();
        let data = decode::<Claims>(
            &token,
            &DecodingKey::from_secret(b"s3cret"),
            &Validation::new(Algorithm::HS256),
        )
        .unwrap();
        assert_eq!(data.claims.sub, "admin@example.com");
        assert_eq!(data.claims.role.as_deref(), Some("admin"));
        assert_eq!(data.claims.exp, expires_at.timestamp() as usize);
    }

    #[test]
    fn token_signed_with_other_secret_is_rejected() {
        let (token, _) = issue_token("s3cret", "admin@example.com", "admin", 2).unwrap();
        let res = decode::<Claims>(
            &token,
            &DecodingKey::from_secret(b"other"),
            &Validation::new(Algorithm::HS256),
        );
        assert!(res.is_err());
    }
}
