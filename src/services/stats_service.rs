use crate::dto::admin_dto::DashboardStats;
use crate::error::Result;
use sqlx::{PgPool, Row};

#[derive(Clone)]
pub struct StatsService {
    pool: PgPool,
}

impl StatsService {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn dashboard(&self) -> Result<DashboardStats> {
        let row = sqlx::query(
            r#"
            SELECT
                (SELECT COUNT(*) FROM courses) AS courses,
                (SELECT COUNT(*) FROM access_codes WHERE is_active AND valid_until > NOW()) AS active_access_codes,
                (SELECT COUNT(*) FROM student_sessions) AS sessions,
                (SELECT COUNT(*) FROM test_attempts WHERE status = 'completed') AS completed_attempts,
                (SELECT COUNT(*) FROM test_attempts WHERE status = 'completed' AND passed) AS passed_attempts,
                (SELECT COUNT(*) FROM certificates) AS certificates_issued,
                (SELECT COUNT(*) FROM certificates WHERE NOT is_valid) AS certificates_revoked,
                (SELECT COUNT(*) FROM delivery_jobs WHERE status IN ('pending', 'processing')) AS pending_deliveries,
                (SELECT COUNT(*) FROM delivery_jobs WHERE status = 'failed') AS failed_deliveries
            "#,
        )
        .fetch_one(&self.pool)
        .await?;

        let completed_attempts: i64 = row.try_get("completed_attempts")?;
        let passed_attempts: i64 = row.try_get("passed_attempts")?;

        Ok(DashboardStats {
            courses: row.try_get("courses")?,
            active_access_codes: row.try_get("active_access_codes")?,
            sessions: row.try_get("sessions")?,
            completed_attempts,
            passed_attempts,
            pass_rate: pass_rate(passed_attempts, completed_attempts),
            certificates_issued: row.try_get("certificates_issued")?,
            certificates_revoked: row.try_get("certificates_revoked")?,
            pending_deliveries: row.try_get("pending_deliveries")?,
            failed_deliveries: row.try_get("failed_deliveries")?,
        })
    }
}

/// Percentage of completed attempts that passed, one decimal place.
pub fn pass_rate(passed: i64, completed: i64) -> f64 {
    if completed <= 0 {
        return 0.0;
    }
    ((passed as f64 / completed as f64) * 1000.0).round() / 10.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pass_rate_handles_no_attempts() {
        assert_eq!(pass_rate(0, 0), 0.0);
    }

    #[test]
    fn pass_rate_is_rounded_to_one_decimal() {
        assert_eq!(pass_rate(2, 3), 66.7);
        assert_eq!(pass_rate(3, 4), 75.0);
    }
}
