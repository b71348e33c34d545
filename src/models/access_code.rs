use crate::error::{Error, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct AccessCode {
    pub id: Uuid,
    pub code: String,
    pub course_id: Uuid,
    pub company_id: Option<Uuid>,
    pub valid_until: DateTime<Utc>,
    pub max_participants: Option<i32>,
    pub unlimited_participants: bool,
    pub usage_count: i32,
    pub requires_theory: bool,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl AccessCode {
    pub fn has_capacity(&self) -> bool {
        if self.unlimited_participants {
            return true;
        }
        self.max_participants
            .map(|max| self.usage_count < max)
            .unwrap_or(false)
    }

    pub fn remaining_slots(&self) -> Option<i32> {
        if self.unlimited_participants {
            return None;
        }
        Some(
            self.max_participants
                .map(|max| (max - self.usage_count).max(0))
                .unwrap_or(0),
        )
    }

    /// Checks whether a new participant may redeem this code at `now`.
    /// Order matters: inactive codes report `CodeInactive` even when expired.
    pub fn check_redeemable(&self, now: DateTime<Utc>) -> Result<()> {
        self.check_usable(now)?;
        if !self.has_capacity() {
            return Err(Error::CapacityExceeded);
        }
        Ok(())
    }

    /// Checks that an already-admitted participant may still use the code.
    pub fn check_usable(&self, now: DateTime<Utc>) -> Result<()> {
        if !self.is_active {
            return Err(Error::CodeInactive);
        }
        if self.valid_until <= now {
            return Err(Error::CodeExpired);
        }
        Ok(())
    }
}

/// Codes are matched case-insensitively and stored upper-case.
pub fn normalize_code(raw: &str) -> String {
    raw.trim().to_uppercase()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn code(max: Option<i32>, unlimited: bool, used: i32) -> AccessCode {
        let now = Utc::now();
        AccessCode {
            id: Uuid::new_v4(),
            code: "SAFETY24".into(),
            course_id: Uuid::new_v4(),
            company_id: None,
            valid_until: now + Duration::days(7),
            max_participants: max,
            unlimited_participants: unlimited,
            usage_count: used,
            requires_theory: true,
            is_active: true,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn full_limited_code_is_rejected() {
        let c = code(Some(5), false, 5);
        assert!(matches!(
            c.check_redeemable(Utc::now()),
            Err(Error::CapacityExceeded)
        ));
        assert_eq!(c.remaining_slots(), Some(0));
    }

    #[test]
    fn last_slot_can_still_be_taken() {
        let c = code(Some(5), false, 4);
        assert!(c.check_redeemable(Utc::now()).is_ok());
        assert_eq!(c.remaining_slots(), Some(1));
    }

    #[test]
    fn unlimited_code_ignores_usage() {
        let c = code(None, true, 10_000);
        assert!(c.check_redeemable(Utc::now()).is_ok());
        assert_eq!(c.remaining_slots(), None);
    }

    #[test]
    fn expired_code_is_rejected() {
        let mut c = code(Some(5), false, 0);
        c.valid_until = Utc::now() - Duration::minutes(1);
        assert!(matches!(c.check_redeemable(Utc::now()), Err(Error::CodeExpired)));
    }

    #[test]
    fn expiry_boundary_is_exclusive() {
        let mut c = code(Some(5), false, 0);
        let now = Utc::now();
        c.valid_until = now;
        assert!(matches!(c.check_redeemable(now), Err(Error::CodeExpired)));
    }

    #[test]
    fn inactive_wins_over_expired_and_full() {
        let mut c = code(Some(1), false, 1);
        c.is_active = false;
        c.valid_until = Utc::now() - Duration::days(1);
        assert!(matches!(c.check_redeemable(Utc::now()), Err(Error::CodeInactive)));
    }

    #[test]
    fn admitted_participant_can_use_full_code() {
        let c = code(Some(1), false, 1);
        assert!(c.check_usable(Utc::now()).is_ok());
    }

    #[test]
    fn normalize_trims_and_uppercases() {
        assert_eq!(normalize_code("  safety24 \n"), "SAFETY24");
    }
}
