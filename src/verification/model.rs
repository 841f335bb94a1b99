use rand::Rng;
use serde::Serialize;
use sqlx::FromRow;
use time::{Duration, OffsetDateTime};
use uuid::Uuid;

use crate::config::CodeConfig;
use crate::users::AuthType;

pub const CODE_LEN: usize = 4;

/// A stored one-time code. Rows are never deleted; they expire in place.
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct VerificationCode {
    pub id: Uuid,
    pub user_id: Uuid,
    #[serde(skip_serializing)]
    pub code: String,
    pub channel: AuthType,
    pub expires_at: OffsetDateTime,
    pub is_confirmed: bool,
    pub confirmed_at: Option<OffsetDateTime>,
    pub created_at: OffsetDateTime,
}

impl VerificationCode {
    pub fn is_pending(&self, now: OffsetDateTime) -> bool {
        !self.is_confirmed && self.expires_at >= now
    }
}

/// A code about to be persisted.
#[derive(Debug, Clone)]
pub struct NewCode {
    pub id: Uuid,
    pub code: String,
    pub channel: AuthType,
    pub expires_at: OffsetDateTime,
    pub created_at: OffsetDateTime,
}

impl NewCode {
    pub fn fresh(channel: AuthType, cfg: &CodeConfig, now: OffsetDateTime) -> Self {
        let ttl = match channel {
            AuthType::Email => cfg.email_ttl_minutes,
            AuthType::Phone => cfg.phone_ttl_minutes,
        };
        Self {
            id: Uuid::new_v4(),
            code: generate_code(),
            channel,
            expires_at: now + Duration::minutes(ttl),
            created_at: now,
        }
    }
}

pub fn generate_code() -> String {
    let n: u32 = rand::thread_rng().gen_range(0..10u32.pow(CODE_LEN as u32));
    format!("{n:0width$}", width = CODE_LEN)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_are_fixed_length_digits() {
        for _ in 0..200 {
            let code = generate_code();
            assert_eq!(code.len(), CODE_LEN);
            assert!(code.chars().all(|c| c.is_ascii_digit()));
        }
    }

    #[test]
    fn ttl_depends_on_channel() {
        let cfg = CodeConfig::default();
        let now = OffsetDateTime::now_utc();
        let email = NewCode::fresh(AuthType::Email, &cfg, now);
        let phone = NewCode::fresh(AuthType::Phone, &cfg, now);
        assert_eq!(email.expires_at - now, Duration::minutes(5));
        assert_eq!(phone.expires_at - now, Duration::minutes(2));
    }
}
