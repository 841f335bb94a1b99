use async_trait::async_trait;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::store::PgStore;
use crate::users::StatusAdvance;
use crate::verification::model::NewCode;

#[async_trait]
pub trait CodeRepo: Send + Sync {
    /// Persist `code` unless the user already holds an unexpired, unconfirmed
    /// one. Returns `false` when a pending code blocked the insert.
    async fn issue(&self, user_id: Uuid, code: &NewCode, now: OffsetDateTime)
        -> anyhow::Result<bool>;

    /// Confirm every unexpired, unconfirmed code of the user equal to `code`
    /// and, if any matched, apply `advance`. Returns the number confirmed.
    async fn confirm(
        &self,
        user_id: Uuid,
        code: &str,
        now: OffsetDateTime,
        advance: Option<StatusAdvance>,
    ) -> anyhow::Result<u64>;

    /// Whether a code of this user was confirmed at or after `since`.
    async fn confirmed_since(&self, user_id: Uuid, since: OffsetDateTime) -> anyhow::Result<bool>;
}

#[async_trait]
impl CodeRepo for PgStore {
    async fn issue(
        &self,
        user_id: Uuid,
        code: &NewCode,
        now: OffsetDateTime,
    ) -> anyhow::Result<bool> {
        let mut tx = self.db.begin().await?;
        // Row lock on the owner serialises concurrent issue requests.
        sqlx::query("SELECT id FROM users WHERE id = $1 FOR UPDATE")
            .bind(user_id)
            .fetch_one(&mut *tx)
            .await?;
        let (pending,): (bool,) = sqlx::query_as(
            r#"
            SELECT EXISTS(
                SELECT 1 FROM verification_codes
                WHERE user_id = $1 AND is_confirmed = FALSE AND expires_at >= $2
            )
            "#,
        )
        .bind(user_id)
        .bind(now)
        .fetch_one(&mut *tx)
        .await?;
        if pending {
            tx.rollback().await?;
            return Ok(false);
        }
        sqlx::query(
            r#"
            INSERT INTO verification_codes (id, user_id, code, channel, expires_at, created_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(code.id)
        .bind(user_id)
        .bind(&code.code)
        .bind(code.channel)
        .bind(code.expires_at)
        .bind(code.created_at)
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;
        Ok(true)
    }

    async fn confirm(
        &self,
        user_id: Uuid,
        code: &str,
        now: OffsetDateTime,
        advance: Option<StatusAdvance>,
    ) -> anyhow::Result<u64> {
        let mut tx = self.db.begin().await?;
        let confirmed = sqlx::query(
            r#"
            UPDATE verification_codes
            SET is_confirmed = TRUE, confirmed_at = $3
            WHERE user_id = $1 AND code = $2 AND is_confirmed = FALSE AND expires_at >= $3
            "#,
        )
        .bind(user_id)
        .bind(code)
        .bind(now)
        .execute(&mut *tx)
        .await?
        .rows_affected();
        if confirmed > 0 {
            if let Some(a) = advance {
                sqlx::query(
                    "UPDATE users SET auth_status = $3, updated_at = now() \
                     WHERE id = $1 AND auth_status = $2",
                )
                .bind(user_id)
                .bind(a.from)
                .bind(a.to)
                .execute(&mut *tx)
                .await?;
            }
        }
        tx.commit().await?;
        Ok(confirmed)
    }

    async fn confirmed_since(&self, user_id: Uuid, since: OffsetDateTime) -> anyhow::Result<bool> {
        let (found,): (bool,) = sqlx::query_as(
            r#"
            SELECT EXISTS(
                SELECT 1 FROM verification_codes
                WHERE user_id = $1 AND is_confirmed = TRUE AND confirmed_at >= $2
            )
            "#,
        )
        .bind(user_id)
        .bind(since)
        .fetch_one(&self.db)
        .await?;
        Ok(found)
    }
}
