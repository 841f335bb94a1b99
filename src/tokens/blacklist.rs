use async_trait::async_trait;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::error::is_unique_violation;
use crate::store::PgStore;

/// Revoked refresh tokens, keyed by `jti`.
#[async_trait]
pub trait TokenBlacklist: Send + Sync {
    /// Returns `false` if the token was already revoked.
    async fn revoke(
        &self,
        jti: Uuid,
        user_id: Uuid,
        expires_at: OffsetDateTime,
    ) -> anyhow::Result<bool>;

    async fn is_revoked(&self, jti: Uuid) -> anyhow::Result<bool>;
}

#[async_trait]
impl TokenBlacklist for PgStore {
    async fn revoke(
        &self,
        jti: Uuid,
        user_id: Uuid,
        expires_at: OffsetDateTime,
    ) -> anyhow::Result<bool> {
        let res = sqlx::query(
            "INSERT INTO token_blacklist (jti, user_id, expires_at) VALUES ($1, $2, $3)",
        )
        .bind(jti)
        .bind(user_id)
        .bind(expires_at)
        .execute(&self.db)
        .await;
        match res {
            Ok(_) => Ok(true),
            Err(e) if is_unique_violation(&e) => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    async fn is_revoked(&self, jti: Uuid) -> anyhow::Result<bool> {
        let (found,): (bool,) =
            sqlx::query_as("SELECT EXISTS(SELECT 1 FROM token_blacklist WHERE jti = $1)")
                .bind(jti)
                .fetch_one(&self.db)
                .await?;
        Ok(found)
    }
}
