use async_trait::async_trait;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::error::is_unique_violation;
use crate::store::PgStore;
use crate::users::identifier::Identifier;
use crate::users::model::{AuthStatus, StatusAdvance, User};
use crate::verification::NewCode;

/// Fields for a freshly registered account.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub id: Uuid,
    pub username: String,
    pub identifier: Identifier,
    pub created_at: OffsetDateTime,
}

/// Result of `change-user`; the password is already hashed.
#[derive(Debug, Clone)]
pub struct ProfileUpdate {
    pub first_name: String,
    pub last_name: String,
    pub username: String,
    pub password_hash: String,
}

#[async_trait]
pub trait UserRepo: Send + Sync {
    async fn find_by_id(&self, id: Uuid) -> anyhow::Result<Option<User>>;

    async fn find_many(&self, ids: &[Uuid]) -> anyhow::Result<Vec<User>>;

    async fn find_by_username(&self, username: &str) -> anyhow::Result<Option<User>>;

    /// Emails compare case-insensitively, phone numbers exactly.
    async fn find_by_identifier(&self, identifier: &Identifier) -> anyhow::Result<Option<User>>;

    /// Insert the account and its first code atomically. `None` when the
    /// identifier or username is already taken.
    async fn register(&self, user: NewUser, code: &NewCode) -> anyhow::Result<Option<User>>;

    /// `None` when the username belongs to someone else.
    async fn update_profile(
        &self,
        id: Uuid,
        update: ProfileUpdate,
        advance: Option<StatusAdvance>,
    ) -> anyhow::Result<Option<User>>;

    async fn set_photo(
        &self,
        id: Uuid,
        photo_key: &str,
        advance: Option<StatusAdvance>,
    ) -> anyhow::Result<User>;

    async fn set_password(&self, id: Uuid, password_hash: &str) -> anyhow::Result<()>;

    async fn touch_last_login(&self, id: Uuid, at: OffsetDateTime) -> anyhow::Result<()>;
}

const USER_COLUMNS: &str = "id, username, first_name, last_name, email, phone_number, \
     password_hash, auth_type, auth_status, photo, last_login, created_at, updated_at";

/// `auth_status` only moves when the stored value still equals `advance.from`.
const ADVANCE_STATUS: &str = "auth_status = CASE WHEN auth_status = $2 THEN $3 ELSE auth_status END";

fn advance_binds(current: Option<StatusAdvance>) -> (Option<AuthStatus>, Option<AuthStatus>) {
    match current {
        Some(a) => (Some(a.from), Some(a.to)),
        None => (None, None),
    }
}

#[async_trait]
impl UserRepo for PgStore {
    async fn find_by_id(&self, id: Uuid) -> anyhow::Result<Option<User>> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1");
        let user = sqlx::query_as::<_, User>(&sql)
            .bind(id)
            .fetch_optional(&self.db)
            .await?;
        Ok(user)
    }

    async fn find_many(&self, ids: &[Uuid]) -> anyhow::Result<Vec<User>> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE id = ANY($1)");
        let users = sqlx::query_as::<_, User>(&sql)
            .bind(ids)
            .fetch_all(&self.db)
            .await?;
        Ok(users)
    }

    async fn find_by_username(&self, username: &str) -> anyhow::Result<Option<User>> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE username = $1");
        let user = sqlx::query_as::<_, User>(&sql)
            .bind(username)
            .fetch_optional(&self.db)
            .await?;
        Ok(user)
    }

    async fn find_by_identifier(&self, identifier: &Identifier) -> anyhow::Result<Option<User>> {
        let sql = match identifier {
            Identifier::Email(_) => {
                format!("SELECT {USER_COLUMNS} FROM users WHERE lower(email) = lower($1)")
            }
            Identifier::Phone(_) => {
                format!("SELECT {USER_COLUMNS} FROM users WHERE phone_number = $1")
            }
        };
        let user = sqlx::query_as::<_, User>(&sql)
            .bind(identifier.as_str())
            .fetch_optional(&self.db)
            .await?;
        Ok(user)
    }

    async fn register(&self, user: NewUser, code: &NewCode) -> anyhow::Result<Option<User>> {
        let (email, phone) = match &user.identifier {
            Identifier::Email(e) => (Some(e.as_str()), None),
            Identifier::Phone(p) => (None, Some(p.as_str())),
        };
        let mut tx = self.db.begin().await?;
        let sql = format!(
            r#"
            INSERT INTO users (id, username, email, phone_number, auth_type, auth_status, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $7)
            RETURNING {USER_COLUMNS}
            "#
        );
        let inserted = sqlx::query_as::<_, User>(&sql)
            .bind(user.id)
            .bind(&user.username)
            .bind(email)
            .bind(phone)
            .bind(user.identifier.channel())
            .bind(AuthStatus::New)
            .bind(user.created_at)
            .fetch_one(&mut *tx)
            .await;
        let created = match inserted {
            Ok(u) => u,
            Err(e) if is_unique_violation(&e) => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        sqlx::query(
            r#"
            INSERT INTO verification_codes (id, user_id, code, channel, expires_at, created_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(code.id)
        .bind(created.id)
        .bind(&code.code)
        .bind(code.channel)
        .bind(code.expires_at)
        .bind(code.created_at)
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;
        Ok(Some(created))
    }

    async fn update_profile(
        &self,
        id: Uuid,
        update: ProfileUpdate,
        advance: Option<StatusAdvance>,
    ) -> anyhow::Result<Option<User>> {
        let (from, to) = advance_binds(advance);
        let sql = format!(
            r#"
            UPDATE users
            SET first_name = $4, last_name = $5, username = $6, password_hash = $7,
                {ADVANCE_STATUS}, updated_at = now()
            WHERE id = $1
            RETURNING {USER_COLUMNS}
            "#
        );
        let updated = sqlx::query_as::<_, User>(&sql)
            .bind(id)
            .bind(from)
            .bind(to)
            .bind(&update.first_name)
            .bind(&update.last_name)
            .bind(&update.username)
            .bind(&update.password_hash)
            .fetch_one(&self.db)
            .await;
        match updated {
            Ok(u) => Ok(Some(u)),
            Err(e) if is_unique_violation(&e) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn set_photo(
        &self,
        id: Uuid,
        photo_key: &str,
        advance: Option<StatusAdvance>,
    ) -> anyhow::Result<User> {
        let (from, to) = advance_binds(advance);
        let sql = format!(
            r#"
            UPDATE users
            SET photo = $4, {ADVANCE_STATUS}, updated_at = now()
            WHERE id = $1
            RETURNING {USER_COLUMNS}
            "#
        );
        let user = sqlx::query_as::<_, User>(&sql)
            .bind(id)
            .bind(from)
            .bind(to)
            .bind(photo_key)
            .fetch_one(&self.db)
            .await?;
        Ok(user)
    }

    async fn set_password(&self, id: Uuid, password_hash: &str) -> anyhow::Result<()> {
        sqlx::query("UPDATE users SET password_hash = $2, updated_at = now() WHERE id = $1")
            .bind(id)
            .bind(password_hash)
            .execute(&self.db)
            .await?;
        Ok(())
    }

    async fn touch_last_login(&self, id: Uuid, at: OffsetDateTime) -> anyhow::Result<()> {
        sqlx::query("UPDATE users SET last_login = $2 WHERE id = $1")
            .bind(id)
            .bind(at)
            .execute(&self.db)
            .await?;
        Ok(())
    }
}
