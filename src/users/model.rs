use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use time::OffsetDateTime;
use uuid::Uuid;

/// Channel the account was registered through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "auth_type", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum AuthType {
    Email,
    Phone,
}

/// Registration progress. Ordered: a status only ever moves forward.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, sqlx::Type,
)]
#[sqlx(type_name = "auth_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum AuthStatus {
    New,
    CodeVerified,
    Done,
    PhotoDone,
}

/// A forward move in the status lifecycle, applied only if the stored status
/// still equals `from`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusAdvance {
    pub from: AuthStatus,
    pub to: AuthStatus,
}

impl AuthStatus {
    pub fn registration_incomplete(self) -> bool {
        matches!(self, AuthStatus::New | AuthStatus::CodeVerified)
    }

    pub fn can_login(self) -> bool {
        matches!(self, AuthStatus::Done | AuthStatus::PhotoDone)
    }

    fn advance(self, from: AuthStatus, to: AuthStatus) -> Option<StatusAdvance> {
        (self == from).then_some(StatusAdvance { from, to })
    }

    pub fn on_code_confirmed(self) -> Option<StatusAdvance> {
        self.advance(AuthStatus::New, AuthStatus::CodeVerified)
    }

    pub fn on_profile_completed(self) -> Option<StatusAdvance> {
        self.advance(AuthStatus::CodeVerified, AuthStatus::Done)
    }

    pub fn on_photo_set(self) -> Option<StatusAdvance> {
        self.advance(AuthStatus::Done, AuthStatus::PhotoDone)
    }
}

/// User record in the database.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct User {
    pub id: Uuid,
    pub username: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub email: Option<String>,
    pub phone_number: Option<String>,
    #[serde(skip_serializing)]
    pub password_hash: Option<String>, // Argon2 hash, unset until change-user
    pub auth_type: AuthType,
    pub auth_status: AuthStatus,
    pub photo: Option<String>, // object storage key
    pub last_login: Option<OffsetDateTime>,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

impl User {
    pub fn full_name(&self) -> String {
        let first = self.first_name.as_deref().unwrap_or_default();
        let last = self.last_name.as_deref().unwrap_or_default();
        format!("{first} {last}").trim().to_string()
    }

    /// Address the account's codes are delivered to.
    pub fn contact(&self) -> Option<&str> {
        match self.auth_type {
            AuthType::Email => self.email.as_deref(),
            AuthType::Phone => self.phone_number.as_deref(),
        }
    }
}
