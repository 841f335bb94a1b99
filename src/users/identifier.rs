use lazy_static::lazy_static;
use phonenumber::Mode;
use regex::Regex;

use crate::error::{AppError, AppResult};
use crate::users::model::AuthType;

lazy_static! {
    static ref EMAIL_RE: Regex =
        Regex::new(r"^[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,7}$").unwrap();
    static ref PHONE_SHAPE_RE: Regex = Regex::new(r"^\+[0-9]+$").unwrap();
    pub(crate) static ref USERNAME_RE: Regex =
        Regex::new(r"^[a-zA-Z][a-zA-Z0-9_]{3,28}[a-zA-Z0-9]$").unwrap();
}

/// A normalised email or phone number.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Identifier {
    Email(String),
    Phone(String),
}

impl Identifier {
    pub fn channel(&self) -> AuthType {
        match self {
            Identifier::Email(_) => AuthType::Email,
            Identifier::Phone(_) => AuthType::Phone,
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Identifier::Email(v) | Identifier::Phone(v) => v,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Identifier::Email(_) => "email",
            Identifier::Phone(_) => "phone number",
        }
    }
}

/// What a login form's `user_input` turned out to be.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoginInput {
    Username(String),
    Contact(Identifier),
}

fn as_email(raw: &str) -> Option<String> {
    let v = raw.trim().to_lowercase();
    EMAIL_RE.is_match(&v).then_some(v)
}

fn as_phone(raw: &str) -> Option<String> {
    let v: String = raw
        .trim()
        .chars()
        .filter(|c| !matches!(c, ' ' | '-' | '.' | '(' | ')'))
        .collect();
    if !PHONE_SHAPE_RE.is_match(&v) {
        return None;
    }
    let number = phonenumber::parse(None, &v).ok()?;
    phonenumber::is_valid(&number).then(|| number.format().mode(Mode::E164).to_string())
}

/// Classify a signup / password-recovery identifier.
pub fn classify_identifier(raw: &str) -> AppResult<Identifier> {
    if let Some(email) = as_email(raw) {
        return Ok(Identifier::Email(email));
    }
    if let Some(phone) = as_phone(raw) {
        return Ok(Identifier::Phone(phone));
    }
    Err(AppError::InvalidIdentifier)
}

/// Classify a login identifier: username first, then email, then phone.
pub fn classify_login_input(raw: &str) -> AppResult<LoginInput> {
    let trimmed = raw.trim();
    if USERNAME_RE.is_match(trimmed) {
        return Ok(LoginInput::Username(trimmed.to_string()));
    }
    classify_identifier(trimmed)
        .map(LoginInput::Contact)
        .map_err(|_| AppError::UnrecognizedIdentifier)
}
