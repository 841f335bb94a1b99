use crate::error::{AppError, AppResult};
use crate::users::identifier::USERNAME_RE;

pub const USERNAME_MIN: usize = 5;
pub const USERNAME_MAX: usize = 30;
pub const NAME_MAX: usize = 30;
pub const PASSWORD_MIN: usize = 8;

const COMMON_PASSWORDS: &[&str] = &[
    "password",
    "password1",
    "password123",
    "12345678",
    "123456789",
    "1234567890",
    "qwerty123",
    "qwertyuiop",
    "iloveyou",
    "11111111",
    "abc12345",
    "letmein1",
    "welcome1",
    "admin123",
    "sunshine",
    "football",
    "baseball",
    "princess",
];

/// Why a username was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum UsernameError {
    #[error("Username must be at least 5 characters long")]
    TooShort,
    #[error("Username must be at most 30 characters long")]
    TooLong,
    #[error("Username cannot contain only numbers")]
    OnlyDigits,
    #[error("The first character of username must be a letter")]
    FirstCharNotLetter,
    #[error("The last character of username must be a letter or number")]
    LastCharInvalid,
    #[error("Username can be a letter, number, and underscores(_)")]
    InvalidCharacters,
}

pub fn validate_username(username: &str) -> Result<(), UsernameError> {
    let len = username.chars().count();
    if len < USERNAME_MIN {
        return Err(UsernameError::TooShort);
    }
    if len > USERNAME_MAX {
        return Err(UsernameError::TooLong);
    }
    if username.chars().all(|c| c.is_ascii_digit()) {
        return Err(UsernameError::OnlyDigits);
    }
    if !username.chars().next().is_some_and(|c| c.is_ascii_alphabetic()) {
        return Err(UsernameError::FirstCharNotLetter);
    }
    if !username.chars().last().is_some_and(|c| c.is_ascii_alphanumeric()) {
        return Err(UsernameError::LastCharInvalid);
    }
    if !USERNAME_RE.is_match(username) {
        return Err(UsernameError::InvalidCharacters);
    }
    Ok(())
}

pub fn validate_name(name: &str, which: &'static str) -> AppResult<()> {
    let len = name.chars().count();
    if len == 0 || len > NAME_MAX || !name.chars().all(char::is_alphabetic) {
        return Err(AppError::InvalidName(which));
    }
    Ok(())
}

/// Confirmation must match, then the password must pass the strength rules.
pub fn validate_new_password(password: &str, confirm: &str) -> AppResult<()> {
    if password != confirm {
        return Err(AppError::PasswordMismatch);
    }
    if password.chars().count() < PASSWORD_MIN {
        return Err(AppError::WeakPassword(
            "This password is too short. It must contain at least 8 characters",
        ));
    }
    if password.chars().all(|c| c.is_ascii_digit()) {
        return Err(AppError::WeakPassword("This password is entirely numeric"));
    }
    let lowered = password.to_lowercase();
    if COMMON_PASSWORDS.contains(&lowered.as_str()) {
        return Err(AppError::WeakPassword("This password is too common"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_well_formed_usernames() {
        for name in ["john_doe", "Alice2024", "a_b_c_d", "user_3fa9c1d2"] {
            assert_eq!(validate_username(name), Ok(()), "{name}");
        }
    }

    #[test]
    fn username_sub_reasons() {
        assert_eq!(validate_username("abc"), Err(UsernameError::TooShort));
        assert_eq!(
            validate_username(&"a".repeat(31)),
            Err(UsernameError::TooLong)
        );
        assert_eq!(validate_username("1234567"), Err(UsernameError::OnlyDigits));
        assert_eq!(
            validate_username("1user"),
            Err(UsernameError::FirstCharNotLetter)
        );
        assert_eq!(
            validate_username("_user"),
            Err(UsernameError::FirstCharNotLetter)
        );
        assert_eq!(validate_username("user_"), Err(UsernameError::LastCharInvalid));
        assert_eq!(
            validate_username("us-er1"),
            Err(UsernameError::InvalidCharacters)
        );
    }

    #[test]
    fn names_must_be_letters() {
        assert!(validate_name("Anna", "First name must contain only letters").is_ok());
        assert!(matches!(
            validate_name("Ann4", "First name must contain only letters"),
            Err(AppError::InvalidName(_))
        ));
        assert!(validate_name("", "Last name must contain only letters").is_err());
    }

    #[test]
    fn password_rules() {
        assert!(matches!(
            validate_new_password("Str0ng-pass", "Str0ng-pasS"),
            Err(AppError::PasswordMismatch)
        ));
        assert!(matches!(
            validate_new_password("short1", "short1"),
            Err(AppError::WeakPassword(_))
        ));
        assert!(matches!(
            validate_new_password("1234509876", "1234509876"),
            Err(AppError::WeakPassword(_))
        ));
        assert!(matches!(
            validate_new_password("Password123", "Password123"),
            Err(AppError::WeakPassword(_))
        ));
        assert!(validate_new_password("Str0ng-pass", "Str0ng-pass").is_ok());
    }
}
