//! Accounts: identifiers, credentials, profile and registration status.

mod dto;
pub mod handlers;
mod identifier;
mod model;
pub mod password;
mod repo;
pub mod services;
mod validate;

pub use identifier::{classify_identifier, classify_login_input, Identifier, LoginInput};
pub use model::{AuthStatus, AuthType, StatusAdvance, User};
pub use repo::{NewUser, ProfileUpdate, UserRepo};
pub use validate::{validate_username, UsernameError};
