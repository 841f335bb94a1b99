mod blacklist;
mod claims;
pub(crate) mod extractors;
mod jwt;
pub mod services;

pub use blacklist::TokenBlacklist;
pub use claims::{Claims, TokenKind, TokenPair};
pub use extractors::{ActiveUser, AuthUser};
pub use jwt::JwtKeys;
