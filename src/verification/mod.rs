//! One-time codes and the status transitions they drive.

mod model;
mod repo;
pub mod services;

pub use model::{generate_code, NewCode, VerificationCode, CODE_LEN};
pub use repo::CodeRepo;
