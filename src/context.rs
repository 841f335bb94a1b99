use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::users::AuthStatus;

/// The authenticated caller, passed explicitly into every operation that
/// needs to know who is acting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Actor {
    pub id: Uuid,
    pub status: AuthStatus,
}

impl Actor {
    /// Content writes need a finished registration.
    pub fn require_active(&self) -> AppResult<()> {
        if self.status.can_login() {
            Ok(())
        } else {
            Err(AppError::PermissionDenied(
                "Finish registration before posting",
            ))
        }
    }

    pub fn require_owner(&self, owner: Uuid) -> AppResult<()> {
        if self.id == owner {
            Ok(())
        } else {
            Err(AppError::PermissionDenied(
                "You do not have permission to perform this action",
            ))
        }
    }
}
