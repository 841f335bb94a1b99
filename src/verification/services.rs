use time::OffsetDateTime;
use tracing::{info, warn};

use crate::error::{AppError, AppResult};
use crate::notify::{CodePurpose, OutboundCode};
use crate::state::AppState;
use crate::users::{AuthType, Identifier, User};
use crate::verification::model::NewCode;

fn outbound(to: &Identifier, code: &NewCode, purpose: CodePurpose) -> OutboundCode {
    OutboundCode {
        channel: to.channel(),
        recipient: to.as_str().to_string(),
        purpose,
        code: code.code.clone(),
    }
}

/// Hand an already persisted code to the transport.
pub fn send_code(st: &AppState, to: &Identifier, code: &NewCode, purpose: CodePurpose) {
    st.dispatcher.dispatch(outbound(to, code, purpose));
}

/// Issue a fresh code for `user` on the channel of `to`, unless one is still
/// outstanding.
pub async fn issue_code(
    st: &AppState,
    user: &User,
    to: &Identifier,
    purpose: CodePurpose,
    now: OffsetDateTime,
) -> AppResult<()> {
    let code = NewCode::fresh(to.channel(), &st.config.codes, now);
    if !st.codes.issue(user.id, &code, now).await? {
        warn!(user_id = %user.id, "code requested while one is pending");
        return Err(AppError::CodeAlreadyPending);
    }
    info!(user_id = %user.id, channel = ?code.channel, purpose = ?purpose, "verification code issued");
    send_code(st, to, &code, purpose);
    Ok(())
}

/// Re-send a registration code to the address the account signed up with.
pub async fn resend_code(st: &AppState, user: &User, now: OffsetDateTime) -> AppResult<()> {
    let contact = user.contact().ok_or(AppError::InvalidIdentifier)?.to_string();
    let to = match user.auth_type {
        AuthType::Email => Identifier::Email(contact),
        AuthType::Phone => Identifier::Phone(contact),
    };
    issue_code(st, user, &to, CodePurpose::Registration, now).await
}

/// Confirm `submitted` for `user`. Already confirmed or expired codes never
/// match. Returns the user as stored afterwards.
pub async fn confirm_code(
    st: &AppState,
    user: &User,
    submitted: Option<&str>,
    now: OffsetDateTime,
) -> AppResult<User> {
    let code = submitted
        .map(str::trim)
        .filter(|c| !c.is_empty())
        .ok_or(AppError::MissingCode)?;
    let advance = user.auth_status.on_code_confirmed();
    let confirmed = st.codes.confirm(user.id, code, now, advance).await?;
    if confirmed == 0 {
        warn!(user_id = %user.id, "incorrect or expired verification code");
        return Err(AppError::InvalidOrExpiredCode);
    }
    info!(user_id = %user.id, confirmed, "verification code confirmed");
    st.users
        .find_by_id(user.id)
        .await?
        .ok_or(AppError::NotFound("User"))
}
