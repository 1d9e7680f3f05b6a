use std::sync::Arc;

use axum::{async_trait, extract::FromRequestParts, http::request::Parts};

use crate::error::AppError;
use crate::services::events::Caller;
use crate::AppState;

pub const USER_ID_HEADER: &str = "x-user-id";
pub const MANAGE_EVENTS_HEADER: &str = "x-manage-events";

/// Caller identity forwarded by the command-handling front end.
///
/// `X-User-Id` is required; `X-Manage-Events: true` grants the moderator
/// permission over events and schedules created by others.
pub struct CallerIdentity(pub Caller);

fn header<'a>(parts: &'a Parts, name: &str) -> Option<&'a str> {
    parts.headers.get(name).and_then(|v| v.to_str().ok())
}

fn parse_flag(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "true" | "1" | "yes"
    )
}

#[async_trait]
impl FromRequestParts<Arc<AppState>> for CallerIdentity {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        _state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let raw = header(parts, USER_ID_HEADER).ok_or_else(|| {
            tracing::debug!("Missing {} header", USER_ID_HEADER);
            AppError::Unauthorized
        })?;
        let user_id: i64 = raw.trim().parse().map_err(|_| {
            AppError::BadRequest(format!("{} must be an integer", USER_ID_HEADER))
        })?;
        let can_manage_events = header(parts, MANAGE_EVENTS_HEADER)
            .map(parse_flag)
            .unwrap_or(false);

        Ok(CallerIdentity(Caller {
            user_id,
            can_manage_events,
        }))
    }
}
