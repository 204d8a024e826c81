use crate::{
    api::models::users::{ActingAs, CurrentUser},
    db::handlers::users as user_handlers,
    errors::Error,
    types::{Operation, Permission, Resource, UserId},
    AppState,
};
use axum::{
    extract::{FromRequestParts, OptionalFromRequestParts},
    http::request::Parts,
};

pub mod permissions;

/// Trusted proxy header carrying the authenticated username. The reverse
/// proxy in front of the service strips any client-supplied value.
pub const USER_HEADER: &str = "x-pointctl-user";

/// Optional header letting staff act on behalf of another user.
pub const ACTING_FOR_HEADER: &str = "x-pointctl-acting-for";

impl FromRequestParts<AppState> for CurrentUser {
    type Rejection = Error;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let username = parts
            .headers
            .get(USER_HEADER)
            .and_then(|value| value.to_str().ok())
            .ok_or_else(|| Error::Unauthorized {
                message: "Missing authentication header".to_string(),
            })?;

        let mut conn = state.db.acquire().await.map_err(crate::db::errors::DbError::from)?;
        let user = user_handlers::get_user_by_username(&mut conn, username)
            .await?
            .ok_or_else(|| Error::Unauthorized {
                message: format!("Unknown user: {username}"),
            })?;

        Ok(user.into())
    }
}

/// Impersonation context. Only resolved when the header is present; the
/// requester must be staff and the target must exist.
impl OptionalFromRequestParts<AppState> for ActingAs {
    type Rejection = Error;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Option<Self>, Self::Rejection> {
        let Some(raw) = parts.headers.get(ACTING_FOR_HEADER) else {
            return Ok(None);
        };
        let raw = raw.to_str().map_err(|_| Error::BadRequest {
            message: "Malformed acting-for header".to_string(),
        })?;
        let target: UserId = raw.parse().map_err(|_| Error::BadRequest {
            message: format!("Acting-for header is not a user id: {raw}"),
        })?;

        let current_user =
            <CurrentUser as FromRequestParts<AppState>>::from_request_parts(parts, state).await?;
        if !current_user.role.is_staff() {
            return Err(Error::InsufficientPermissions {
                required: Permission::Allow(Resource::Points, Operation::UpdateAll),
                action: Operation::UpdateAll,
                resource: "Points".to_string(),
            });
        }

        let mut conn = state.db.acquire().await.map_err(crate::db::errors::DbError::from)?;
        user_handlers::get_user_by_id(&mut conn, target)
            .await?
            .ok_or_else(|| Error::NotFound {
                resource: "user".to_string(),
                id: target.to_string(),
            })?;

        Ok(Some(ActingAs { user_id: target }))
    }
}
