use axum::{
    Extension, Json,
    extract::{Path, State, rejection::JsonRejection},
};
use tracing::{info, warn};

use trellis_access::{AccessError, DenialReason};
use trellis_types::api::SetRoleRequest;
use trellis_types::models::{Actor, Role, User};

use crate::auth::AppState;
use crate::error::{ApiError, blocking, defer_rejection, parse_body};

/// PUT /users/{user_id}/role: admin-only role assignment.
///
/// Non-admins are refused before the body is read or the user looked up,
/// so they cannot probe user ids.
pub async fn set_role(
    State(state): State<AppState>,
    Path(user_id): Path<i64>,
    Extension(actor): Extension<Actor>,
    body: Result<Json<SetRoleRequest>, JsonRejection>,
) -> Result<Json<User>, ApiError> {
    if actor.role != Role::Admin {
        warn!("Denied user {} ({}) role change on user {}", actor.id, actor.role, user_id);
        return Err(AccessError::Forbidden(DenialReason::NotPrivileged).into());
    }
    let req = parse_body(defer_rejection(body))?;

    let user = blocking(&state, move |db| {
        if !db.set_user_role(user_id, req.role)? {
            return Err(ApiError::NotFound("user not found".into()));
        }
        let row = db
            .get_user_by_id(user_id)?
            .ok_or_else(|| ApiError::NotFound("user not found".into()))?;
        Ok(row.into_user()?)
    })
    .await?;

    info!("User {} set role of user {} to {}", actor.id, user.id, user.role);
    Ok(Json(user))
}
