use axum::{
    extract::{Request, State},
    http::header,
    middleware::Next,
    response::Response,
};
use jsonwebtoken::{DecodingKey, Validation, decode};

use trellis_access::AccessError;
use trellis_types::api::Claims;
use trellis_types::models::Actor;

use crate::auth::AppState;
use crate::error::{ApiError, blocking};

/// Extract and validate the JWT from the Authorization header and attach
/// the resulting [`Actor`] to the request.
///
/// The token only names the user. The role is read from the database on
/// every request, so a role change applies to tokens already issued and a
/// deleted account is unauthenticated.
pub async fn require_auth(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let token = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.strip_prefix("Bearer "))
        .ok_or(AccessError::Unauthenticated)?;

    let token_data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(state.jwt_secret.as_bytes()),
        &Validation::default(),
    )
    .map_err(|_| AccessError::Unauthenticated)?;

    let user_id = token_data.claims.sub;
    let actor = blocking(&state, move |db| {
        let user = db
            .get_user_by_id(user_id)?
            .ok_or(AccessError::Unauthenticated)?;
        Ok(Actor::new(user.id, user.role()?))
    })
    .await?;

    req.extensions_mut().insert(actor);
    Ok(next.run(req).await)
}
