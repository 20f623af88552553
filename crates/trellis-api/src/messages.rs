use axum::{
    Extension, Json,
    extract::{Path, Query, State, rejection::JsonRejection},
    http::StatusCode,
    response::IntoResponse,
};
use serde::Deserialize;

use trellis_access::{AccessError, engine};
use trellis_types::api::SendMessageRequest;
use trellis_types::models::{Actor, Message};

use crate::auth::AppState;
use crate::error::{ApiError, blocking, defer_rejection, parse_body};

const MAX_CONTENT_CHARS: usize = 4000;

#[derive(Debug, Deserialize)]
pub struct MessageQuery {
    #[serde(default = "default_limit")]
    pub limit: u32,
    /// Cursor-based pagination: pass the id of the oldest message from the
    /// previous page to fetch older messages.
    pub before: Option<i64>,
}

fn default_limit() -> u32 {
    50
}

/// GET /channels/{channel_id}/messages: readable by anyone who can view
/// the channel.
pub async fn get_messages(
    State(state): State<AppState>,
    Path(channel_id): Path<i64>,
    Query(query): Query<MessageQuery>,
    Extension(actor): Extension<Actor>,
) -> Result<Json<Vec<Message>>, ApiError> {
    let limit = query.limit.min(200);
    let before = query.before;

    let rows = blocking(&state, move |db| {
        let channel = engine::authorize_view(db, &actor, channel_id)?;
        Ok(db.get_messages(channel.id, limit, before)?)
    })
    .await?;

    Ok(Json(rows.into_iter().map(Message::from).collect()))
}

/// POST /channels/{channel_id}/messages
pub async fn send_message(
    State(state): State<AppState>,
    Path(channel_id): Path<i64>,
    Extension(actor): Extension<Actor>,
    body: Result<Json<SendMessageRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let body = defer_rejection(body);

    let row = blocking(&state, move |db| {
        let channel = engine::authorize_post(db, &actor, channel_id)?;
        let req = parse_body(body)?;

        let content = req.content.trim();
        if content.is_empty() || content.chars().count() > MAX_CONTENT_CHARS {
            return Err(AccessError::ValidationFailed(format!(
                "message content must be 1-{} characters",
                MAX_CONTENT_CHARS
            ))
            .into());
        }

        Ok(db.insert_message(channel.id, actor.id, content)?)
    })
    .await?;

    Ok((StatusCode::CREATED, Json(Message::from(row))))
}
