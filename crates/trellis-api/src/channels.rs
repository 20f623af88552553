use std::collections::BTreeSet;

use axum::{
    Extension, Json,
    extract::{Path, State, rejection::JsonRejection},
    http::StatusCode,
    response::IntoResponse,
};
use tracing::info;

use trellis_access::{AccessError, dm, engine, guard};
use trellis_db::ChannelCreate;
use trellis_types::api::{
    ChannelResponse, CreateChannelRequest, MembersResponse, OpenDmRequest, UpdatePrivacyRequest,
};
use trellis_types::models::{Actor, Channel};

use crate::auth::AppState;
use crate::error::{ApiError, blocking, defer_rejection, parse_body};

const MAX_CHANNEL_NAME_LEN: usize = 64;

fn channel_response(channel: Channel) -> ChannelResponse {
    let kind = dm::resolve(&channel.name);
    ChannelResponse { channel, kind }
}

/// GET /channels: every channel the actor may view.
pub async fn list_channels(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
) -> Result<Json<Vec<ChannelResponse>>, ApiError> {
    let channels = blocking(&state, move |db| Ok(engine::visible_channels(db, &actor)?)).await?;
    Ok(Json(channels.into_iter().map(channel_response).collect()))
}

/// GET /channels/{channel_id}
pub async fn get_channel(
    State(state): State<AppState>,
    Path(channel_id): Path<i64>,
    Extension(actor): Extension<Actor>,
) -> Result<Json<ChannelResponse>, ApiError> {
    let channel =
        blocking(&state, move |db| Ok(engine::authorize_view(db, &actor, channel_id)?)).await?;
    Ok(Json(channel_response(channel)))
}

/// POST /channels: admin/manager only. DM channels are opened through
/// `POST /dms`, so a DM-pattern name is refused here.
pub async fn create_channel(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    body: Result<Json<CreateChannelRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    engine::require_manager(&actor)?;
    let req = parse_body(defer_rejection(body))?;

    let name = req.name.trim().to_string();
    if name.is_empty() || name.chars().count() > MAX_CHANNEL_NAME_LEN {
        return Err(AccessError::ValidationFailed(format!(
            "channel name must be 1-{} characters",
            MAX_CHANNEL_NAME_LEN
        ))
        .into());
    }
    if dm::is_dm_name(&name) {
        return Err(AccessError::ValidationFailed("channel name is reserved for DMs".into()).into());
    }

    let members: BTreeSet<i64> = if req.is_private {
        req.member_ids.iter().copied().collect()
    } else {
        BTreeSet::new()
    };

    let channel = blocking(&state, move |db| {
        match db.create_unique_channel(&name, req.is_private, req.posting_restricted, &members)? {
            ChannelCreate::Created(row) => Ok(Channel::from(row)),
            ChannelCreate::NameTaken => Err(ApiError::Conflict("channel name already taken".into())),
            ChannelCreate::UnknownMembers(missing) => Err(AccessError::ValidationFailed(format!(
                "unknown member ids: {:?}",
                missing
            ))
            .into()),
        }
    })
    .await?;

    info!(
        "User {} created channel {} '{}' (private={})",
        actor.id, channel.id, channel.name, channel.is_private
    );
    Ok((StatusCode::CREATED, Json(channel_response(channel))))
}

/// DELETE /channels/{channel_id}: admin/manager only.
pub async fn delete_channel(
    State(state): State<AppState>,
    Path(channel_id): Path<i64>,
    Extension(actor): Extension<Actor>,
) -> Result<StatusCode, ApiError> {
    blocking(&state, move |db| {
        let channel = engine::authorize_manage(db, &actor, channel_id)?;
        if !db.delete_channel(channel.id)? {
            return Err(AccessError::NotFound.into());
        }
        info!("User {} deleted channel {} '{}'", actor.id, channel.id, channel.name);
        Ok(())
    })
    .await?;

    Ok(StatusCode::NO_CONTENT)
}

/// GET /channels/{channel_id}/members: admin/manager only.
pub async fn list_members(
    State(state): State<AppState>,
    Path(channel_id): Path<i64>,
    Extension(actor): Extension<Actor>,
) -> Result<Json<MembersResponse>, ApiError> {
    let member_ids = blocking(&state, move |db| {
        let channel = engine::authorize_list_members(db, &actor, channel_id)?;
        Ok(db.list_member_ids(channel.id)?)
    })
    .await?;

    Ok(Json(MembersResponse {
        channel_id,
        member_ids: member_ids.into_iter().collect(),
    }))
}

/// PUT /channels/{channel_id}/privacy
///
/// The body is only judged once the actor is known to be allowed to change
/// this channel at all, so an unparseable body from an outsider is still a
/// 403.
pub async fn update_privacy(
    State(state): State<AppState>,
    Path(channel_id): Path<i64>,
    Extension(actor): Extension<Actor>,
    body: Result<Json<UpdatePrivacyRequest>, JsonRejection>,
) -> Result<StatusCode, ApiError> {
    let body = defer_rejection(body);
    blocking(&state, move |db| {
        let channel = engine::load_channel(db, channel_id)?;
        guard::authorize_privacy_change(&actor, &channel)?;
        let req = parse_body(body)?;
        guard::apply_privacy_change(db, &actor, &channel, &req)?;
        Ok(())
    })
    .await?;

    Ok(StatusCode::NO_CONTENT)
}

/// POST /dms: open (or fetch) the DM channel between the actor and
/// another user.
pub async fn open_dm(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    body: Result<Json<OpenDmRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let req = parse_body(defer_rejection(body))?;
    if req.user_id == actor.id {
        return Err(AccessError::ValidationFailed("cannot open a DM with yourself".into()).into());
    }

    let (channel, created) = blocking(&state, move |db| {
        if db.get_user_by_id(req.user_id)?.is_none() {
            return Err(AccessError::ValidationFailed("unknown user".into()).into());
        }
        let low = actor.id.min(req.user_id);
        let high = actor.id.max(req.user_id);
        let (row, created) = db.open_dm_channel(&dm::dm_channel_name(low, high), low, high)?;
        Ok((Channel::from(row), created))
    })
    .await?;

    let status = if created {
        info!("Opened DM channel {} for users {} and {}", channel.id, actor.id, req.user_id);
        StatusCode::CREATED
    } else {
        StatusCode::OK
    };
    Ok((status, Json(channel_response(channel))))
}
