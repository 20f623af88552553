//! Access decisions for channel-scoped operations.
//!
//! Visibility is one rule used everywhere: admins and managers see every
//! channel, anyone sees a public channel, and a private channel is visible
//! to its members only. Reading and posting messages are gated on the same
//! rule.
//!
//! The `authorize_*` helpers are what route handlers call. They always
//! resolve the channel first (`NotFound`) and only then apply the rule
//! (`Forbidden`), so every route answers 404 before 403.

use tracing::warn;
use trellis_db::Database;
use trellis_types::models::{Actor, Channel, Role};

use crate::error::{AccessError, DenialReason, Result};

/// Role gate for admin/manager-only operations. Membership never helps.
pub fn can_manage(actor: &Actor) -> bool {
    actor.role.is_privileged()
}

/// Gate for admin/manager operations that are not tied to an existing
/// channel, such as creating one.
pub fn require_manager(actor: &Actor) -> Result<()> {
    if can_manage(actor) {
        return Ok(());
    }
    warn!(
        "Denied user {} ({}): {}",
        actor.id,
        actor.role,
        DenialReason::NotPrivileged
    );
    Err(AccessError::Forbidden(DenialReason::NotPrivileged))
}

/// Listing a channel's members uses the same gate as [`can_manage`].
pub fn can_list_members(actor: &Actor) -> bool {
    can_manage(actor)
}

pub fn can_view(db: &Database, actor: &Actor, channel: &Channel) -> Result<bool> {
    if actor.role.is_privileged() {
        return Ok(true);
    }
    if !channel.is_private {
        return Ok(true);
    }
    Ok(db.membership_exists(channel.id, actor.id)?)
}

/// Posting needs visibility, a role that may write, and privilege if the
/// channel is posting-restricted.
pub fn can_post(db: &Database, actor: &Actor, channel: &Channel) -> Result<bool> {
    Ok(posting_denial(db, actor, channel)?.is_none())
}

/// Channels `actor` may see, ordered by id. For non-privileged actors the
/// membership filter is part of the query itself.
pub fn visible_channels(db: &Database, actor: &Actor) -> Result<Vec<Channel>> {
    let rows = if actor.role.is_privileged() {
        db.list_all_channels()?
    } else {
        db.list_channels_visible_to_member(actor.id)?
    };
    Ok(rows.into_iter().map(Channel::from).collect())
}

pub fn load_channel(db: &Database, channel_id: i64) -> Result<Channel> {
    db.find_channel_by_id(channel_id)?
        .map(Channel::from)
        .ok_or(AccessError::NotFound)
}

pub fn authorize_view(db: &Database, actor: &Actor, channel_id: i64) -> Result<Channel> {
    let channel = load_channel(db, channel_id)?;
    if !can_view(db, actor, &channel)? {
        return Err(deny(actor, channel.id, DenialReason::NotVisible));
    }
    Ok(channel)
}

pub fn authorize_post(db: &Database, actor: &Actor, channel_id: i64) -> Result<Channel> {
    let channel = load_channel(db, channel_id)?;
    if let Some(reason) = posting_denial(db, actor, &channel)? {
        return Err(deny(actor, channel.id, reason));
    }
    Ok(channel)
}

pub fn authorize_manage(db: &Database, actor: &Actor, channel_id: i64) -> Result<Channel> {
    let channel = load_channel(db, channel_id)?;
    if !can_manage(actor) {
        return Err(deny(actor, channel.id, DenialReason::NotPrivileged));
    }
    Ok(channel)
}

pub fn authorize_list_members(db: &Database, actor: &Actor, channel_id: i64) -> Result<Channel> {
    let channel = load_channel(db, channel_id)?;
    if !can_list_members(actor) {
        return Err(deny(actor, channel.id, DenialReason::NotPrivileged));
    }
    Ok(channel)
}

fn posting_denial(db: &Database, actor: &Actor, channel: &Channel) -> Result<Option<DenialReason>> {
    if !can_view(db, actor, channel)? {
        return Ok(Some(DenialReason::NotVisible));
    }
    if actor.role == Role::Viewer {
        return Ok(Some(DenialReason::ReadOnlyRole));
    }
    if channel.posting_restricted && !can_manage(actor) {
        return Ok(Some(DenialReason::PostingRestricted));
    }
    Ok(None)
}

pub(crate) fn deny(actor: &Actor, channel_id: i64, reason: DenialReason) -> AccessError {
    warn!(
        "Denied user {} ({}) on channel {}: {}",
        actor.id, actor.role, channel_id, reason
    );
    AccessError::Forbidden(reason)
}
