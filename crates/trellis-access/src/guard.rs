//! Privacy and membership changes.
//!
//! Admins and managers may reconfigure any channel. Everyone else may only
//! re-confirm a DM channel they take part in: private, with exactly its two
//! participants as members. `posting_restricted` is admin/manager-only.

use std::collections::BTreeSet;

use tracing::info;
use trellis_db::{ChannelFlags, Database, PrivacyWrite};
use trellis_types::api::UpdatePrivacyRequest;
use trellis_types::models::{Actor, Channel, ChannelKind};

use crate::dm;
use crate::engine::{can_manage, deny};
use crate::error::{AccessError, DenialReason, Result};

/// A privacy change that passed the rules, in the shape it is stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrivacyPlan {
    pub flags: ChannelFlags,
    /// Empty whenever the channel ends up public.
    pub members: BTreeSet<i64>,
}

/// Checks `request` against the rules without touching storage.
pub fn plan_privacy_change(
    actor: &Actor,
    channel: &Channel,
    request: &UpdatePrivacyRequest,
) -> Result<PrivacyPlan> {
    let requested: BTreeSet<i64> = request.member_ids.iter().copied().collect();

    if !can_manage(actor) {
        check_participant_change(actor, channel, request, &requested)?;
    }

    let members = if request.is_private {
        requested
    } else {
        // Going public discards the old restriction list.
        BTreeSet::new()
    };

    Ok(PrivacyPlan {
        flags: ChannelFlags {
            is_private: request.is_private,
            posting_restricted: request.posting_restricted,
        },
        members,
    })
}

/// Validates and stores a privacy change. Flags and the full membership
/// replace are written in one transaction.
pub fn apply_privacy_change(
    db: &Database,
    actor: &Actor,
    channel: &Channel,
    request: &UpdatePrivacyRequest,
) -> Result<PrivacyPlan> {
    let plan = plan_privacy_change(actor, channel, request)?;

    match db.apply_privacy(channel.id, plan.flags, &plan.members)? {
        PrivacyWrite::Applied => {}
        // Deleted after the caller loaded it.
        PrivacyWrite::ChannelMissing => return Err(AccessError::NotFound),
        PrivacyWrite::UnknownMembers(missing) => {
            return Err(AccessError::ValidationFailed(format!(
                "unknown member ids: {:?}",
                missing
            )));
        }
    }

    info!(
        "User {} set channel {} private={} ({} members)",
        actor.id,
        channel.id,
        plan.flags.is_private,
        plan.members.len()
    );
    Ok(plan)
}

/// Whether `actor` may change this channel's privacy at all, before the
/// request body is looked at: admins and managers always, otherwise only
/// the two participants of a DM channel.
pub fn authorize_privacy_change(actor: &Actor, channel: &Channel) -> Result<()> {
    if can_manage(actor) {
        return Ok(());
    }
    let kind = dm::resolve(&channel.name);
    if !kind.is_dm() {
        return Err(deny(actor, channel.id, DenialReason::NotPrivileged));
    }
    if !kind.is_participant(actor.id) {
        return Err(deny(actor, channel.id, DenialReason::NotDmParticipant));
    }
    Ok(())
}

fn check_participant_change(
    actor: &Actor,
    channel: &Channel,
    request: &UpdatePrivacyRequest,
    requested: &BTreeSet<i64>,
) -> Result<()> {
    authorize_privacy_change(actor, channel)?;
    let ChannelKind::DirectMessage { low, high } = dm::resolve(&channel.name) else {
        return Err(deny(actor, channel.id, DenialReason::NotPrivileged));
    };

    if !request.is_private {
        return Err(deny(actor, channel.id, DenialReason::DmMustStayPrivate));
    }
    if *requested != BTreeSet::from([low, high]) {
        return Err(deny(actor, channel.id, DenialReason::DmMembersFixed));
    }
    if request.posting_restricted.is_some() {
        return Err(deny(actor, channel.id, DenialReason::PostingRestrictedReserved));
    }
    Ok(())
}
