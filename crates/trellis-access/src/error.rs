//! Error types for access decisions.

use std::fmt;

use thiserror::Error;

/// Why a request was refused.
///
/// Only ever logged. Responses carry a bare "forbidden" so that a refused
/// caller learns nothing about DM participants or the rule that fired.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DenialReason {
    /// Private channel and the actor is neither privileged nor a member.
    NotVisible,
    /// Admin or manager role required.
    NotPrivileged,
    /// Only the two participants may touch a DM channel's settings.
    NotDmParticipant,
    /// A DM channel cannot be made public by its participants.
    DmMustStayPrivate,
    /// A DM channel's members are exactly its two participants.
    DmMembersFixed,
    /// `posting_restricted` is reserved for admins and managers.
    PostingRestrictedReserved,
    /// Viewers never post.
    ReadOnlyRole,
    /// The channel only accepts posts from admins and managers.
    PostingRestricted,
}

impl fmt::Display for DenialReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            DenialReason::NotVisible => "channel not visible to actor",
            DenialReason::NotPrivileged => "admin or manager role required",
            DenialReason::NotDmParticipant => "actor is not a DM participant",
            DenialReason::DmMustStayPrivate => "DM channel must stay private",
            DenialReason::DmMembersFixed => "DM membership must be exactly its participants",
            DenialReason::PostingRestrictedReserved => "posting_restricted is manager-only",
            DenialReason::ReadOnlyRole => "viewer role is read-only",
            DenialReason::PostingRestricted => "channel is posting-restricted",
        };
        f.write_str(s)
    }
}

/// Errors returned by the access engine and the privacy guard.
#[derive(Debug, Error)]
pub enum AccessError {
    /// No actor could be resolved for the request.
    #[error("authentication required")]
    Unauthenticated,

    /// The channel id does not exist.
    #[error("channel not found")]
    NotFound,

    /// The actor and channel exist but the rules refuse the operation.
    #[error("forbidden")]
    Forbidden(DenialReason),

    /// The request body is malformed or names unknown users.
    #[error("validation failed: {0}")]
    ValidationFailed(String),

    /// The channel registry failed underneath the decision.
    #[error("storage error: {0}")]
    Storage(#[from] anyhow::Error),
}

impl AccessError {
    pub fn denial_reason(&self) -> Option<DenialReason> {
        match self {
            AccessError::Forbidden(reason) => Some(*reason),
            _ => None,
        }
    }
}

/// Result type for access operations.
pub type Result<T> = std::result::Result<T, AccessError>;
