//! Database row types. These map directly to SQLite rows and are kept
//! distinct from the trellis-types API models.

use chrono::{DateTime, NaiveDateTime, Utc};
use tracing::warn;
use trellis_types::models::{Channel, Message, Role, User};

pub struct UserRow {
    pub id: i64,
    pub username: String,
    pub password: String,
    pub role: String,
    pub created_at: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelRow {
    pub id: i64,
    pub name: String,
    pub is_private: bool,
    pub posting_restricted: bool,
    pub created_at: String,
}

pub struct MessageRow {
    pub id: i64,
    pub channel_id: i64,
    pub author_id: i64,
    pub author_username: String,
    pub content: String,
    pub created_at: String,
}

/// Flag update applied together with a membership replace.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChannelFlags {
    pub is_private: bool,
    /// `None` keeps the stored value.
    pub posting_restricted: Option<bool>,
}

/// Outcome of [`Database::apply_privacy`](crate::Database::apply_privacy).
/// The refusals are checked inside the write transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PrivacyWrite {
    Applied,
    ChannelMissing,
    UnknownMembers(Vec<i64>),
}

/// Outcome of [`Database::create_unique_channel`](crate::Database::create_unique_channel).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelCreate {
    Created(ChannelRow),
    NameTaken,
    UnknownMembers(Vec<i64>),
}

impl UserRow {
    pub fn role(&self) -> anyhow::Result<Role> {
        Ok(self.role.parse::<Role>()?)
    }

    pub fn into_user(self) -> anyhow::Result<User> {
        let role = self.role()?;
        Ok(User {
            id: self.id,
            created_at: parse_timestamp(&self.created_at),
            username: self.username,
            role,
        })
    }
}

impl From<ChannelRow> for Channel {
    fn from(row: ChannelRow) -> Self {
        Channel {
            id: row.id,
            created_at: parse_timestamp(&row.created_at),
            name: row.name,
            is_private: row.is_private,
            posting_restricted: row.posting_restricted,
        }
    }
}

impl From<MessageRow> for Message {
    fn from(row: MessageRow) -> Self {
        Message {
            id: row.id,
            channel_id: row.channel_id,
            author_id: row.author_id,
            created_at: parse_timestamp(&row.created_at),
            author_username: row.author_username,
            content: row.content,
        }
    }
}

/// SQLite stores timestamps as "YYYY-MM-DD HH:MM:SS" without timezone.
/// Parse as naive UTC; RFC 3339 is accepted too.
pub fn parse_timestamp(raw: &str) -> DateTime<Utc> {
    raw.parse::<DateTime<Utc>>()
        .or_else(|_| {
            NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S").map(|ndt| ndt.and_utc())
        })
        .unwrap_or_else(|e| {
            warn!("Corrupt timestamp '{}': {}", raw, e);
            DateTime::default()
        })
}
