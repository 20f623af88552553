use std::collections::BTreeSet;

use crate::Database;
use crate::models::{ChannelCreate, ChannelFlags, ChannelRow, MessageRow, PrivacyWrite, UserRow};
use anyhow::Result;
use rusqlite::{Connection, Row, TransactionBehavior};
use trellis_types::models::Role;

const CHANNEL_COLUMNS: &str = "id, name, is_private, posting_restricted, created_at";

impl Database {
    // -- Users --

    pub fn create_user(&self, username: &str, password_hash: &str, role: Role) -> Result<i64> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO users (username, password, role) VALUES (?1, ?2, ?3)",
                (username, password_hash, role.as_str()),
            )?;
            Ok(conn.last_insert_rowid())
        })
    }

    /// Registers a new account. The very first account becomes an admin,
    /// every later one a member. Count and insert share one transaction.
    pub fn register_user(&self, username: &str, password_hash: &str) -> Result<(i64, Role)> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
            let existing: i64 = tx.query_row("SELECT COUNT(*) FROM users", [], |row| row.get(0))?;
            let role = if existing == 0 { Role::Admin } else { Role::Member };
            tx.execute(
                "INSERT INTO users (username, password, role) VALUES (?1, ?2, ?3)",
                (username, password_hash, role.as_str()),
            )?;
            let id = tx.last_insert_rowid();
            tx.commit()?;
            Ok((id, role))
        })
    }

    pub fn get_user_by_username(&self, username: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| {
            query_user(
                conn,
                "SELECT id, username, password, role, created_at FROM users WHERE username = ?1",
                rusqlite::params![username],
            )
        })
    }

    pub fn get_user_by_id(&self, id: i64) -> Result<Option<UserRow>> {
        self.with_conn(|conn| {
            query_user(
                conn,
                "SELECT id, username, password, role, created_at FROM users WHERE id = ?1",
                rusqlite::params![id],
            )
        })
    }

    /// Returns false if no such user exists.
    pub fn set_user_role(&self, id: i64, role: Role) -> Result<bool> {
        self.with_conn(|conn| {
            let changed = conn.execute(
                "UPDATE users SET role = ?1 WHERE id = ?2",
                rusqlite::params![role.as_str(), id],
            )?;
            Ok(changed > 0)
        })
    }

    // -- Channels --

    /// Inserts a channel and its initial membership in one transaction.
    pub fn create_channel(
        &self,
        name: &str,
        is_private: bool,
        posting_restricted: bool,
        member_ids: &BTreeSet<i64>,
    ) -> Result<ChannelRow> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
            let row = insert_channel(&tx, name, is_private, posting_restricted, member_ids)?;
            tx.commit()?;
            Ok(row)
        })
    }

    /// Like [`Database::create_channel`], but the name and member checks run
    /// inside the insert transaction, so a concurrent writer cannot slip a
    /// duplicate name or a deleted user in between check and insert.
    pub fn create_unique_channel(
        &self,
        name: &str,
        is_private: bool,
        posting_restricted: bool,
        member_ids: &BTreeSet<i64>,
    ) -> Result<ChannelCreate> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
            if query_channel_by_name(&tx, name)?.is_some() {
                return Ok(ChannelCreate::NameTaken);
            }
            let missing = missing_user_ids(&tx, member_ids)?;
            if !missing.is_empty() {
                return Ok(ChannelCreate::UnknownMembers(missing));
            }
            let row = insert_channel(&tx, name, is_private, posting_restricted, member_ids)?;
            tx.commit()?;
            Ok(ChannelCreate::Created(row))
        })
    }

    pub fn find_channel_by_id(&self, id: i64) -> Result<Option<ChannelRow>> {
        self.with_conn(|conn| query_channel_by_id(conn, id))
    }

    pub fn find_channel_by_name(&self, name: &str) -> Result<Option<ChannelRow>> {
        self.with_conn(|conn| query_channel_by_name(conn, name))
    }

    /// Membership and messages go with the channel (ON DELETE CASCADE).
    pub fn delete_channel(&self, id: i64) -> Result<bool> {
        self.with_conn(|conn| {
            let deleted = conn.execute("DELETE FROM channels WHERE id = ?1", [id])?;
            Ok(deleted > 0)
        })
    }

    pub fn list_all_channels(&self) -> Result<Vec<ChannelRow>> {
        self.with_conn(|conn| {
            let sql = format!("SELECT {} FROM channels ORDER BY id", CHANNEL_COLUMNS);
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map([], channel_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// Public channels plus the private ones `user_id` is a member of.
    /// The membership filter runs inside the query so inaccessible private
    /// channels never leave the database.
    pub fn list_channels_visible_to_member(&self, user_id: i64) -> Result<Vec<ChannelRow>> {
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT {} FROM channels c
                 WHERE c.is_private = 0
                    OR EXISTS (
                        SELECT 1 FROM channel_members m
                        WHERE m.channel_id = c.id AND m.user_id = ?1
                    )
                 ORDER BY c.id",
                CHANNEL_COLUMNS
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map([user_id], channel_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    // -- Membership --

    pub fn membership_exists(&self, channel_id: i64, user_id: i64) -> Result<bool> {
        self.with_conn(|conn| {
            let mut stmt = conn
                .prepare_cached("SELECT 1 FROM channel_members WHERE channel_id = ?1 AND user_id = ?2")?;
            Ok(stmt.exists([channel_id, user_id])?)
        })
    }

    pub fn list_member_ids(&self, channel_id: i64) -> Result<BTreeSet<i64>> {
        self.with_conn(|conn| {
            let mut stmt =
                conn.prepare("SELECT user_id FROM channel_members WHERE channel_id = ?1")?;
            let ids = stmt
                .query_map([channel_id], |row| row.get::<_, i64>(0))?
                .collect::<std::result::Result<BTreeSet<_>, _>>()?;
            Ok(ids)
        })
    }

    /// Updates the channel's flags and replaces its whole membership with
    /// `member_ids` as one unit. On any failure nothing is changed, so a
    /// reader never sees new flags with old members (or an empty member set
    /// on a private channel mid-replace). Replaying the same call yields the
    /// same final state. A missing channel or unknown member ids are
    /// reported, not written.
    pub fn apply_privacy(
        &self,
        channel_id: i64,
        flags: ChannelFlags,
        member_ids: &BTreeSet<i64>,
    ) -> Result<PrivacyWrite> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
            if query_channel_by_id(&tx, channel_id)?.is_none() {
                return Ok(PrivacyWrite::ChannelMissing);
            }
            let missing = missing_user_ids(&tx, member_ids)?;
            if !missing.is_empty() {
                return Ok(PrivacyWrite::UnknownMembers(missing));
            }
            update_channel_flags(&tx, channel_id, flags)?;
            replace_membership(&tx, channel_id, member_ids)?;
            tx.commit()?;
            Ok(PrivacyWrite::Applied)
        })
    }

    /// Returns the DM channel called `name`, creating it (private, members
    /// `low` and `high`) if it does not exist yet. The bool is true when the
    /// channel was created by this call.
    pub fn open_dm_channel(&self, name: &str, low: i64, high: i64) -> Result<(ChannelRow, bool)> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
            if let Some(existing) = query_channel_by_name(&tx, name)? {
                return Ok((existing, false));
            }
            let members = BTreeSet::from([low, high]);
            let row = insert_channel(&tx, name, true, false, &members)?;
            tx.commit()?;
            Ok((row, true))
        })
    }

    // -- Messages --

    pub fn insert_message(&self, channel_id: i64, author_id: i64, content: &str) -> Result<MessageRow> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO messages (channel_id, author_id, content) VALUES (?1, ?2, ?3)",
                rusqlite::params![channel_id, author_id, content],
            )?;
            let id = conn.last_insert_rowid();
            let mut stmt = conn.prepare(
                "SELECT m.id, m.channel_id, m.author_id, u.username, m.content, m.created_at
                 FROM messages m
                 LEFT JOIN users u ON m.author_id = u.id
                 WHERE m.id = ?1",
            )?;
            Ok(stmt.query_row([id], message_from_row)?)
        })
    }

    /// Newest first. `before` is a message id cursor: only messages with a
    /// smaller id are returned.
    pub fn get_messages(&self, channel_id: i64, limit: u32, before: Option<i64>) -> Result<Vec<MessageRow>> {
        self.with_conn(|conn| query_messages(conn, channel_id, limit, before))
    }
}

/// Sets `is_private` and, if given, `posting_restricted`. Must run inside
/// the caller's transaction.
pub fn update_channel_flags(conn: &Connection, channel_id: i64, flags: ChannelFlags) -> Result<()> {
    let updated = conn.execute(
        "UPDATE channels
         SET is_private = ?1,
             posting_restricted = COALESCE(?2, posting_restricted)
         WHERE id = ?3",
        rusqlite::params![flags.is_private, flags.posting_restricted, channel_id],
    )?;
    if updated == 0 {
        anyhow::bail!("Channel not found: {}", channel_id);
    }
    Ok(())
}

/// Delete-all-then-insert of a channel's member rows. Must run inside the
/// caller's transaction; on its own the intermediate empty set would be
/// observable.
pub fn replace_membership(conn: &Connection, channel_id: i64, member_ids: &BTreeSet<i64>) -> Result<()> {
    conn.execute("DELETE FROM channel_members WHERE channel_id = ?1", [channel_id])?;
    let mut stmt =
        conn.prepare_cached("INSERT INTO channel_members (channel_id, user_id) VALUES (?1, ?2)")?;
    for &user_id in member_ids {
        stmt.execute([channel_id, user_id])?;
    }
    Ok(())
}

/// The subset of `ids` with no matching user row.
pub fn missing_user_ids(conn: &Connection, ids: &BTreeSet<i64>) -> Result<Vec<i64>> {
    let mut stmt = conn.prepare_cached("SELECT 1 FROM users WHERE id = ?1")?;
    let mut missing = Vec::new();
    for &id in ids {
        if !stmt.exists([id])? {
            missing.push(id);
        }
    }
    Ok(missing)
}

fn insert_channel(
    conn: &Connection,
    name: &str,
    is_private: bool,
    posting_restricted: bool,
    member_ids: &BTreeSet<i64>,
) -> Result<ChannelRow> {
    conn.execute(
        "INSERT INTO channels (name, is_private, posting_restricted) VALUES (?1, ?2, ?3)",
        rusqlite::params![name, is_private, posting_restricted],
    )?;
    let id = conn.last_insert_rowid();
    if is_private {
        replace_membership(conn, id, member_ids)?;
    }
    query_channel_by_id(conn, id)?.ok_or_else(|| anyhow::anyhow!("Channel {} vanished after insert", id))
}

fn query_user<P: rusqlite::Params>(conn: &Connection, sql: &str, params: P) -> Result<Option<UserRow>> {
    let mut stmt = conn.prepare(sql)?;

    let row = stmt
        .query_row(params, |row| {
            Ok(UserRow {
                id: row.get(0)?,
                username: row.get(1)?,
                password: row.get(2)?,
                role: row.get(3)?,
                created_at: row.get(4)?,
            })
        })
        .optional()?;

    Ok(row)
}

fn query_channel_by_id(conn: &Connection, id: i64) -> Result<Option<ChannelRow>> {
    let sql = format!("SELECT {} FROM channels WHERE id = ?1", CHANNEL_COLUMNS);
    let row = conn.query_row(&sql, [id], channel_from_row).optional()?;
    Ok(row)
}

fn query_channel_by_name(conn: &Connection, name: &str) -> Result<Option<ChannelRow>> {
    let sql = format!("SELECT {} FROM channels WHERE name = ?1", CHANNEL_COLUMNS);
    let row = conn.query_row(&sql, [name], channel_from_row).optional()?;
    Ok(row)
}

fn query_messages(conn: &Connection, channel_id: i64, limit: u32, before: Option<i64>) -> Result<Vec<MessageRow>> {
    // JOIN users to fetch author_username in a single query (eliminates N+1)
    let mut stmt = conn.prepare(
        "SELECT m.id, m.channel_id, m.author_id, u.username, m.content, m.created_at
         FROM messages m
         LEFT JOIN users u ON m.author_id = u.id
         WHERE m.channel_id = ?1 AND (?2 IS NULL OR m.id < ?2)
         ORDER BY m.id DESC
         LIMIT ?3",
    )?;

    let rows = stmt
        .query_map(rusqlite::params![channel_id, before, limit], message_from_row)?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    Ok(rows)
}

fn channel_from_row(row: &Row<'_>) -> rusqlite::Result<ChannelRow> {
    Ok(ChannelRow {
        id: row.get(0)?,
        name: row.get(1)?,
        is_private: row.get(2)?,
        posting_restricted: row.get(3)?,
        created_at: row.get(4)?,
    })
}

fn message_from_row(row: &Row<'_>) -> rusqlite::Result<MessageRow> {
    Ok(MessageRow {
        id: row.get(0)?,
        channel_id: row.get(1)?,
        author_id: row.get(2)?,
        author_username: row
            .get::<_, Option<String>>(3)?
            .unwrap_or_else(|| "unknown".to_string()),
        content: row.get(4)?,
        created_at: row.get(5)?,
    })
}

/// Extension trait for optional query results
trait OptionalExt<T> {
    fn optional(self) -> Result<Option<T>>;
}

impl<T> OptionalExt<T> for std::result::Result<T, rusqlite::Error> {
    fn optional(self) -> Result<Option<T>> {
        match self {
            Ok(val) => Ok(Some(val)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}
