//! The `dm:<low>-<high>` naming convention for direct-message channels.

use trellis_types::models::ChannelKind;

const DM_PREFIX: &str = "dm:";

/// Classifies a channel by name.
///
/// `dm:<digits>-<digits>` with two distinct ids is a DM between those two
/// users. Ids are returned ordered (`low < high`) even if the name lists
/// them the other way round. Anything else, including `dm:4-4`, is an
/// ordinary channel.
pub fn resolve(name: &str) -> ChannelKind {
    match parse_pair(name) {
        Some((low, high)) => ChannelKind::DirectMessage { low, high },
        None => ChannelKind::Ordinary,
    }
}

/// True if `name` claims the DM pattern.
pub fn is_dm_name(name: &str) -> bool {
    resolve(name).is_dm()
}

/// The canonical channel name for a DM between `a` and `b`.
pub fn dm_channel_name(a: i64, b: i64) -> String {
    format!("{}{}-{}", DM_PREFIX, a.min(b), a.max(b))
}

fn parse_pair(name: &str) -> Option<(i64, i64)> {
    let rest = name.strip_prefix(DM_PREFIX)?;
    let (a, b) = rest.split_once('-')?;
    let a = parse_id(a)?;
    let b = parse_id(b)?;
    if a == b {
        return None;
    }
    Some((a.min(b), a.max(b)))
}

fn parse_id(digits: &str) -> Option<i64> {
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    // Out-of-range ids are not a DM.
    digits.parse().ok()
}
