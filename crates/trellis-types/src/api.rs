use serde::{Deserialize, Serialize};

use crate::models::{Channel, ChannelKind, Role};

// -- JWT Claims --

/// JWT claims issued at login and checked by the REST middleware.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: i64,
    pub username: String,
    /// Role at issue time, for clients. The server reads the current role
    /// from the database instead.
    pub role: Role,
    pub exp: usize,
}

// -- Auth --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RegisterRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct RegisterResponse {
    pub user_id: i64,
    pub role: Role,
    pub token: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub user_id: i64,
    pub username: String,
    pub role: Role,
    pub token: String,
}

// -- Users --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SetRoleRequest {
    pub role: Role,
}

// -- Channels --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CreateChannelRequest {
    pub name: String,
    #[serde(default)]
    pub is_private: bool,
    #[serde(default)]
    pub posting_restricted: bool,
    #[serde(default)]
    pub member_ids: Vec<i64>,
}

/// Body of `PUT /channels/{id}/privacy`.
///
/// `posting_restricted` is reserved for admins and managers; leaving it out
/// keeps the stored value.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UpdatePrivacyRequest {
    pub is_private: bool,
    #[serde(default)]
    pub member_ids: Vec<i64>,
    #[serde(default)]
    pub posting_restricted: Option<bool>,
}

#[derive(Debug, Serialize)]
pub struct ChannelResponse {
    #[serde(flatten)]
    pub channel: Channel,
    pub kind: ChannelKind,
}

#[derive(Debug, Serialize)]
pub struct MembersResponse {
    pub channel_id: i64,
    pub member_ids: Vec<i64>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OpenDmRequest {
    pub user_id: i64,
}

// -- Messages --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SendMessageRequest {
    pub content: String,
}
