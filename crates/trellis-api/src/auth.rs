use std::sync::Arc;

use argon2::{Argon2, PasswordHash, PasswordHasher, PasswordVerifier, password_hash::SaltString};
use anyhow::Context;
use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};
use chrono::{DateTime, TimeDelta, Utc};
use jsonwebtoken::{EncodingKey, Header, encode};
use rand_core::OsRng;
use tracing::info;

use trellis_db::Database;
use trellis_types::api::{Claims, LoginRequest, LoginResponse, RegisterRequest, RegisterResponse};
use trellis_types::models::Role;

use crate::error::{ApiError, blocking};

pub type AppState = Arc<AppStateInner>;

pub struct AppStateInner {
    pub db: Database,
    pub jwt_secret: String,
    pub token_ttl_days: i64,
}

pub async fn register(
    State(state): State<AppState>,
    Json(req): Json<RegisterRequest>,
) -> Result<impl IntoResponse, ApiError> {
    // Validate input
    if req.username.len() < 3 || req.username.len() > 32 {
        return Err(ApiError::BadRequest("username must be 3-32 characters".into()));
    }
    if req.password.len() < 8 {
        return Err(ApiError::BadRequest("password must be at least 8 characters".into()));
    }

    let username = req.username.clone();
    let (user_id, role) = blocking(&state, move |db| {
        if db.get_user_by_username(&username)?.is_some() {
            return Err(ApiError::Conflict("username already taken".into()));
        }

        // Hash password with Argon2id
        let salt = SaltString::generate(&mut OsRng);
        let password_hash = Argon2::default()
            .hash_password(req.password.as_bytes(), &salt)
            .map_err(|e| anyhow::anyhow!("password hashing failed: {}", e))?
            .to_string();

        let (user_id, role) = db.register_user(&username, &password_hash)?;
        info!("Registered {} ({}) as {}", username, user_id, role);
        Ok((user_id, role))
    })
    .await?;

    let token = create_token(&state, user_id, &req.username, role)?;

    Ok((
        StatusCode::CREATED,
        Json(RegisterResponse {
            user_id,
            role,
            token,
        }),
    ))
}

pub async fn login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let (user_id, username, role) = blocking(&state, move |db| {
        let user = db
            .get_user_by_username(&req.username)?
            .ok_or(ApiError::InvalidCredentials)?;

        // Verify password
        let parsed_hash = PasswordHash::new(&user.password)
            .map_err(|e| anyhow::anyhow!("corrupt password hash for user {}: {}", user.id, e))?;

        Argon2::default()
            .verify_password(req.password.as_bytes(), &parsed_hash)
            .map_err(|_| ApiError::InvalidCredentials)?;

        let role = user.role()?;
        Ok((user.id, user.username, role))
    })
    .await?;

    let token = create_token(&state, user_id, &username, role)?;

    Ok(Json(LoginResponse {
        user_id,
        username,
        role,
        token,
    }))
}

/// Signs a bearer token carrying the user's id and role.
pub fn create_token(state: &AppStateInner, user_id: i64, username: &str, role: Role) -> anyhow::Result<String> {
    let claims = Claims {
        sub: user_id,
        username: username.to_string(),
        role,
        exp: token_expiry(state.token_ttl_days)?.timestamp() as usize,
    };

    let token = encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(state.jwt_secret.as_bytes()),
    )?;

    Ok(token)
}

fn token_expiry(ttl_days: i64) -> anyhow::Result<DateTime<Utc>> {
    let ttl = TimeDelta::try_days(ttl_days)
        .filter(|ttl| *ttl > TimeDelta::zero())
        .with_context(|| format!("token lifetime of {} days is out of range", ttl_days))?;
    Utc::now()
        .checked_add_signed(ttl)
        .with_context(|| format!("token lifetime of {} days overflows", ttl_days))
}
