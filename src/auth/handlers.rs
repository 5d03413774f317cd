use axum::{
    extract::{FromRef, State},
    routing::{get, post},
    Json, Router,
};
use tracing::{info, instrument, warn};

use crate::{
    auth::{
        credentials::{hash_password, is_acceptable_password, normalize_username, verify_password},
        dto::{AuthResponse, CredentialsRequest, RefreshRequest},
        extractors::AuthUser,
        jwt::{JwtKeys, TokenKind},
    },
    error::{ApiError, PointsError},
    extract::ApiJson,
    points::repo_types::User,
    state::AppState,
};

pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/auth/register", post(register))
        .route("/auth/login", post(login))
        .route("/auth/refresh", post(refresh))
}

pub fn me_routes() -> Router<AppState> {
    Router::new().route("/me", get(get_me))
}

fn respond_with_tokens(state: &AppState, user: User) -> Result<Json<AuthResponse>, ApiError> {
    let pair = JwtKeys::from_ref(state).issue_pair(user.id)?;
    Ok(Json(AuthResponse {
        access_token: pair.access_token,
        refresh_token: pair.refresh_token,
        user,
    }))
}

#[instrument(skip(state, payload))]
pub async fn register(
    State(state): State<AppState>,
    ApiJson(payload): ApiJson<CredentialsRequest>,
) -> Result<Json<AuthResponse>, ApiError> {
    let Some(username) = normalize_username(&payload.username) else {
        warn!(username = %payload.username, "invalid username");
        return Err(ApiError::BadRequest(
            "username must be 3-32 letters, digits, '_', '.' or '-'".into(),
        ));
    };
    if !is_acceptable_password(&payload.password) {
        warn!("password too short");
        return Err(ApiError::BadRequest("password too short".into()));
    }

    let hash = hash_password(&payload.password)?;
    // The unique constraint decides races between identical usernames.
    let user = state.points.create_user(&username, &hash).await?;

    info!(user_id = %user.id, username = %user.username, "user registered");
    respond_with_tokens(&state, user)
}

#[instrument(skip(state, payload))]
pub async fn login(
    State(state): State<AppState>,
    ApiJson(payload): ApiJson<CredentialsRequest>,
) -> Result<Json<AuthResponse>, ApiError> {
    let invalid = || ApiError::Unauthorized("invalid credentials".into());

    let username = normalize_username(&payload.username).ok_or_else(invalid)?;
    let Some(user) = state.points.find_by_username(&username).await? else {
        warn!(%username, "login unknown username");
        return Err(invalid());
    };

    if !verify_password(&payload.password, &user.password_hash)? {
        warn!(%username, user_id = %user.id, "login invalid password");
        return Err(invalid());
    }

    info!(user_id = %user.id, %username, "user logged in");
    respond_with_tokens(&state, user)
}

#[instrument(skip(state, payload))]
pub async fn refresh(
    State(state): State<AppState>,
    ApiJson(payload): ApiJson<RefreshRequest>,
) -> Result<Json<AuthResponse>, ApiError> {
    let claims = JwtKeys::from_ref(&state)
        .verify_kind(&payload.refresh_token, TokenKind::Refresh)
        .map_err(|e| ApiError::Unauthorized(e.to_string()))?;

    let user = state
        .points
        .get_user(claims.sub)
        .await?
        .ok_or_else(|| ApiError::Unauthorized("user not found".into()))?;
    respond_with_tokens(&state, user)
}

#[instrument(skip(state))]
pub async fn get_me(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
) -> Result<Json<User>, ApiError> {
    let user = state
        .points
        .get_user(user_id)
        .await?
        .ok_or(PointsError::NotFound("user"))?;
    Ok(Json(user))
}
