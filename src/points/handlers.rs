use axum::{
    extract::{Query, State},
    routing::{get, post},
    Json, Router,
};
use tracing::{instrument, warn};
use uuid::Uuid;

use crate::{
    auth::extractors::AuthUser,
    error::{ApiError, PointsError},
    extract::{ApiJson, ApiPath},
    points::{
        dto::{LeaderboardQuery, Pagination, ReferrerRequest, TaskRequest},
        repo_types::{Task, User},
    },
    state::AppState,
};

pub fn read_routes() -> Router<AppState> {
    Router::new()
        .route("/users/leaderboard", get(leaderboard))
        .route("/users/:id/status", get(user_status))
        .route("/users/:id/tasks", get(list_tasks))
}

pub fn write_routes() -> Router<AppState> {
    Router::new()
        .route("/users/:id/task/complete", post(complete_task))
        .route("/users/:id/referrer", post(add_referrer))
}

/// Mutations and private reads are only allowed on the caller's own id.
fn ensure_self(caller: Uuid, id: Uuid) -> Result<(), ApiError> {
    if caller != id {
        warn!(%caller, target = %id, "attempt to act on another user");
        return Err(ApiError::Forbidden);
    }
    Ok(())
}

#[instrument(skip(state))]
pub async fn user_status(
    State(state): State<AppState>,
    AuthUser(_caller): AuthUser,
    ApiPath(id): ApiPath<Uuid>,
) -> Result<Json<User>, ApiError> {
    let user = state
        .points
        .get_user(id)
        .await?
        .ok_or(PointsError::NotFound("user"))?;
    Ok(Json(user))
}

#[instrument(skip(state))]
pub async fn leaderboard(
    State(state): State<AppState>,
    AuthUser(_caller): AuthUser,
    Query(q): Query<LeaderboardQuery>,
) -> Result<Json<Vec<User>>, ApiError> {
    let users = state.points.leaderboard(q.effective_limit()).await?;
    Ok(Json(users))
}

#[instrument(skip(state))]
pub async fn list_tasks(
    State(state): State<AppState>,
    AuthUser(caller): AuthUser,
    ApiPath(id): ApiPath<Uuid>,
    Query(p): Query<Pagination>,
) -> Result<Json<Vec<Task>>, ApiError> {
    ensure_self(caller, id)?;
    let tasks = state.points.list_tasks(id, p.limit, p.offset).await?;
    Ok(Json(tasks))
}

#[instrument(skip(state, body))]
pub async fn complete_task(
    State(state): State<AppState>,
    AuthUser(caller): AuthUser,
    ApiPath(id): ApiPath<Uuid>,
    ApiJson(body): ApiJson<TaskRequest>,
) -> Result<Json<Task>, ApiError> {
    ensure_self(caller, id)?;
    body.validate()?;
    let task = state
        .points
        .complete_task(id, &body.task_type, body.points)
        .await?;
    Ok(Json(task))
}

#[instrument(skip(state, body))]
pub async fn add_referrer(
    State(state): State<AppState>,
    AuthUser(caller): AuthUser,
    ApiPath(id): ApiPath<Uuid>,
    ApiJson(body): ApiJson<ReferrerRequest>,
) -> Result<Json<User>, ApiError> {
    ensure_self(caller, id)?;
    let user = state.points.add_referrer(id, body.referrer_id).await?;
    Ok(Json(user))
}
