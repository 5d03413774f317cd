use serde::Deserialize;
use uuid::Uuid;

use crate::error::ApiError;

pub const DEFAULT_LEADERBOARD_LIMIT: i64 = 10;

#[derive(Debug, Deserialize)]
pub struct TaskRequest {
    pub task_type: String,
    pub points: i64,
}

impl TaskRequest {
    pub fn validate(&self) -> Result<(), ApiError> {
        if self.task_type.trim().is_empty() {
            return Err(ApiError::BadRequest("task type is required".into()));
        }
        if self.points <= 0 {
            return Err(ApiError::BadRequest("points must be positive".into()));
        }
        Ok(())
    }
}

#[derive(Debug, Deserialize)]
pub struct ReferrerRequest {
    pub referrer_id: Uuid,
}

/// `?limit=` kept as raw text so bad values fall back to the default
/// instead of rejecting the request.
#[derive(Debug, Default, Deserialize)]
pub struct LeaderboardQuery {
    pub limit: Option<String>,
}

impl LeaderboardQuery {
    pub fn effective_limit(&self) -> i64 {
        self.limit
            .as_deref()
            .and_then(|v| v.trim().parse::<i64>().ok())
            .filter(|v| *v > 0)
            .unwrap_or(DEFAULT_LEADERBOARD_LIMIT)
    }
}

#[derive(Debug, Deserialize)]
pub struct Pagination {
    #[serde(default = "default_limit")]
    pub limit: i64,
    #[serde(default)]
    pub offset: i64,
}
fn default_limit() -> i64 {
    20
}
