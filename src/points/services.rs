use std::{future::Future, sync::Arc, time::Duration};

use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::config::PointsConfig;
use crate::error::PointsError;
use crate::points::repo::LedgerStore;
use crate::points::repo_types::{Task, User};

/// Points transaction engine: validates, then runs each operation as one
/// store transaction under a deadline.
#[derive(Clone)]
pub struct PointsService {
    store: Arc<dyn LedgerStore>,
    referral_bonus: i64,
    deadline: Duration,
}

impl PointsService {
    pub fn new(store: Arc<dyn LedgerStore>, config: &PointsConfig) -> Self {
        Self {
            store,
            referral_bonus: config.referral_bonus,
            deadline: config.operation_timeout(),
        }
    }

    /// Same engine with a different deadline.
    #[cfg(test)]
    pub fn with_deadline(&self, deadline: Duration) -> Self {
        Self {
            deadline,
            ..self.clone()
        }
    }

    // On expiry the store future is dropped, and with it any open transaction,
    // which rolls back.
    async fn within_deadline<T>(
        &self,
        op: &'static str,
        fut: impl Future<Output = Result<T, PointsError>>,
    ) -> Result<T, PointsError> {
        match tokio::time::timeout(self.deadline, fut).await {
            Ok(res) => res,
            Err(_) => {
                warn!(op, deadline_ms = self.deadline.as_millis() as u64, "deadline exceeded");
                Err(PointsError::DeadlineExceeded)
            }
        }
    }

    pub async fn complete_task(
        &self,
        user_id: Uuid,
        task_type: &str,
        points: i64,
    ) -> Result<Task, PointsError> {
        info!(%user_id, %task_type, points, "completing task");

        let task_type = task_type.trim();
        if task_type.is_empty() {
            return Err(PointsError::InvalidInput("task type is required".into()));
        }
        if points <= 0 {
            return Err(PointsError::InvalidInput("points must be positive".into()));
        }

        let task = Task::new(user_id, task_type.to_string(), points);
        match self
            .within_deadline("complete_task", self.store.complete_task(task))
            .await
        {
            Ok(task) => {
                info!(%user_id, task_id = %task.id, task_type = %task.task_type, points = task.points,
                    "task completed");
                Ok(task)
            }
            Err(e) => {
                log_failure("complete_task", user_id, &e);
                Err(e)
            }
        }
    }

    pub async fn add_referrer(&self, user_id: Uuid, referrer_id: Uuid) -> Result<User, PointsError> {
        info!(%user_id, %referrer_id, "adding referrer");

        if user_id == referrer_id {
            return Err(PointsError::InvalidInput("user cannot refer themselves".into()));
        }

        match self
            .within_deadline(
                "add_referrer",
                self.store.add_referrer(user_id, referrer_id, self.referral_bonus),
            )
            .await
        {
            Ok(user) => {
                info!(%user_id, %referrer_id, bonus = self.referral_bonus, "referrer added");
                Ok(user)
            }
            Err(e) => {
                log_failure("add_referrer", user_id, &e);
                Err(e)
            }
        }
    }

    pub async fn create_user(&self, username: &str, password_hash: &str) -> Result<User, PointsError> {
        let user = self
            .within_deadline("create_user", self.store.create_user(username, password_hash))
            .await?;
        info!(user_id = %user.id, username = %user.username, "user created");
        Ok(user)
    }

    pub async fn find_by_username(&self, username: &str) -> Result<Option<User>, PointsError> {
        self.within_deadline("find_by_username", self.store.find_by_username(username))
            .await
    }

    pub async fn get_user(&self, id: Uuid) -> Result<Option<User>, PointsError> {
        let user = self.within_deadline("get_user", self.store.get_user(id)).await?;
        match &user {
            Some(u) => debug!(user_id = %id, username = %u.username, points = u.points, "user retrieved"),
            None => warn!(user_id = %id, "user not found"),
        }
        Ok(user)
    }

    pub async fn leaderboard(&self, limit: i64) -> Result<Vec<User>, PointsError> {
        let users = self
            .within_deadline("leaderboard", self.store.leaderboard(limit))
            .await?;
        debug!(limit, users_count = users.len(), "leaderboard retrieved");
        Ok(users)
    }

    pub async fn list_tasks(
        &self,
        user_id: Uuid,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Task>, PointsError> {
        if limit <= 0 || offset < 0 {
            return Err(PointsError::InvalidInput(
                "limit must be positive and offset non-negative".into(),
            ));
        }
        self.within_deadline("list_tasks", self.store.list_tasks(user_id, limit, offset))
            .await
    }
}

fn log_failure(op: &'static str, user_id: Uuid, err: &PointsError) {
    match err {
        PointsError::StoreUnavailable(_) | PointsError::DeadlineExceeded => {
            error!(op, %user_id, error = %err, "operation failed")
        }
        _ => warn!(op, %user_id, error = %err, "operation rejected"),
    }
}
