use async_trait::async_trait;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::error::PointsError;
use crate::points::repo::LedgerStore;
use crate::points::repo_types::{now_micros, Task, User};

/// In-process ledger for tests. One lock around both tables makes every
/// method atomic; `users` keeps insertion order as the natural row order.
#[derive(Default)]
pub struct MemoryLedger {
    inner: Mutex<Tables>,
}

#[derive(Default)]
struct Tables {
    users: Vec<User>,
    tasks: Vec<Task>,
}

impl Tables {
    fn user_mut(&mut self, id: Uuid) -> Option<&mut User> {
        self.users.iter_mut().find(|u| u.id == id)
    }
}

impl MemoryLedger {
    /// Seed a user with an explicit balance.
    pub async fn insert_user(&self, username: &str, points: i64) -> User {
        let now = now_micros();
        let user = User {
            id: Uuid::new_v4(),
            username: username.to_string(),
            password_hash: String::new(),
            points,
            referrer_id: None,
            created_at: now,
            updated_at: now,
        };
        self.inner.lock().await.users.push(user.clone());
        user
    }

    pub async fn task_count(&self) -> usize {
        self.inner.lock().await.tasks.len()
    }
}

fn overflow() -> PointsError {
    PointsError::InvalidInput("points balance would overflow".into())
}

#[async_trait]
impl LedgerStore for MemoryLedger {
    async fn create_user(&self, username: &str, password_hash: &str) -> Result<User, PointsError> {
        let mut tables = self.inner.lock().await;
        if tables.users.iter().any(|u| u.username == username) {
            return Err(PointsError::Conflict("username already taken".into()));
        }
        let now = now_micros();
        let user = User {
            id: Uuid::new_v4(),
            username: username.to_string(),
            password_hash: password_hash.to_string(),
            points: 0,
            referrer_id: None,
            created_at: now,
            updated_at: now,
        };
        tables.users.push(user.clone());
        Ok(user)
    }

    async fn find_by_username(&self, username: &str) -> Result<Option<User>, PointsError> {
        let tables = self.inner.lock().await;
        Ok(tables.users.iter().find(|u| u.username == username).cloned())
    }

    async fn get_user(&self, id: Uuid) -> Result<Option<User>, PointsError> {
        let tables = self.inner.lock().await;
        Ok(tables.users.iter().find(|u| u.id == id).cloned())
    }

    async fn leaderboard(&self, limit: i64) -> Result<Vec<User>, PointsError> {
        let tables = self.inner.lock().await;
        let mut users = tables.users.clone();
        // Stable sort keeps insertion order among equal balances.
        users.sort_by(|a, b| b.points.cmp(&a.points));
        users.truncate(usize::try_from(limit).unwrap_or(0));
        Ok(users)
    }

    async fn list_tasks(
        &self,
        user_id: Uuid,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Task>, PointsError> {
        let tables = self.inner.lock().await;
        Ok(tables
            .tasks
            .iter()
            .rev()
            .filter(|t| t.user_id == user_id)
            .skip(usize::try_from(offset).unwrap_or(0))
            .take(usize::try_from(limit).unwrap_or(0))
            .cloned()
            .collect())
    }

    async fn complete_task(&self, task: Task) -> Result<Task, PointsError> {
        let mut tables = self.inner.lock().await;
        let owner = tables
            .user_mut(task.user_id)
            .ok_or(PointsError::NotFound("user"))?;
        owner.points = owner.points.checked_add(task.points).ok_or_else(overflow)?;
        owner.updated_at = now_micros();
        tables.tasks.push(task.clone());
        Ok(task)
    }

    async fn add_referrer(
        &self,
        user_id: Uuid,
        referrer_id: Uuid,
        bonus: i64,
    ) -> Result<User, PointsError> {
        let mut tables = self.inner.lock().await;
        let boosted = tables
            .user_mut(referrer_id)
            .map(|r| r.points.checked_add(bonus))
            .ok_or(PointsError::NotFound("referrer"))?;
        let user = tables.user_mut(user_id).ok_or(PointsError::NotFound("user"))?;
        if user.referrer_id.is_some() {
            return Err(PointsError::Conflict("user already has a referrer".into()));
        }
        let boosted = boosted.ok_or_else(overflow)?;
        let now = now_micros();
        user.referrer_id = Some(referrer_id);
        user.updated_at = now;
        let updated = user.clone();

        if let Some(referrer) = tables.user_mut(referrer_id) {
            referrer.points = boosted;
            referrer.updated_at = now;
        }
        Ok(updated)
    }
}
