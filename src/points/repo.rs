use async_trait::async_trait;
use sqlx::{PgPool, Postgres, Transaction};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::PointsError;
use crate::points::repo_types::{Task, User};

const USER_COLUMNS: &str = "id, username, passw, points, referrer_id, created_at, updated_at";

/// Durable users and task ledger. Every compound method is one atomic unit.
#[async_trait]
pub trait LedgerStore: Send + Sync {
    /// Insert a new user with zero points. A taken username is a `Conflict`.
    async fn create_user(&self, username: &str, password_hash: &str) -> Result<User, PointsError>;

    async fn find_by_username(&self, username: &str) -> Result<Option<User>, PointsError>;

    async fn get_user(&self, id: Uuid) -> Result<Option<User>, PointsError>;

    /// Users by points descending; ties in creation order.
    async fn leaderboard(&self, limit: i64) -> Result<Vec<User>, PointsError>;

    /// A user's tasks, newest first.
    async fn list_tasks(
        &self,
        user_id: Uuid,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Task>, PointsError>;

    /// Record `task` and credit its points to the owner.
    async fn complete_task(&self, task: Task) -> Result<Task, PointsError>;

    /// Link `user_id` to `referrer_id` and credit `bonus` to the referrer.
    async fn add_referrer(
        &self,
        user_id: Uuid,
        referrer_id: Uuid,
        bonus: i64,
    ) -> Result<User, PointsError>;
}

/// `points + $1` past the BIGINT range raises SQLSTATE 22003.
fn balance_update_error(e: sqlx::Error) -> PointsError {
    if let sqlx::Error::Database(db) = &e {
        if db.code().as_deref() == Some("22003") {
            warn!(error = %db, "points balance out of range");
            return PointsError::InvalidInput("points balance would overflow".into());
        }
    }
    e.into()
}

#[derive(Clone)]
pub struct PgLedger {
    db: PgPool,
}

impl PgLedger {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    async fn fetch_user_tx(
        tx: &mut Transaction<'_, Postgres>,
        id: Uuid,
    ) -> Result<User, PointsError> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE id = $1"
        ))
        .bind(id)
        .fetch_one(&mut **tx)
        .await?;
        Ok(user)
    }
}

#[async_trait]
impl LedgerStore for PgLedger {
    async fn create_user(&self, username: &str, password_hash: &str) -> Result<User, PointsError> {
        let res = sqlx::query_as::<_, User>(&format!(
            r#"
            INSERT INTO users (username, passw)
            VALUES ($1, $2)
            RETURNING {USER_COLUMNS}
            "#
        ))
        .bind(username)
        .bind(password_hash)
        .fetch_one(&self.db)
        .await;

        match res {
            Ok(user) => Ok(user),
            Err(sqlx::Error::Database(e)) if e.is_unique_violation() => {
                warn!(%username, "username already taken");
                Err(PointsError::Conflict("username already taken".into()))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn find_by_username(&self, username: &str) -> Result<Option<User>, PointsError> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE username = $1"
        ))
        .bind(username)
        .fetch_optional(&self.db)
        .await?;
        Ok(user)
    }

    async fn get_user(&self, id: Uuid) -> Result<Option<User>, PointsError> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.db)
        .await?;
        Ok(user)
    }

    async fn leaderboard(&self, limit: i64) -> Result<Vec<User>, PointsError> {
        let rows = sqlx::query_as::<_, User>(&format!(
            r#"
            SELECT {USER_COLUMNS}
            FROM users
            ORDER BY points DESC, created_at ASC, id ASC
            LIMIT $1
            "#
        ))
        .bind(limit)
        .fetch_all(&self.db)
        .await?;
        Ok(rows)
    }

    async fn list_tasks(
        &self,
        user_id: Uuid,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Task>, PointsError> {
        let rows = sqlx::query_as::<_, Task>(
            r#"
            SELECT id, user_id, task_type, points, completed_at
            FROM tasks
            WHERE user_id = $1
            ORDER BY completed_at DESC, id ASC
            LIMIT $2 OFFSET $3
            "#,
        )
        .bind(user_id)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.db)
        .await?;
        Ok(rows)
    }

    async fn complete_task(&self, task: Task) -> Result<Task, PointsError> {
        // Dropping `tx` without commit rolls everything back.
        let mut tx = self.db.begin().await?;

        let owner = sqlx::query_scalar::<_, Uuid>("SELECT id FROM users WHERE id = $1 FOR UPDATE")
            .bind(task.user_id)
            .fetch_optional(&mut *tx)
            .await?;
        if owner.is_none() {
            warn!(user_id = %task.user_id, "user not found");
            return Err(PointsError::NotFound("user"));
        }

        debug!(task_id = %task.id, user_id = %task.user_id, "inserting task record");
        let task = sqlx::query_as::<_, Task>(
            r#"
            INSERT INTO tasks (id, user_id, task_type, points, completed_at)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING id, user_id, task_type, points, completed_at
            "#,
        )
        .bind(task.id)
        .bind(task.user_id)
        .bind(&task.task_type)
        .bind(task.points)
        .bind(task.completed_at)
        .fetch_one(&mut *tx)
        .await?;

        debug!(user_id = %task.user_id, points_to_add = task.points, "updating user points");
        sqlx::query("UPDATE users SET points = points + $1, updated_at = NOW() WHERE id = $2")
            .bind(task.points)
            .bind(task.user_id)
            .execute(&mut *tx)
            .await
            .map_err(balance_update_error)?;

        tx.commit().await?;
        Ok(task)
    }

    async fn add_referrer(
        &self,
        user_id: Uuid,
        referrer_id: Uuid,
        bonus: i64,
    ) -> Result<User, PointsError> {
        let mut tx = self.db.begin().await?;

        // Lock both rows in id order so crossed referrals cannot deadlock and a
        // concurrent attempt on the same user waits for this one to finish.
        let locked = sqlx::query_as::<_, (Uuid, Option<Uuid>)>(
            r#"
            SELECT id, referrer_id
            FROM users
            WHERE id = ANY($1)
            ORDER BY id
            FOR UPDATE
            "#,
        )
        .bind(vec![user_id, referrer_id])
        .fetch_all(&mut *tx)
        .await?;

        if !locked.iter().any(|(id, _)| *id == referrer_id) {
            warn!(%referrer_id, "referrer not found");
            return Err(PointsError::NotFound("referrer"));
        }
        match locked.iter().find(|(id, _)| *id == user_id) {
            None => {
                warn!(%user_id, "user not found");
                return Err(PointsError::NotFound("user"));
            }
            Some((_, Some(existing))) => {
                warn!(%user_id, %existing, "user already has a referrer");
                return Err(PointsError::Conflict("user already has a referrer".into()));
            }
            Some((_, None)) => {}
        }

        debug!(%user_id, %referrer_id, "updating user referrer");
        let linked = sqlx::query(
            r#"
            UPDATE users
            SET referrer_id = $1, updated_at = NOW()
            WHERE id = $2 AND referrer_id IS NULL
            "#,
        )
        .bind(referrer_id)
        .bind(user_id)
        .execute(&mut *tx)
        .await?;
        if linked.rows_affected() != 1 {
            return Err(PointsError::Conflict("user already has a referrer".into()));
        }

        debug!(%referrer_id, bonus_points = bonus, "adding bonus points to referrer");
        sqlx::query("UPDATE users SET points = points + $1, updated_at = NOW() WHERE id = $2")
            .bind(bonus)
            .bind(referrer_id)
            .execute(&mut *tx)
            .await
            .map_err(balance_update_error)?;

        let user = Self::fetch_user_tx(&mut tx, user_id).await?;
        tx.commit().await?;
        Ok(user)
    }
}
