use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use time::{Duration, OffsetDateTime};
use uuid::Uuid;

/// User record in the database.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct User {
    pub id: Uuid,
    pub username: String,
    #[serde(skip_serializing, default)]
    #[sqlx(rename = "passw")]
    pub password_hash: String, // argon2 PHC string, never exposed in JSON
    pub points: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub referrer_id: Option<Uuid>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

/// Completed task, one row in the ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct Task {
    pub id: Uuid,
    pub user_id: Uuid,
    pub task_type: String,
    pub points: i64,
    #[serde(with = "time::serde::rfc3339")]
    pub completed_at: OffsetDateTime,
}

impl Task {
    /// Fresh task stamped with the current time.
    pub fn new(user_id: Uuid, task_type: String, points: i64) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id,
            task_type,
            points,
            completed_at: now_micros(),
        }
    }
}

/// Current UTC time truncated to microseconds, the resolution of TIMESTAMPTZ.
pub fn now_micros() -> OffsetDateTime {
    let now = OffsetDateTime::now_utc();
    now - Duration::nanoseconds(i64::from(now.nanosecond() % 1_000))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn user_json_hides_password_and_missing_referrer() {
        let now = now_micros();
        let user = User {
            id: Uuid::new_v4(),
            username: "alice".into(),
            password_hash: "$argon2id$secret".into(),
            points: 40,
            referrer_id: None,
            created_at: now,
            updated_at: now,
        };
        let json = serde_json::to_value(&user).unwrap();
        assert!(json.get("password_hash").is_none());
        assert!(json.get("referrer_id").is_none());
        assert_eq!(json["points"], 40);
        assert_eq!(json["username"], "alice");
    }

    #[test]
    fn now_micros_has_no_sub_microsecond_part() {
        assert_eq!(now_micros().nanosecond() % 1_000, 0);
    }
}
