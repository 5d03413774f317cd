use std::time::Duration;

use anyhow::Context;
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct JwtConfig {
    pub secret: String,
    pub issuer: String,
    pub audience: String,
    pub ttl_minutes: i64,
    pub refresh_ttl_minutes: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PointsConfig {
    /// Points credited to a referrer when someone links to them.
    pub referral_bonus: i64,
    /// Deadline for a single engine call, transaction included.
    pub operation_timeout_ms: u64,
}

impl PointsConfig {
    pub fn operation_timeout(&self) -> Duration {
        Duration::from_millis(self.operation_timeout_ms)
    }
}

impl Default for PointsConfig {
    fn default() -> Self {
        Self {
            referral_bonus: 10,
            operation_timeout_ms: 5_000,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub database_url: String,
    pub database_max_connections: u32,
    pub jwt: JwtConfig,
    pub points: PointsConfig,
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let database_url = std::env::var("DATABASE_URL").context("DATABASE_URL is not set")?;
        let database_max_connections = env_or("DATABASE_MAX_CONNECTIONS", 10);
        let jwt = JwtConfig {
            secret: std::env::var("JWT_SECRET").context("JWT_SECRET is not set")?,
            issuer: std::env::var("JWT_ISSUER").unwrap_or_else(|_| "pointsboard".into()),
            audience: std::env::var("JWT_AUDIENCE")
                .unwrap_or_else(|_| "pointsboard-users".into()),
            ttl_minutes: env_or("JWT_TTL_MINUTES", 60),
            refresh_ttl_minutes: env_or("JWT_REFRESH_TTL_MINUTES", 60 * 24 * 14),
        };
        let defaults = PointsConfig::default();
        let points = PointsConfig {
            referral_bonus: env_or("REFERRAL_BONUS", defaults.referral_bonus),
            operation_timeout_ms: env_or("OPERATION_TIMEOUT_MS", defaults.operation_timeout_ms),
        };
        anyhow::ensure!(
            points.referral_bonus >= 0,
            "REFERRAL_BONUS must not be negative"
        );

        Ok(Self {
            database_url,
            database_max_connections,
            jwt,
            points,
        })
    }
}

fn env_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    parse_or(std::env::var(key).ok().as_deref(), default)
}

fn parse_or<T: std::str::FromStr>(raw: Option<&str>, default: T) -> T {
    raw.and_then(|v| v.trim().parse::<T>().ok()).unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_or_falls_back_on_missing_or_garbage() {
        assert_eq!(parse_or::<i64>(None, 10), 10);
        assert_eq!(parse_or::<i64>(Some("abc"), 10), 10);
        assert_eq!(parse_or::<i64>(Some(" 25 "), 10), 25);
        assert_eq!(parse_or::<u64>(Some("-1"), 7), 7);
    }

    #[test]
    fn points_defaults_keep_bonus_of_ten() {
        let cfg = PointsConfig::default();
        assert_eq!(cfg.referral_bonus, 10);
        assert_eq!(cfg.operation_timeout(), Duration::from_secs(5));
    }
}
