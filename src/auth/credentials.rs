use argon2::{
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use lazy_static::lazy_static;
use rand::rngs::OsRng;
use regex::Regex;
use tracing::error;

pub const MIN_PASSWORD_LEN: usize = 8;

lazy_static! {
    static ref USERNAME_RE: Regex = Regex::new(r"^[A-Za-z0-9_.-]{3,32}$").unwrap();
}

/// Trim and check a username; `None` when it breaks the naming rules.
pub fn normalize_username(raw: &str) -> Option<String> {
    let name = raw.trim();
    USERNAME_RE.is_match(name).then(|| name.to_string())
}

pub fn is_acceptable_password(plain: &str) -> bool {
    plain.chars().count() >= MIN_PASSWORD_LEN
}

/// Salted argon2id hash in PHC string form.
pub fn hash_password(plain: &str) -> anyhow::Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default()
        .hash_password(plain.as_bytes(), &salt)
        .map_err(|e| {
            error!(error = %e, "argon2 hash_password error");
            anyhow::anyhow!(e.to_string())
        })?
        .to_string();
    Ok(hash)
}

pub fn verify_password(plain: &str, hash: &str) -> anyhow::Result<bool> {
    let parsed = PasswordHash::new(hash).map_err(|e| {
        error!(error = %e, "argon2 parse hash error");
        anyhow::anyhow!(e.to_string())
    })?;
    Ok(Argon2::default()
        .verify_password(plain.as_bytes(), &parsed)
        .is_ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_is_salted_and_verifies() {
        let a = hash_password("Secur3P@ssw0rd!").expect("hashing should succeed");
        let b = hash_password("Secur3P@ssw0rd!").expect("hashing should succeed");
        assert_ne!(a, b);
        assert!(a.starts_with("$argon2"));
        assert!(verify_password("Secur3P@ssw0rd!", &a).expect("verify should succeed"));
        assert!(!verify_password("wrong-password", &a).expect("verify should not error"));
    }

    #[test]
    fn verify_errors_on_malformed_hash() {
        assert!(verify_password("anything", "not-a-valid-hash").is_err());
    }

    #[test]
    fn username_rules() {
        assert_eq!(normalize_username("  alice_01 ").as_deref(), Some("alice_01"));
        assert_eq!(normalize_username("ab"), None);
        assert_eq!(normalize_username("has space"), None);
        assert_eq!(normalize_username(&"x".repeat(33)), None);
    }

    #[test]
    fn password_length_rule() {
        assert!(!is_acceptable_password("short"));
        assert!(is_acceptable_password("long-enough"));
    }
}
