//! Password hashing and strength policy

use crate::error::{Error, Result};

/// Characters that satisfy the symbol rule
pub const PASSWORD_SYMBOLS: &str = "!@#$%^&*()_+-=[]{};':\"\\|,.<>/?`~";

pub const MIN_PASSWORD_LEN: usize = 8;

/// Rejected regardless of composition (compared case-insensitively)
const COMMON_PASSWORDS: [&str; 10] = [
    "password",
    "password123",
    "123456",
    "12345678",
    "qwerty",
    "abc123",
    "letmein",
    "welcome",
    "admin123",
    "iloveyou",
];

/// Outcome of a strength check
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StrengthReport {
    pub valid: bool,
    pub violations: Vec<String>,
}

/// Check a candidate password against every rule, collecting all violations
pub fn check_strength(password: &str) -> StrengthReport {
    let mut violations = Vec::new();

    if password.chars().count() < MIN_PASSWORD_LEN {
        violations.push(format!(
            "Password must be at least {} characters long",
            MIN_PASSWORD_LEN
        ));
    }
    if !password.chars().any(|c| c.is_uppercase()) {
        violations.push("Password must contain at least one uppercase letter".to_string());
    }
    if !password.chars().any(|c| c.is_lowercase()) {
        violations.push("Password must contain at least one lowercase letter".to_string());
    }
    if !password.chars().any(|c| c.is_ascii_digit()) {
        violations.push("Password must contain at least one number".to_string());
    }
    if !password.chars().any(|c| PASSWORD_SYMBOLS.contains(c)) {
        violations.push("Password must contain at least one special character".to_string());
    }
    if COMMON_PASSWORDS
        .iter()
        .any(|common| common.eq_ignore_ascii_case(password))
    {
        violations.push("Password is too common".to_string());
    }

    StrengthReport {
        valid: violations.is_empty(),
        violations,
    }
}

/// Adaptive bcrypt hashing with a configurable work factor.
///
/// bcrypt is CPU bound, so both operations run on the blocking pool.
#[derive(Debug, Clone, Copy)]
pub struct PasswordService {
    cost: u32,
}

impl PasswordService {
    pub fn new(cost: u32) -> Self {
        Self { cost }
    }

    pub fn cost(&self) -> u32 {
        self.cost
    }

    /// Salted hash of `plaintext`
    pub async fn hash(&self, plaintext: &str) -> Result<String> {
        let plaintext = plaintext.to_string();
        let cost = self.cost;
        tokio::task::spawn_blocking(move || bcrypt::hash(plaintext, cost))
            .await?
            .map_err(|e| Error::Internal(format!("Password hashing failed: {}", e)))
    }

    /// Compare `plaintext` with a stored hash
    pub async fn verify(&self, plaintext: &str, hash: &str) -> Result<bool> {
        let plaintext = plaintext.to_string();
        let hash = hash.to_string();
        tokio::task::spawn_blocking(move || bcrypt::verify(plaintext, &hash))
            .await?
            .map_err(|e| Error::Internal(format!("Password verification failed: {}", e)))
    }
}

impl Default for PasswordService {
    fn default() -> Self {
        Self::new(bcrypt::DEFAULT_COST)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strong_password_passes() {
        let report = check_strength("Str0ng!Pass");
        assert!(report.valid);
        assert!(report.violations.is_empty());
    }

    #[test]
    fn test_empty_password_reports_every_composition_rule() {
        let report = check_strength("");
        assert!(!report.valid);
        assert_eq!(report.violations.len(), 5);
    }

    #[test]
    fn test_reports_each_missing_class() {
        let report = check_strength("alllowercase");
        assert_eq!(
            report.violations,
            vec![
                "Password must contain at least one uppercase letter".to_string(),
                "Password must contain at least one number".to_string(),
                "Password must contain at least one special character".to_string(),
            ]
        );
    }

    #[test]
    fn test_common_password_is_case_insensitive() {
        let report = check_strength("PASSWORD123");
        assert!(report
            .violations
            .contains(&"Password is too common".to_string()));

        // Only exact matches count
        let report = check_strength("Password123!x");
        assert!(report.valid);
    }

    #[tokio::test]
    async fn test_hash_and_verify() {
        let service = PasswordService::new(4);
        let hash = service.hash("Str0ng!Pass").await.unwrap();

        assert_ne!(hash, "Str0ng!Pass");
        assert!(service.verify("Str0ng!Pass", &hash).await.unwrap());
        assert!(!service.verify("wrong", &hash).await.unwrap());
    }

    #[tokio::test]
    async fn test_hashes_are_salted() {
        let service = PasswordService::new(4);
        let first = service.hash("Str0ng!Pass").await.unwrap();
        let second = service.hash("Str0ng!Pass").await.unwrap();
        assert_ne!(first, second);
    }

    #[tokio::test]
    async fn test_verify_rejects_garbage_hash() {
        let service = PasswordService::new(4);
        assert!(service.verify("anything", "not-a-hash").await.is_err());
    }
}
