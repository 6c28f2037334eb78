//! Password hashing and the settings-edit session.
//!
//! Editing settings requires a password. A successful `authenticate` opens a
//! session that stays valid until `logout` or until the idle timeout passes.
//! The session is plain caller-owned state; nothing here is global.

use std::time::{Duration, Instant};

use sha2::{Digest, Sha256};
use uuid::Uuid;

/// Default idle timeout for a session, in minutes.
pub const DEFAULT_TIMEOUT_MINUTES: u64 = 30;

/// How passwords are turned into stored hashes and checked against them.
pub trait PasswordPolicy {
    fn hash(&self, password: &str) -> String;
    fn verify(&self, password: &str, stored: &str) -> bool;
}

/// SHA-256 over a random per-password salt.
///
/// Stored form: `sha256$<salt>$<hex digest>`. A bare 64-character hex
/// digest (unsalted SHA-256) is also accepted so older settings files keep
/// working until the password is next changed.
#[derive(Debug, Default, Clone, Copy)]
pub struct SaltedSha256;

const SCHEME: &str = "sha256";

fn digest_hex(salt: &str, password: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(salt.as_bytes());
    hasher.update(password.as_bytes());
    format!("{:x}", hasher.finalize())
}

impl PasswordPolicy for SaltedSha256 {
    fn hash(&self, password: &str) -> String {
        let salt = Uuid::new_v4().simple().to_string();
        format!("{}${}${}", SCHEME, salt, digest_hex(&salt, password))
    }

    fn verify(&self, password: &str, stored: &str) -> bool {
        let parts: Vec<&str> = stored.split('$').collect();
        match parts.as_slice() {
            [scheme, salt, hex] if *scheme == SCHEME => digest_hex(salt, password) == *hex,
            [legacy] if legacy.len() == 64 => digest_hex("", password) == *legacy,
            _ => false,
        }
    }
}

/// Authentication state for settings edits.
#[derive(Debug, Clone)]
pub struct Session {
    authenticated_at: Option<Instant>,
    timeout: Duration,
}

impl Default for Session {
    fn default() -> Self {
        Session::new(DEFAULT_TIMEOUT_MINUTES)
    }
}

impl Session {
    pub fn new(timeout_minutes: u64) -> Self {
        Session::with_timeout(Duration::from_secs(timeout_minutes.saturating_mul(60)))
    }

    pub fn with_timeout(timeout: Duration) -> Self {
        Session {
            authenticated_at: None,
            timeout,
        }
    }

    /// Check `password` against `stored_hash` and open the session on success.
    ///
    /// Always fails when no hash has been stored yet.
    pub fn authenticate(
        &mut self,
        password: &str,
        stored_hash: Option<&str>,
        policy: &dyn PasswordPolicy,
    ) -> bool {
        let ok = stored_hash.is_some_and(|stored| policy.verify(password, stored));
        if ok {
            self.authenticated_at = Some(Instant::now());
            tracing::debug!("session opened");
        } else {
            tracing::warn!("authentication failed");
        }
        ok
    }

    pub fn logout(&mut self) {
        self.authenticated_at = None;
    }

    pub fn is_valid(&self) -> bool {
        self.authenticated_at
            .is_some_and(|at| at.elapsed() <= self.timeout)
    }

    /// Restart the idle timer of a still-valid session.
    pub fn extend(&mut self) {
        if self.is_valid() {
            self.authenticated_at = Some(Instant::now());
        }
    }

    /// Time left before the session expires; zero when not authenticated.
    pub fn remaining(&self) -> Duration {
        match self.authenticated_at {
            Some(at) if self.is_valid() => self.timeout.saturating_sub(at.elapsed()),
            _ => Duration::ZERO,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_verifies_only_correct_password() {
        let policy = SaltedSha256;
        let stored = policy.hash("hunter2");
        assert!(stored.starts_with("sha256$"));
        assert!(policy.verify("hunter2", &stored));
        assert!(!policy.verify("hunter3", &stored));
        assert!(!policy.verify("", &stored));
    }

    #[test]
    fn test_same_password_hashes_differ() {
        let policy = SaltedSha256;
        assert_ne!(policy.hash("pw"), policy.hash("pw"));
    }

    #[test]
    fn test_legacy_unsalted_hash_accepted() {
        // sha256("abc")
        let legacy = "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad";
        assert!(SaltedSha256.verify("abc", legacy));
        assert!(!SaltedSha256.verify("abd", legacy));
        assert!(!SaltedSha256.verify("abc", "md5$x$y"));
    }

    #[test]
    fn test_session_lifecycle() {
        let policy = SaltedSha256;
        let stored = policy.hash("secret");
        let mut session = Session::default();
        assert!(!session.is_valid());
        assert_eq!(session.remaining(), Duration::ZERO);

        assert!(!session.authenticate("wrong", Some(&stored), &policy));
        assert!(!session.is_valid());

        assert!(session.authenticate("secret", Some(&stored), &policy));
        assert!(session.is_valid());
        assert!(session.remaining() > Duration::from_secs(29 * 60));

        session.logout();
        assert!(!session.is_valid());
    }

    #[test]
    fn test_no_stored_hash_never_authenticates() {
        let mut session = Session::default();
        assert!(!session.authenticate("anything", None, &SaltedSha256));
    }

    #[test]
    fn test_session_expires() {
        let policy = SaltedSha256;
        let stored = policy.hash("pw");
        let mut session = Session::with_timeout(Duration::from_millis(1));
        assert!(session.authenticate("pw", Some(&stored), &policy));
        std::thread::sleep(Duration::from_millis(20));
        assert!(!session.is_valid());
        session.extend();
        assert!(!session.is_valid());
        assert_eq!(session.remaining(), Duration::ZERO);
    }
}
