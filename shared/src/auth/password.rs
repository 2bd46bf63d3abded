//! # Password Hashing with bcrypt
//!
//! Secure password storage using bcrypt with a work factor of 12.
//!
//! ## How Password Hashing Works
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────────┐
//! │                        Password Hashing                              │
//! ├──────────────────────────────────────────────────────────────────────┤
//! │                                                                      │
//! │  "MyPassword123!"  ──►  bcrypt  ──►  $2b$12$R9h/cIPz0gi.URNN...     │
//! │         │                  │                  │                      │
//! │    (plaintext)        (salt + cost)      (modular crypt string:     │
//! │                                           version + cost +          │
//! │                                           salt + hash)              │
//! └──────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Why the blocking pool?
//!
//! bcrypt at cost 12 takes on the order of 250 ms of pure CPU. Running it
//! on the async executor would stall every socket sharing that worker, so
//! both `hash` and `verify` dispatch to `tokio::task::spawn_blocking`.
//!
//! ## Security Notes
//!
//! - **Never store plaintext passwords**
//! - **Each hash includes a unique salt** - same password → different hashes
//! - **Verification is constant-time** - prevents timing attacks
//! - Login failure for unknown-user and wrong-password is indistinguishable
//!   (the auth service verifies against a dummy hash on the unknown path)

use crate::errors::ApiError;

/// bcrypt work factor used in production.
///
/// Cost 12 ≈ 250 ms per hash on current hardware, which is the accepted
/// trade-off between login latency and brute-force resistance.
pub const BCRYPT_COST: u32 = 12;

// =============================================================================
// Password Hasher
// =============================================================================

/// Secure password hashing service.
///
/// Handles hashing passwords for storage and verifying them during login,
/// always on the blocking worker pool.
///
/// ## Thread Safety
///
/// `Clone`, `Send + Sync`; each hash operation generates a new random salt.
#[derive(Clone)]
pub struct PasswordHasher {
    /// bcrypt cost factor; lowered only in tests
    cost: u32,
}

impl Default for PasswordHasher {
    fn default() -> Self {
        Self::new()
    }
}

impl PasswordHasher {
    /// Creates a hasher with the production work factor.
    pub fn new() -> Self {
        Self { cost: BCRYPT_COST }
    }

    /// Creates a hasher with an explicit cost. Intended for tests, where
    /// the minimum cost keeps suites fast.
    pub fn with_cost(cost: u32) -> Self {
        Self { cost }
    }

    /// Hashes a password for secure storage.
    ///
    /// Dispatches to the blocking pool; the returned string is in bcrypt's
    /// modular crypt format (`$2b$12$...`), self-describing with salt and
    /// cost embedded.
    ///
    /// ## Errors
    ///
    /// Returns `ApiError::Internal` if hashing fails (rare).
    pub async fn hash(&self, password: &str) -> Result<String, ApiError> {
        let password = password.to_string();
        let cost = self.cost;

        tokio::task::spawn_blocking(move || bcrypt::hash(password, cost))
            .await
            .map_err(|e| ApiError::Internal {
                message: format!("Hashing task failed: {}", e),
            })?
            .map_err(|e| ApiError::Internal {
                message: format!("Password hashing failed: {}", e),
            })
    }

    /// Verifies a password against a stored hash.
    ///
    /// Dispatches to the blocking pool. Comparison is constant-time.
    ///
    /// ## Returns
    ///
    /// - `Ok(true)` - password matches
    /// - `Ok(false)` - password doesn't match
    /// - `Err(...)` - invalid hash format or other error
    pub async fn verify(&self, password: &str, hash: &str) -> Result<bool, ApiError> {
        let password = password.to_string();
        let hash = hash.to_string();

        tokio::task::spawn_blocking(move || bcrypt::verify(password, &hash))
            .await
            .map_err(|e| ApiError::Internal {
                message: format!("Verification task failed: {}", e),
            })?
            .map_err(|e| ApiError::Internal {
                message: format!("Password verification failed: {}", e),
            })
    }
}

// Implement Debug manually to avoid exposing internal state
impl std::fmt::Debug for PasswordHasher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PasswordHasher").finish_non_exhaustive()
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    // bcrypt's minimum cost keeps the suite fast; production uses 12.
    fn test_hasher() -> PasswordHasher {
        PasswordHasher::with_cost(4)
    }

    #[tokio::test]
    async fn test_hash_and_verify_correct_password() {
        let hasher = test_hasher();
        let password = "MySecureP@ssw0rd!";

        let hash = hasher.hash(password).await.unwrap();

        // Hash should be different from plaintext
        assert_ne!(hash, password);

        // Verification should pass with correct password
        assert!(hasher.verify(password, &hash).await.unwrap());
    }

    #[tokio::test]
    async fn test_verify_wrong_password() {
        let hasher = test_hasher();

        let hash = hasher.hash("MySecureP@ssw0rd!").await.unwrap();

        assert!(!hasher.verify("WrongP@ssw0rd!", &hash).await.unwrap());
    }

    #[tokio::test]
    async fn test_different_hashes_for_same_password() {
        let hasher = test_hasher();
        let password = "MySecureP@ssw0rd!";

        let hash1 = hasher.hash(password).await.unwrap();
        let hash2 = hasher.hash(password).await.unwrap();

        // Each hash should be unique due to random salt
        assert_ne!(hash1, hash2);

        // But both should verify correctly
        assert!(hasher.verify(password, &hash1).await.unwrap());
        assert!(hasher.verify(password, &hash2).await.unwrap());
    }

    #[tokio::test]
    async fn test_hash_is_modular_crypt_format() {
        let hasher = test_hasher();
        let hash = hasher.hash("TestP@ssw0rd!").await.unwrap();

        // bcrypt hashes start with the $2 version prefix
        assert!(hash.starts_with("$2"));
    }

    #[test]
    fn test_production_cost() {
        assert_eq!(BCRYPT_COST, 12);
        // Default constructor uses the production cost
        let hasher = PasswordHasher::new();
        assert_eq!(hasher.cost, BCRYPT_COST);
    }
}
