//! # Request Validation Helpers
//!
//! Utilities for validating incoming request data using the `validator` crate.
//!
//! ## Overview
//!
//! | Component | Purpose |
//! |-----------|---------|
//! | [`validate_request`] | Validate a struct implementing `Validate` |
//! | [`validators`] | Custom validation functions |
//!
//! ## How Validation Works
//!
//! We use the [`validator`](https://docs.rs/validator/) crate which provides
//! derive macros for declarative validation:
//!
//! ```rust,ignore
//! use validator::Validate;
//!
//! #[derive(Validate)]
//! struct SignupRequest {
//!     #[validate(custom(function = "validators::valid_username"))]
//!     username: String,
//!
//!     #[validate(email)]
//!     email: String,
//!
//!     #[validate(length(min = 10))]
//!     password: String,
//! }
//! ```
//!
//! When validation fails, the API returns 400 with `VALIDATION_ERROR` and
//! field-level diagnostics in the envelope's `details`.

use crate::errors::ApiError;
use validator::Validate;

// =============================================================================
// Core Validation Functions
// =============================================================================

/// Validates a request DTO that implements `Validate`.
///
/// This is the primary validation function. Use it in handlers to
/// validate incoming data:
///
/// ```rust,ignore
/// async fn signup(body: Json<SignupRequest>) -> Result<impl Responder, ApiError> {
///     validate_request(&body)?;  // Returns early if invalid
///     // Continue with validated data
/// }
/// ```
///
/// ## Errors
///
/// Returns `ApiError::ValidationError` with field-level details if validation fails.
pub fn validate_request<T: Validate>(data: &T) -> Result<(), ApiError> {
    data.validate().map_err(ApiError::ValidationError)
}

// =============================================================================
// Custom Validators
// =============================================================================

/// Custom validation functions for use with `#[validate(custom)]`.
///
/// These functions follow the validator crate's signature:
/// `fn(&T) -> Result<(), ValidationError>`
pub mod validators {
    use validator::ValidationError;

    /// Message content types accepted on the wire.
    pub const ALLOWED_MESSAGE_TYPES: &[&str] = &["text", "image", "file"];

    /// Validates that a string is not blank (empty or whitespace-only).
    pub fn not_blank(value: &str) -> Result<(), ValidationError> {
        if value.trim().is_empty() {
            return Err(ValidationError::new("blank"));
        }
        Ok(())
    }

    /// Validates a username.
    ///
    /// ## Rules
    ///
    /// - 3 to 50 characters
    /// - Letters, digits, underscore, hyphen, dot
    /// - Must start with a letter or digit
    ///
    /// ## Valid Examples
    ///
    /// - `"alice"` ✓
    /// - `"bob_42"` ✓
    /// - `"carol.smith"` ✓
    ///
    /// ## Invalid Examples
    ///
    /// - `"ab"` ✗ (too short)
    /// - `"_alice"` ✗ (leading separator)
    /// - `"has spaces"` ✗
    pub fn valid_username(value: &str) -> Result<(), ValidationError> {
        if value.len() < 3 || value.len() > 50 {
            return Err(ValidationError::new("username_length"));
        }

        if !value
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-' || c == '.')
        {
            return Err(ValidationError::new("username_charset"));
        }

        // First character anchors display and lookup; keep it alphanumeric.
        if !value.chars().next().is_some_and(|c| c.is_ascii_alphanumeric()) {
            return Err(ValidationError::new("username_charset"));
        }

        Ok(())
    }

    /// Validates a message content type against the allowed set.
    pub fn valid_message_type(value: &str) -> Result<(), ValidationError> {
        if ALLOWED_MESSAGE_TYPES.contains(&value) {
            Ok(())
        } else {
            Err(ValidationError::new("invalid_message_type"))
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::validators::*;

    #[test]
    fn test_not_blank_valid() {
        assert!(not_blank("hello").is_ok());
        assert!(not_blank("  hello  ").is_ok());
        assert!(not_blank("a").is_ok());
    }

    #[test]
    fn test_not_blank_invalid() {
        assert!(not_blank("").is_err());
        assert!(not_blank("   ").is_err());
        assert!(not_blank("\t\n").is_err());
    }

    #[test]
    fn test_valid_username_accepts_common_forms() {
        assert!(valid_username("alice").is_ok());
        assert!(valid_username("bob_42").is_ok());
        assert!(valid_username("carol.smith").is_ok());
        assert!(valid_username("d-a-n").is_ok());
        assert!(valid_username("abc").is_ok());
    }

    #[test]
    fn test_valid_username_length_bounds() {
        assert!(valid_username("ab").is_err());
        assert!(valid_username(&"a".repeat(50)).is_ok());
        assert!(valid_username(&"a".repeat(51)).is_err());
    }

    #[test]
    fn test_valid_username_rejects_bad_charset() {
        assert!(valid_username("has spaces").is_err());
        assert!(valid_username("émile").is_err());
        assert!(valid_username("semi;colon").is_err());
    }

    #[test]
    fn test_valid_username_rejects_leading_separator() {
        assert!(valid_username("_alice").is_err());
        assert!(valid_username(".alice").is_err());
        assert!(valid_username("-alice").is_err());
    }

    #[test]
    fn test_valid_message_type() {
        assert!(valid_message_type("text").is_ok());
        assert!(valid_message_type("image").is_ok());
        assert!(valid_message_type("file").is_ok());
        assert!(valid_message_type("video").is_err());
        assert!(valid_message_type("TEXT").is_err());
        assert!(valid_message_type("").is_err());
    }
}
