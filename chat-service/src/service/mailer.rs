//! # Mailer Interface
//!
//! Outgoing mail is an external collaborator: this module defines the
//! seam the auth service talks to, not a mail implementation. The default
//! [`LogMailer`] writes reset links to the log, which is exactly what
//! development and test environments want. Deployments with the SMTP
//! section configured can wire in a real implementation behind the same
//! trait.

use async_trait::async_trait;
use shared::errors::ApiError;
use tracing::info;

/// Seam for outgoing mail.
///
/// Implementations must never fail loudly enough to leak whether an email
/// address exists - the caller already guarantees silent success at the
/// API boundary.
#[async_trait]
pub trait Mailer: Send + Sync {
    /// Sends a password-reset link to `email`.
    async fn send_password_reset(&self, email: &str, reset_link: &str) -> Result<(), ApiError>;
}

/// Default mailer: logs the reset link instead of sending it.
pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    async fn send_password_reset(&self, email: &str, reset_link: &str) -> Result<(), ApiError> {
        // The link carries the plaintext reset token; LogMailer is for
        // development and test environments only.
        info!(email = %email, reset_link = %reset_link, "Password reset link (log mailer)");
        Ok(())
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_log_mailer_always_succeeds() {
        let mailer = LogMailer;
        assert!(mailer
            .send_password_reset("alice@example.com", "https://chat.example.com/reset?t=abc")
            .await
            .is_ok());
    }
}
