use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::info;
use uuid::Uuid;

/// Delivers password-reset tokens to account holders.
#[async_trait]
pub trait ResetNotifier: Send + Sync {
    async fn send_reset(
        &self,
        account_id: Uuid,
        email: &str,
        token: &str,
        expires_at: DateTime<Utc>,
    ) -> anyhow::Result<()>;
}

/// Logs that a reset was issued without writing the token anywhere.
///
/// Stands in for a mail transport in development. Wire a real sender in
/// through [`ResetNotifier`] for production.
#[derive(Debug, Clone, Default)]
pub struct LoggingResetNotifier;

#[async_trait]
impl ResetNotifier for LoggingResetNotifier {
    async fn send_reset(
        &self,
        account_id: Uuid,
        email: &str,
        _token: &str,
        expires_at: DateTime<Utc>,
    ) -> anyhow::Result<()> {
        info!(
            account_id = %account_id,
            email_domain = email.rsplit('@').next().unwrap_or(""),
            expires_at = %expires_at,
            "Password reset token issued [token redacted]"
        );
        Ok(())
    }
}
