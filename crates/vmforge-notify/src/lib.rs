//! # vmforge-notify: best-effort email notifications
//!
//! A send failure here is logged and discarded, never propagated back
//! into the write path or retried inline — the event that triggered it
//! has already been durably committed regardless of whether anyone
//! gets emailed about it.

use async_trait::async_trait;
use serde_json::Value;
use vmforge_types::TenantId;

#[derive(Debug, thiserror::Error)]
pub enum NotificationError {
    #[error("notification transport unavailable: {0}")]
    TransportUnavailable(String),
}

/// Fires a templated email. The core never renders templates itself;
/// `template_name` and `context` are handed to whatever templating
/// and SMTP delivery the edge wires in.
#[async_trait]
pub trait NotificationPort: Send + Sync {
    async fn send_email(
        &self,
        tenant_id: TenantId,
        recipient: &str,
        subject: &str,
        template_name: &str,
        context: &Value,
    ) -> Result<(), NotificationError>;
}

/// Default implementation: logs what would have been sent instead of
/// sending it. Used in development and wherever no real transport is
/// configured.
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingNotifier;

#[async_trait]
impl NotificationPort for LoggingNotifier {
    async fn send_email(
        &self,
        tenant_id: TenantId,
        recipient: &str,
        subject: &str,
        template_name: &str,
        context: &Value,
    ) -> Result<(), NotificationError> {
        tracing::info!(
            tenant_id = %tenant_id,
            recipient,
            subject,
            template_name,
            %context,
            "notification (no transport configured, logging only)"
        );
        Ok(())
    }
}

/// Sends the notification and swallows any failure, logging it instead.
/// The helper command/projection callers use so a flaky transport
/// never becomes a caller's problem.
pub async fn notify_best_effort(
    port: &dyn NotificationPort,
    tenant_id: TenantId,
    recipient: &str,
    subject: &str,
    template_name: &str,
    context: &Value,
) {
    if let Err(e) = port.send_email(tenant_id, recipient, subject, template_name, context).await {
        tracing::warn!(tenant_id = %tenant_id, recipient, template_name, error = %e, "notification send failed, continuing");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn logging_notifier_never_fails() {
        let notifier = LoggingNotifier;
        let result = notifier
            .send_email(TenantId::new_v4(), "alice@example.com", "Request approved", "request_approved", &json!({"vm_name": "web-01"}))
            .await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn notify_best_effort_swallows_transport_failures() {
        struct AlwaysFails;
        #[async_trait]
        impl NotificationPort for AlwaysFails {
            async fn send_email(&self, _: TenantId, _: &str, _: &str, _: &str, _: &Value) -> Result<(), NotificationError> {
                Err(NotificationError::TransportUnavailable("smtp down".into()))
            }
        }

        // Must not panic or propagate — this is the whole point.
        notify_best_effort(&AlwaysFails, TenantId::new_v4(), "bob@example.com", "subject", "template", &json!({})).await;
    }
}
