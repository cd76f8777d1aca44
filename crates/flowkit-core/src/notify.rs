//! Notification port for step handlers.
//!
//! Steps can emit user-facing notifications (for example after storing a
//! document or when a run needs attention). Delivery is best-effort: a
//! failed notification is logged and swallowed, never failing the step.

use async_trait::async_trait;
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("notification delivery failed: {0}")]
    Delivery(String),
}

/// A user-facing notification emitted from a workflow step.
#[derive(Debug, Clone)]
pub struct Notification {
    pub tenant_id: Uuid,
    pub title: String,
    pub message: String,
    /// Severity/category, e.g. "info", "warning", "error".
    pub kind: String,
    /// Originating subsystem, e.g. "workflow".
    pub source: String,
    /// Identifier of the originating entity (execution id, workflow id).
    pub source_id: Option<Uuid>,
}

/// Object-safe delivery port. Handlers receive it as `Arc<dyn Notifier>`
/// via [`crate::registry::StepServices`].
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, notification: Notification) -> Result<(), NotifyError>;
}

/// Default notifier that writes notifications to the tracing log.
#[derive(Debug, Default, Clone)]
pub struct TracingNotifier;

#[async_trait]
impl Notifier for TracingNotifier {
    async fn notify(&self, notification: Notification) -> Result<(), NotifyError> {
        tracing::info!(
            tenant_id = %notification.tenant_id,
            kind = %notification.kind,
            source = %notification.source,
            title = %notification.title,
            "notification: {}",
            notification.message
        );
        Ok(())
    }
}

/// Deliver a notification, logging and discarding any failure.
pub async fn notify_best_effort(notifier: &dyn Notifier, notification: Notification) {
    let tenant_id = notification.tenant_id;
    if let Err(err) = notifier.notify(notification).await {
        tracing::warn!(tenant_id = %tenant_id, error = %err, "notification dropped");
    }
}
