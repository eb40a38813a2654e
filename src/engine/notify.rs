use async_trait::async_trait;

use crate::db::models::CheckIn;

/// Outbound notification seam. The server itself only logs; a deployment
/// wires chat or email delivery in behind this trait.
#[async_trait]
pub trait Notifier: Send + Sync {
    /// A new check-in prompt is waiting for its assignee.
    async fn checkin_created(&self, checkin: &CheckIn);

    /// A check-in was escalated to `target` (None when no manager resolved).
    async fn escalation_raised(&self, checkin: &CheckIn, target: Option<&str>, reason: &str);
}

/// Default notifier: structured log lines only.
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn checkin_created(&self, checkin: &CheckIn) {
        tracing::info!(
            checkin_id = %checkin.id,
            task_id = %checkin.task_id,
            user_id = %checkin.user_id,
            cycle = checkin.cycle_number,
            trigger = %checkin.trigger_origin,
            "Check-in prompt created"
        );
    }

    async fn escalation_raised(&self, checkin: &CheckIn, target: Option<&str>, reason: &str) {
        tracing::warn!(
            checkin_id = %checkin.id,
            task_id = %checkin.task_id,
            user_id = %checkin.user_id,
            target = target.unwrap_or("<none>"),
            reason,
            "Check-in escalated"
        );
    }
}
