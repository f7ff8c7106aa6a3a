//! Collaborators the services talk to
//!
//! The platform notification scheduler and the device authentication
//! prompt live outside the store; services only see these traits.

use crate::error::Result;
use std::future::Future;

/// Schedules and cancels reminder notifications
pub trait NotificationScheduler: Send + Sync {
    /// Schedule a notification at `at_ms` (epoch milliseconds).
    ///
    /// Returns the platform handle, or `None` when nothing was scheduled.
    fn schedule(
        &self,
        title: &str,
        at_ms: i64,
    ) -> impl Future<Output = Result<Option<String>>> + Send;

    fn cancel(&self, handle: &str) -> impl Future<Output = Result<()>> + Send;
}

/// Asks the user to prove they may read locked notes
pub trait AuthGate: Send + Sync {
    fn authenticate(&self) -> impl Future<Output = bool> + Send;
}

/// Cancel every handle. The notes are already gone or binned, so a failed
/// cancellation is logged and the rest still run.
pub(crate) async fn cancel_all<S: NotificationScheduler>(scheduler: &S, handles: &[String]) {
    for handle in handles {
        if let Err(e) = scheduler.cancel(handle).await {
            tracing::warn!("Failed to cancel notification {}: {}", handle, e);
        }
    }
}
