//! Cancellation and deadline carrier for health checks and shutdown hooks.
//!
//! A [`Context`] is cheap to clone; clones share the same cancellation
//! state. Hooks that accept a context should return promptly once
//! [`Context::done`] resolves.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::sync::Notify;
use tokio::time::Instant;

use crate::error::KhidmaError;

/// Shared cancellation flag.
#[derive(Debug, Default)]
struct Cancellation {
    flag: AtomicBool,
    notify: Notify,
}

impl Cancellation {
    fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::Acquire)
    }

    fn cancel(&self) -> bool {
        let first = self
            .flag
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok();
        if first {
            self.notify.notify_waiters();
        }
        first
    }

    async fn cancelled(&self) {
        loop {
            // Registered before the check so a concurrent cancel cannot be missed.
            let notified = self.notify.notified();
            if self.is_cancelled() {
                return;
            }
            notified.await;
        }
    }
}

/// Execution context handed to health checks and shutdown hooks.
///
/// # Examples
/// ```
/// use khidma_service::context::Context;
/// use std::time::Duration;
///
/// let ctx = Context::background();
/// assert!(ctx.err().is_none());
///
/// let bounded = ctx.with_timeout(Duration::from_secs(5));
/// assert!(bounded.deadline().is_some());
///
/// ctx.cancel();
/// assert!(bounded.is_cancelled());
/// ```
#[derive(Debug, Clone, Default)]
pub struct Context {
    cancellation: Arc<Cancellation>,
    deadline: Option<Instant>,
}

impl Context {
    /// A context that is never cancelled and has no deadline.
    pub fn background() -> Self {
        Self::default()
    }

    /// Derives a context sharing this one's cancellation, expiring after `timeout`.
    ///
    /// An earlier existing deadline is kept.
    pub fn with_timeout(&self, timeout: Duration) -> Self {
        self.with_deadline(Instant::now() + timeout)
    }

    /// Derives a context sharing this one's cancellation, expiring at `deadline`.
    pub fn with_deadline(&self, deadline: Instant) -> Self {
        let deadline = match self.deadline {
            Some(current) if current <= deadline => current,
            _ => deadline,
        };
        Self {
            cancellation: Arc::clone(&self.cancellation),
            deadline: Some(deadline),
        }
    }

    /// Cancels this context and every context derived from it.
    ///
    /// Returns `true` if this call performed the cancellation.
    pub fn cancel(&self) -> bool {
        self.cancellation.cancel()
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancellation.is_cancelled()
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Time left before the deadline, `None` when there is no deadline.
    pub fn remaining(&self) -> Option<Duration> {
        self.deadline
            .map(|deadline| deadline.saturating_duration_since(Instant::now()))
    }

    /// Why the context is done, or `None` while it is still live.
    ///
    /// Cancellation wins over an expired deadline.
    pub fn err(&self) -> Option<KhidmaError> {
        if self.is_cancelled() {
            return Some(KhidmaError::Cancelled);
        }
        match self.deadline {
            Some(deadline) if Instant::now() >= deadline => Some(KhidmaError::DeadlineExceeded),
            _ => None,
        }
    }

    /// Resolves once the context is cancelled or its deadline passes.
    pub async fn done(&self) {
        match self.deadline {
            Some(deadline) => {
                tokio::select! {
                    _ = self.cancellation.cancelled() => {}
                    _ = tokio::time::sleep_until(deadline) => {}
                }
            }
            None => self.cancellation.cancelled().await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn background_is_live() {
        let ctx = Context::background();
        assert!(!ctx.is_cancelled());
        assert!(ctx.deadline().is_none());
        assert!(ctx.remaining().is_none());
        assert!(ctx.err().is_none());
    }

    #[test]
    fn cancel_is_shared_with_children() {
        let parent = Context::background();
        let child = parent.with_timeout(Duration::from_secs(60));

        assert!(child.cancel());
        assert!(!parent.cancel());
        assert!(parent.is_cancelled());
        assert!(matches!(child.err(), Some(KhidmaError::Cancelled)));
    }

    #[test]
    fn earlier_deadline_is_kept() {
        let parent = Context::background().with_timeout(Duration::from_millis(10));
        let child = parent.with_timeout(Duration::from_secs(60));
        assert_eq!(parent.deadline(), child.deadline());
    }

    #[tokio::test]
    async fn expired_deadline_reports_error() {
        let ctx = Context::background().with_timeout(Duration::from_millis(1));
        ctx.done().await;
        assert!(matches!(ctx.err(), Some(KhidmaError::DeadlineExceeded)));
    }

    #[tokio::test]
    async fn done_wakes_on_cancel() {
        let ctx = Context::background();
        let waiter = {
            let ctx = ctx.clone();
            tokio::spawn(async move { ctx.done().await })
        };

        tokio::task::yield_now().await;
        ctx.cancel();

        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .expect("done() should resolve after cancel")
            .unwrap();
    }
}
