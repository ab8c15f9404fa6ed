use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::Notify;

/// Cooperative cancellation flag shared between the interactive context,
/// a run's supervisor and its worker.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
    notify: Arc<Notify>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation. Idempotent.
    pub fn cancel(&self) {
        if !self.flag.swap(true, Ordering::SeqCst) {
            // single waiter (the supervisor); a stored permit covers the race
            // where it has not started waiting yet
            self.notify.notify_one();
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    /// Resolves once cancellation has been requested.
    pub async fn requested(&self) {
        if self.is_cancelled() {
            return;
        }
        self.notify.notified().await;
    }
}

/// Error returned by [`check_cancelled`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{operation} cancelled")]
pub struct Cancelled {
    pub operation: String,
}

/// Checkpoint for long-running command code: `check_cancelled(&token, "ls")?`.
pub fn check_cancelled(token: &CancelToken, operation: &str) -> Result<(), Cancelled> {
    if token.is_cancelled() {
        Err(Cancelled {
            operation: operation.to_string(),
        })
    } else {
        Ok(())
    }
}
