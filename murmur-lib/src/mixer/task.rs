//! Cancellable background tasks driving fades and effects.
//!
//! Every fade, breathing ticker and pan walk runs on its own thread and owns a
//! [`CancelToken`]. Tasks sleep on the token so cancellation wakes them at
//! once, and they re-check the token under the voice lock before writing, so a
//! cancelled task never mutates state after the cancelling call returns.

use std::sync::{Arc, Condvar, Mutex};
use std::thread;
use std::time::Duration;

use log::error;

use crate::tools::sync::lock;

/// Shared cancellation flag with a wake-up for sleeping tasks.
#[derive(Debug, Default)]
pub(crate) struct CancelToken {
    cancelled: Mutex<bool>,
    wake: Condvar,
}

impl CancelToken {
    pub(crate) fn cancel(&self) {
        *lock(&self.cancelled) = true;
        self.wake.notify_all();
    }

    pub(crate) fn is_cancelled(&self) -> bool {
        *lock(&self.cancelled)
    }

    /// Sleep for `duration` or until cancelled.
    ///
    /// Returns `false` when the token was cancelled.
    pub(crate) fn sleep(&self, duration: Duration) -> bool {
        let guard = lock(&self.cancelled);
        let (guard, _) = self
            .wake
            .wait_timeout_while(guard, duration, |cancelled| !*cancelled)
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        !*guard
    }
}

/// Owner handle of a running task. Dropping it cancels the task.
#[derive(Debug)]
pub(crate) struct TaskHandle {
    token: Arc<CancelToken>,
}

impl TaskHandle {
    /// Spawn `body` on a named thread with a fresh token.
    pub(crate) fn spawn<F>(name: &str, body: F) -> Self
    where
        F: FnOnce(Arc<CancelToken>) + Send + 'static,
    {
        let token = Arc::new(CancelToken::default());
        let task_token = token.clone();
        let spawned = thread::Builder::new()
            .name(format!("murmur-{}", name))
            .spawn(move || body(task_token));
        if let Err(err) = spawned {
            error!("failed to spawn {} task: {}", name, err);
            token.cancel();
        }
        Self { token }
    }
}

impl Drop for TaskHandle {
    fn drop(&mut self) {
        self.token.cancel();
    }
}
