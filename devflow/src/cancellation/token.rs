//! Cancellation token for cooperative cancellation.

use parking_lot::RwLock;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::warn;

/// A callback type for cancellation notifications.
pub type CancelCallback = Box<dyn Fn(&str) + Send + Sync>;

/// A token for cooperative cancellation.
///
/// Share it behind an `Arc` between the caller and the scheduler.
/// Cancellation is idempotent: only the first reason is kept.
#[derive(Default)]
pub struct CancellationToken {
    cancelled: AtomicBool,
    reason: RwLock<Option<String>>,
    callbacks: RwLock<Vec<CancelCallback>>,
}

impl CancellationToken {
    /// Creates a new cancellation token.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests cancellation with a reason.
    ///
    /// Callbacks run immediately on the calling thread. A panicking callback
    /// is logged and suppressed.
    pub fn cancel(&self, reason: impl Into<String>) {
        let reason = reason.into();
        {
            let mut slot = self.reason.write();
            if slot.is_some() {
                return;
            }
            // Reason is stored before the flag is raised.
            *slot = Some(reason.clone());
            self.cancelled.store(true, Ordering::SeqCst);
        }

        let callbacks = std::mem::take(&mut *self.callbacks.write());
        for callback in &callbacks {
            Self::invoke(callback.as_ref(), &reason);
        }
    }

    /// Registers a callback to be invoked on cancellation.
    ///
    /// If already cancelled, the callback is invoked immediately.
    pub fn on_cancel<F>(&self, callback: F)
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        if self.is_cancelled() {
            let reason = self.reason().unwrap_or_default();
            Self::invoke(&callback, &reason);
        } else {
            self.callbacks.write().push(Box::new(callback));
        }
    }

    /// Returns whether cancellation has been requested.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Returns the cancellation reason, if any.
    #[must_use]
    pub fn reason(&self) -> Option<String> {
        self.reason.read().clone()
    }

    fn invoke(callback: &(dyn Fn(&str) + Send + Sync), reason: &str) {
        if let Err(e) = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| callback(reason))) {
            warn!("Cancellation callback panicked: {:?}", e);
        }
    }
}

impl std::fmt::Debug for CancellationToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CancellationToken")
            .field("cancelled", &self.is_cancelled())
            .field("reason", &self.reason())
            .finish()
    }
}
