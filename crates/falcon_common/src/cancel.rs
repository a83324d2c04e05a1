//! Cooperative query cancellation signal.
//!
//! A `CancelToken` is created by the executor for each query execution and
//! cloned into every component that may block on the query's behalf. Blocking
//! components register a listener with [`CancelToken::on_cancel`] so that a
//! cancel wakes them immediately instead of waiting for their next poll.
//!
//! # Usage
//! ```ignore
//! let token = CancelToken::new();
//! let waiter = token.clone();
//!
//! // In a blocking component:
//! waiter.on_cancel(|reason| wake_everyone(reason));
//!
//! // From the session / statement-timeout watchdog:
//! token.cancel("statement timeout"); // listeners run right away
//! ```

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Condvar, Mutex};

type CancelListener = Box<dyn Fn(&str) + Send + Sync>;

/// A cloneable cancellation signal. All clones share one state.
#[derive(Clone)]
pub struct CancelToken {
    inner: Arc<CancelInner>,
}

struct CancelInner {
    flag: AtomicBool,
    reason: Mutex<Option<String>>,
    listeners: Mutex<Vec<CancelListener>>,
    condvar: Condvar,
}

impl CancelToken {
    /// Create a new token in the non-cancelled state.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(CancelInner {
                flag: AtomicBool::new(false),
                reason: Mutex::new(None),
                listeners: Mutex::new(Vec::new()),
                condvar: Condvar::new(),
            }),
        }
    }

    /// Request cancellation. Only the first call records its reason and runs
    /// the listeners; returns `false` for every later call.
    pub fn cancel(&self, reason: impl Into<String>) -> bool {
        let reason = reason.into();
        {
            let mut slot = self.inner.reason.lock();
            if slot.is_some() {
                return false;
            }
            *slot = Some(reason.clone());
            self.inner.flag.store(true, Ordering::SeqCst);
            self.inner.condvar.notify_all();
        }
        // Listeners run outside the lock; they usually take locks of their own.
        let listeners = std::mem::take(&mut *self.inner.listeners.lock());
        for listener in &listeners {
            listener(&reason);
        }
        true
    }

    /// Check if cancellation has been requested (non-blocking).
    pub fn is_cancelled(&self) -> bool {
        self.inner.flag.load(Ordering::SeqCst)
    }

    /// The reason passed to the first `cancel()` call.
    pub fn reason(&self) -> Option<String> {
        self.inner.reason.lock().clone()
    }

    /// Register a listener that runs once when the token is cancelled.
    /// If the token is already cancelled the listener runs immediately on the
    /// calling thread.
    pub fn on_cancel<F>(&self, listener: F)
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        {
            let mut listeners = self.inner.listeners.lock();
            if !self.is_cancelled() {
                listeners.push(Box::new(listener));
                return;
            }
        }
        let reason = self.reason().unwrap_or_default();
        listener(&reason);
    }

    /// Sleep for at most `duration`, but wake immediately if `cancel()` is
    /// called. Returns `true` if cancellation was requested.
    pub fn wait_timeout(&self, duration: Duration) -> bool {
        let mut reason = self.inner.reason.lock();
        if reason.is_none() {
            self.inner.condvar.wait_for(&mut reason, duration);
        }
        reason.is_some()
    }
}

impl Default for CancelToken {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for CancelToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CancelToken")
            .field("cancelled", &self.is_cancelled())
            .field("reason", &self.reason())
            .finish()
    }
}
