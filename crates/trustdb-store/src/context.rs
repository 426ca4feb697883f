//! Deadline and cancellation carried into every store operation.
//!
//! A [`Context`] is cheap to clone. Operations check it before touching the
//! engine and race it against every wait (connection acquisition), so an
//! expired or cancelled context aborts the operation instead of letting it
//! complete.

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Notify;
use tokio::time::Instant;

use crate::error::{TrustDbError, TrustDbResult};

#[derive(Debug, Default)]
struct CancelState {
    cancelled: AtomicBool,
    notify: Notify,
    parent: Option<Arc<CancelState>>,
}

impl CancelState {
    fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
            || self.parent.as_ref().is_some_and(|p| p.is_cancelled())
    }

    fn wait(&self) -> Pin<Box<dyn Future<Output = ()> + Send + '_>> {
        Box::pin(async move {
            let parent = async {
                match &self.parent {
                    Some(parent) => parent.wait().await,
                    None => std::future::pending::<()>().await,
                }
            };
            let own = async {
                loop {
                    let notified = self.notify.notified();
                    tokio::pin!(notified);
                    notified.as_mut().enable();
                    if self.cancelled.load(Ordering::Acquire) {
                        return;
                    }
                    notified.await;
                }
            };
            tokio::select! {
                _ = parent => {}
                _ = own => {}
            }
        })
    }
}

/// Execution context: an optional deadline and an optional cancel signal.
#[derive(Clone, Debug, Default)]
pub struct Context {
    deadline: Option<Instant>,
    cancel: Option<Arc<CancelState>>,
}

/// Handle that cancels every clone of the [`Context`] it was created with.
#[derive(Clone, Debug)]
pub struct CancelHandle(Arc<CancelState>);

impl CancelHandle {
    pub fn cancel(&self) {
        self.0.cancelled.store(true, Ordering::Release);
        self.0.notify.notify_waiters();
    }
}

impl Context {
    /// A context that never expires and cannot be cancelled.
    pub fn background() -> Self {
        Self::default()
    }

    /// A context whose deadline is `timeout` from now.
    pub fn with_timeout(timeout: Duration) -> Self {
        Self::background().with_deadline(Instant::now() + timeout)
    }

    /// Tighten the deadline. A later deadline than the current one is ignored.
    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(match self.deadline {
            Some(existing) => existing.min(deadline),
            None => deadline,
        });
        self
    }

    /// Derive a cancellable child context. Cancelling the parent cancels the
    /// child; cancelling the child leaves the parent untouched.
    pub fn with_cancel(mut self) -> (Self, CancelHandle) {
        let state = Arc::new(CancelState {
            parent: self.cancel.take(),
            ..CancelState::default()
        });
        self.cancel = Some(Arc::clone(&state));
        (self, CancelHandle(state))
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Fail fast if the context is already done.
    pub fn check(&self) -> TrustDbResult<()> {
        if self.cancel.as_ref().is_some_and(|c| c.is_cancelled()) {
            return Err(TrustDbError::Cancelled);
        }
        if self.deadline.is_some_and(|d| Instant::now() >= d) {
            return Err(TrustDbError::Timeout);
        }
        Ok(())
    }

    /// Drive `fut` to completion unless the context finishes first.
    pub async fn run<F: Future>(&self, fut: F) -> TrustDbResult<F::Output> {
        self.check()?;

        let cancelled = async {
            match &self.cancel {
                Some(state) => state.wait().await,
                None => std::future::pending::<()>().await,
            }
        };
        let expired = async {
            match self.deadline {
                Some(deadline) => tokio::time::sleep_until(deadline).await,
                None => std::future::pending::<()>().await,
            }
        };

        tokio::select! {
            out = fut => Ok(out),
            _ = cancelled => Err(TrustDbError::Cancelled),
            _ = expired => Err(TrustDbError::Timeout),
        }
    }
}
