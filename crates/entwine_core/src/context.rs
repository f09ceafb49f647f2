//! Cooperative cancellation and deadlines.
//!
//! Transactions check their context at every suspension point: before each
//! read, at the top of each callback dispatch during iteration, and before
//! commit. Cancellation is cooperative; a closure that never reaches a
//! suspension point cannot be aborted from outside.

use crate::error::{Error, Result};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// A cancellation scope threaded through transactions and queries.
///
/// Contexts form a chain: a child created with [`Context::with_timeout`] or
/// [`Context::with_cancel`] is cancelled whenever any ancestor is. The
/// default context never expires.
#[derive(Debug, Clone, Default)]
pub struct Context {
    inner: Option<Arc<Inner>>,
}

#[derive(Debug)]
struct Inner {
    deadline: Option<Instant>,
    cancelled: AtomicBool,
    parent: Option<Arc<Inner>>,
}

impl Context {
    /// The empty root context; never cancelled, no deadline.
    #[must_use]
    pub fn background() -> Self {
        Self::default()
    }

    /// Derives a context that expires `timeout` from now.
    #[must_use]
    pub fn with_timeout(&self, timeout: Duration) -> Self {
        self.with_deadline(Instant::now() + timeout)
    }

    /// Derives a context that expires at `deadline`.
    #[must_use]
    pub fn with_deadline(&self, deadline: Instant) -> Self {
        Self {
            inner: Some(Arc::new(Inner {
                deadline: Some(deadline),
                cancelled: AtomicBool::new(false),
                parent: self.inner.clone(),
            })),
        }
    }

    /// Derives a manually cancellable context.
    #[must_use]
    pub fn with_cancel(&self) -> (Self, CancelHandle) {
        let inner = Arc::new(Inner {
            deadline: None,
            cancelled: AtomicBool::new(false),
            parent: self.inner.clone(),
        });
        (
            Self {
                inner: Some(Arc::clone(&inner)),
            },
            CancelHandle { inner },
        )
    }

    /// Returns an error if this context or any ancestor is done.
    pub fn check(&self) -> Result<()> {
        let mut current = self.inner.as_deref();
        while let Some(inner) = current {
            if inner.cancelled.load(Ordering::Acquire) {
                return Err(Error::Cancelled);
            }
            if let Some(deadline) = inner.deadline {
                if Instant::now() >= deadline {
                    return Err(Error::DeadlineExceeded);
                }
            }
            current = inner.parent.as_deref();
        }
        Ok(())
    }

    /// The nearest deadline along the chain, if any.
    #[must_use]
    pub fn deadline(&self) -> Option<Instant> {
        let mut nearest: Option<Instant> = None;
        let mut current = self.inner.as_deref();
        while let Some(inner) = current {
            if let Some(deadline) = inner.deadline {
                nearest = Some(nearest.map_or(deadline, |n| n.min(deadline)));
            }
            current = inner.parent.as_deref();
        }
        nearest
    }
}

/// Cancels the context it was created alongside.
#[derive(Debug, Clone)]
pub struct CancelHandle {
    inner: Arc<Inner>,
}

impl CancelHandle {
    /// Marks the context (and every context derived from it) as cancelled.
    pub fn cancel(&self) {
        self.inner.cancelled.store(true, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn background_never_done() {
        Context::background().check().unwrap();
    }

    #[test]
    fn timeout_expires() {
        let ctx = Context::background().with_timeout(Duration::from_millis(5));
        ctx.check().unwrap();
        std::thread::sleep(Duration::from_millis(10));
        assert!(matches!(ctx.check(), Err(Error::DeadlineExceeded)));
    }

    #[test]
    fn cancel_handle_cancels() {
        let (ctx, handle) = Context::background().with_cancel();
        ctx.check().unwrap();
        handle.cancel();
        assert!(matches!(ctx.check(), Err(Error::Cancelled)));
    }

    #[test]
    fn child_observes_parent_cancellation() {
        let (parent, handle) = Context::background().with_cancel();
        let child = parent.with_timeout(Duration::from_secs(60));
        handle.cancel();
        assert!(matches!(child.check(), Err(Error::Cancelled)));
    }

    #[test]
    fn nearest_deadline_wins() {
        let far = Context::background().with_timeout(Duration::from_secs(60));
        let near = far.with_timeout(Duration::from_millis(1));
        let deadline = near.deadline().unwrap();
        assert!(deadline <= Instant::now() + Duration::from_secs(1));
    }
}
