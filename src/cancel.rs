//! Cooperative cancellation shared by every long-running operation.
//!
//! A [`CancelToken`] wraps an `Arc<AtomicBool>` flag plus an optional
//! deadline. Clones share the flag, so cancelling any clone (for example from
//! the Ctrl-C handler installed by `main`) stops every loop and subprocess
//! that holds one. [`CancelToken::with_timeout`] derives a child token with a
//! tighter deadline while still observing the parent's flag.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use crate::error::Interrupted;

/// A cheaply-clonable cancellation flag with an optional deadline.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    cancelled: Arc<AtomicBool>,
    deadline: Option<Instant>,
}

impl CancelToken {
    /// Create a token that is not cancelled and has no deadline.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation. Every clone observes the request.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    /// Returns `true` once [`cancel`](Self::cancel) has been called on any clone.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }

    /// Derive a child token that shares the cancellation flag and expires
    /// after `timeout`, or at the parent's deadline if that is sooner.
    ///
    /// A zero `timeout` means "no additional deadline".
    #[must_use]
    pub fn with_timeout(&self, timeout: Duration) -> Self {
        if timeout.is_zero() {
            return self.clone();
        }
        let candidate = Instant::now().checked_add(timeout);
        let deadline = match (self.deadline, candidate) {
            (Some(parent), Some(child)) => Some(parent.min(child)),
            (parent, child) => parent.or(child),
        };
        Self {
            cancelled: Arc::clone(&self.cancelled),
            deadline,
        }
    }

    /// Time left before the deadline, or `None` when there is no deadline.
    #[must_use]
    pub fn remaining(&self) -> Option<Duration> {
        self.deadline
            .map(|d| d.saturating_duration_since(Instant::now()))
    }

    /// Returns an error if the token was cancelled or its deadline passed.
    ///
    /// # Errors
    ///
    /// Returns [`Interrupted::Cancelled`] after [`cancel`](Self::cancel) and
    /// [`Interrupted::DeadlineExceeded`] once the deadline has elapsed.
    pub fn check(&self) -> Result<(), Interrupted> {
        if self.is_cancelled() {
            return Err(Interrupted::Cancelled);
        }
        if self.deadline.is_some_and(|d| Instant::now() >= d) {
            return Err(Interrupted::DeadlineExceeded);
        }
        Ok(())
    }
}
