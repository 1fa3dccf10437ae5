//! Cooperative cancellation, wall-clock deadlines and progress reporting.
//!
//! Long-running searches and simulations check their [`RunControl`] between
//! evaluations (or paths). Stopping is never an error: callers get the
//! best-so-far result with a `cancelled` / `timed_out` flag set.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::Sender;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Shared cancellation flag. Clones observe the same flag.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    flag: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::Relaxed)
    }
}

/// Why a run stopped early.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    Cancelled,
    TimedOut,
}

/// Run-time controls handed to a long-running call.
///
/// `P` is the progress message type; components that report nothing use `()`.
#[derive(Debug, Clone)]
pub struct RunControl<P = ()> {
    pub cancel: Option<CancellationToken>,
    pub deadline: Option<Instant>,
    pub progress: Option<Sender<P>>,
}

impl<P> Default for RunControl<P> {
    fn default() -> Self {
        Self {
            cancel: None,
            deadline: None,
            progress: None,
        }
    }
}

impl<P> RunControl<P> {
    /// No cancellation, no deadline, no progress channel.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_cancel(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    /// Deadline `timeout` from now.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.deadline = Some(Instant::now() + timeout);
        self
    }

    pub fn with_progress(mut self, sender: Sender<P>) -> Self {
        self.progress = Some(sender);
        self
    }

    /// A copy whose deadline is the earlier of the current one and
    /// `timeout` from now.
    pub fn tightened(&self, timeout: Option<Duration>) -> Self {
        let extra = timeout.map(|t| Instant::now() + t);
        let deadline = match (self.deadline, extra) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        };
        Self {
            cancel: self.cancel.clone(),
            deadline,
            progress: self.progress.clone(),
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.as_ref().is_some_and(CancellationToken::is_cancelled)
    }

    pub fn is_timed_out(&self) -> bool {
        self.deadline.is_some_and(|d| Instant::now() >= d)
    }

    /// Cancellation wins over timeout when both apply.
    pub fn stop_reason(&self) -> Option<StopReason> {
        if self.is_cancelled() {
            Some(StopReason::Cancelled)
        } else if self.is_timed_out() {
            Some(StopReason::TimedOut)
        } else {
            None
        }
    }

    pub fn should_stop(&self) -> bool {
        self.stop_reason().is_some()
    }

    /// Send a progress message. A dropped receiver is ignored.
    pub fn report(&self, message: P) {
        if let Some(tx) = &self.progress {
            let _ = tx.send(message);
        }
    }
}
