//! Cooperative cancellation.

use crate::error::{SyncError, SyncResult};
use crate::pipe::PipeHandle;
use parking_lot::{Condvar, Mutex};
use std::sync::Arc;
use std::time::{Duration, Instant};

#[derive(Default)]
struct Inner {
    cancelled: Mutex<bool>,
    wake: Condvar,
    pipes: Mutex<Vec<PipeHandle>>,
}

/// A cloneable cancellation token.
///
/// Cancelling interrupts an interval wait at once and aborts every pipe
/// registered with the token, which unblocks both ends of the outbound
/// stream.
#[derive(Clone, Default)]
pub struct CancelToken {
    inner: Arc<Inner>,
}

impl CancelToken {
    /// Creates a token that is not cancelled.
    pub fn new() -> Self {
        Self::default()
    }

    /// Cancels the token.
    pub fn cancel(&self) {
        *self.inner.cancelled.lock() = true;
        self.inner.wake.notify_all();
        for pipe in self.inner.pipes.lock().drain(..) {
            pipe.abort();
        }
    }

    /// Returns true if the token was cancelled.
    pub fn is_cancelled(&self) -> bool {
        *self.inner.cancelled.lock()
    }

    /// Returns `Err(SyncError::Cancelled)` if the token was cancelled.
    pub fn check(&self) -> SyncResult<()> {
        if self.is_cancelled() {
            Err(SyncError::Cancelled)
        } else {
            Ok(())
        }
    }

    /// Sleeps for `duration` unless cancelled first.
    ///
    /// Returns true if the sleep was cut short by cancellation.
    pub fn sleep(&self, duration: Duration) -> bool {
        let deadline = Instant::now() + duration;
        let mut cancelled = self.inner.cancelled.lock();
        while !*cancelled {
            if self
                .inner
                .wake
                .wait_until(&mut cancelled, deadline)
                .timed_out()
            {
                break;
            }
        }
        *cancelled
    }

    /// Registers a pipe to be aborted on cancellation.
    pub fn register_pipe(&self, pipe: PipeHandle) {
        let mut pipes = self.inner.pipes.lock();
        pipes.retain(|p| !p.is_finished());
        pipes.push(pipe);
        // `cancel` sets the flag before draining, so one of the two sides sees the pipe.
        if self.is_cancelled() {
            for pipe in pipes.drain(..) {
                pipe.abort();
            }
        }
    }
}

impl std::fmt::Debug for CancelToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CancelToken")
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}
