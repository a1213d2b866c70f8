//! Waiting for the backend to finish preparing chart and table
//!
//! After an upload the backend needs time to build the details. Instead of
//! a single fetch after a fixed delay, the client waits `initial_delay`,
//! then asks; while the backend answers "pending" it keeps asking with a
//! doubling delay capped at `max_backoff`, for at most `max_attempts` GETs.
//!
//! Every wait can be interrupted through a [`CancelToken`]. Cancelling
//! before the first wait ends guarantees that no request is sent.

use crate::api::{Backend, DetailsPoll};
use crate::error::ClientError;
use crate::model::Details;
use std::sync::{Arc, Condvar, Mutex};
use std::time::{Duration, Instant};
use tracing::{debug, info};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollPolicy {
    pub initial_delay: Duration,
    pub max_attempts: u32,
    pub max_backoff: Duration,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_millis(1000),
            max_attempts: 8,
            max_backoff: Duration::from_millis(8000),
        }
    }
}

impl PollPolicy {
    /// Delay before attempt `n` (1-based)
    pub fn delay_before(&self, attempt: u32) -> Duration {
        if attempt <= 1 {
            return self.initial_delay;
        }
        let factor = 1u32.checked_shl(attempt - 1).unwrap_or(u32::MAX);
        self.initial_delay
            .checked_mul(factor)
            .unwrap_or(self.max_backoff)
            .min(self.max_backoff.max(self.initial_delay))
    }
}

/// Shared cancellation flag; cancelling wakes any thread sleeping on it
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    inner: Arc<(Mutex<bool>, Condvar)>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        let (lock, cvar) = &*self.inner;
        let mut cancelled = lock.lock().unwrap_or_else(|e| e.into_inner());
        *cancelled = true;
        cvar.notify_all();
    }

    pub fn is_cancelled(&self) -> bool {
        let (lock, _) = &*self.inner;
        *lock.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Sleep for `duration` unless cancelled first. Returns false when cancelled.
    pub fn sleep(&self, duration: Duration) -> bool {
        let (lock, cvar) = &*self.inner;
        let deadline = Instant::now() + duration;
        let mut cancelled = lock.lock().unwrap_or_else(|e| e.into_inner());

        while !*cancelled {
            let now = Instant::now();
            if now >= deadline {
                return true;
            }
            let (guard, _) = cvar
                .wait_timeout(cancelled, deadline - now)
                .unwrap_or_else(|e| e.into_inner());
            cancelled = guard;
        }
        false
    }
}

/// Poll `/details` until the backend has them, gives up, or `cancel` fires
pub fn poll_details<B: Backend + ?Sized>(
    backend: &B,
    policy: &PollPolicy,
    cancel: &CancelToken,
) -> Result<Details, ClientError> {
    let max_attempts = policy.max_attempts.max(1);

    for attempt in 1..=max_attempts {
        if !cancel.sleep(policy.delay_before(attempt)) {
            debug!(attempt, "details poll cancelled");
            return Err(ClientError::Cancelled);
        }

        debug!(attempt, max_attempts, "requesting details");
        match backend.details()? {
            DetailsPoll::Ready(details) => {
                info!(attempt, "details ready");
                return Ok(details);
            }
            DetailsPoll::Pending => {
                debug!(attempt, "details still pending");
            }
        }
    }

    Err(ClientError::NotReady { attempts: max_attempts })
}
