//! Sliding-window rate constraint.
//!
//! Keeps the instants of the most recent grants (at most `capacity` of them)
//! and makes callers wait until fewer than `capacity` grants fall inside the
//! trailing `window`.

use std::collections::VecDeque;
use std::time::Duration;

use tokio::sync::{Mutex, MutexGuard};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::RateLimitError;

/// `capacity` grants per rolling `window`.
#[derive(Debug)]
pub struct RateWindow {
    capacity: usize,
    window: Duration,
    /// Newest first. Never longer than `capacity`.
    stamps: Mutex<VecDeque<Instant>>,
}

impl RateWindow {
    /// Create a window allowing `capacity` grants per `window`.
    pub fn new(capacity: usize, window: Duration) -> Result<Self, RateLimitError> {
        if capacity == 0 {
            return Err(RateLimitError::InvalidPolicy(
                "capacity must be strictly positive".to_string(),
            ));
        }
        if window.is_zero() {
            return Err(RateLimitError::InvalidPolicy(
                "window must be strictly positive".to_string(),
            ));
        }

        Ok(Self {
            capacity,
            window,
            stamps: Mutex::new(VecDeque::with_capacity(capacity + 1)),
        })
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// A window with the same policy and no history.
    pub fn fresh(&self) -> Self {
        Self {
            capacity: self.capacity,
            window: self.window,
            stamps: Mutex::new(VecDeque::with_capacity(self.capacity + 1)),
        }
    }

    /// Wait until a grant is permitted, then record it.
    pub async fn acquire(&self, cancel: &CancellationToken) -> Result<(), RateLimitError> {
        self.reserve(cancel).await?.commit(Instant::now());
        Ok(())
    }

    /// Wait until a grant is permitted without recording it yet.
    ///
    /// The timestamp stack stays locked until the reservation is committed or
    /// dropped, so concurrent callers queue behind each other instead of all
    /// waking on the same freed slot. Dropping the reservation records nothing.
    pub async fn reserve(
        &self,
        cancel: &CancellationToken,
    ) -> Result<WindowReservation<'_>, RateLimitError> {
        let stamps = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(RateLimitError::Cancelled),
            guard = self.stamps.lock() => guard,
        };

        let wait = wait_time(&stamps, self.capacity, self.window, Instant::now());
        if !wait.is_zero() {
            debug!(
                "Rate window {}/{:?} full, waiting {:?}",
                self.capacity, self.window, wait
            );
            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(RateLimitError::Cancelled),
                _ = tokio::time::sleep(wait) => {}
            }
        }

        Ok(WindowReservation {
            stamps,
            capacity: self.capacity,
        })
    }

    /// Time a caller arriving now would have to wait.
    pub async fn time_until_ready(&self) -> Duration {
        let stamps = self.stamps.lock().await;
        wait_time(&stamps, self.capacity, self.window, Instant::now())
    }

    /// Recorded grant instants, newest first.
    pub async fn timestamps(&self) -> Vec<Instant> {
        self.stamps.lock().await.iter().copied().collect()
    }
}

/// A granted-but-unrecorded slot in a [`RateWindow`].
#[derive(Debug)]
pub struct WindowReservation<'a> {
    stamps: MutexGuard<'a, VecDeque<Instant>>,
    capacity: usize,
}

impl WindowReservation<'_> {
    /// Record the grant at `at`, evicting the oldest entry past capacity.
    ///
    /// `at` must not precede the moment the reservation became ready.
    pub fn commit(mut self, at: Instant) {
        self.stamps.push_front(at);
        self.stamps.truncate(self.capacity);
    }
}

/// Walk newest to oldest counting grants inside the window ending at `now`.
fn wait_time(
    stamps: &VecDeque<Instant>,
    capacity: usize,
    window: Duration,
    now: Instant,
) -> Duration {
    let mut count = 0;
    let mut oldest = None;
    for stamp in stamps {
        if now.saturating_duration_since(*stamp) >= window {
            break;
        }
        count += 1;
        oldest = Some(*stamp);
    }

    match oldest {
        Some(oldest) if count >= capacity => (oldest + window).saturating_duration_since(now),
        _ => Duration::ZERO,
    }
}
