//! Progress reporting and cancellation for long-running passes.
//!
//! # Example
//!
//! ```
//! use polykernel::algo::progress::{CancellationToken, Progress};
//!
//! let progress = Progress::new(|current, total, message| {
//!     println!("[{}/{}] {}", current, total, message);
//! });
//! let token = CancellationToken::new();
//! assert!(!token.is_cancelled());
//! # drop(progress);
//! ```

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// A progress callback that receives updates during long-running operations.
///
/// The callback receives:
/// - `current`: Current step
/// - `total`: Total number of steps
/// - `message`: Description of the current operation
///
/// It is always invoked on the thread running the operation.
pub struct Progress {
    callback: Box<dyn Fn(usize, usize, &str) + Send + Sync>,
}

impl Progress {
    /// Create a new progress reporter with the given callback.
    pub fn new<F>(callback: F) -> Self
    where
        F: Fn(usize, usize, &str) + Send + Sync + 'static,
    {
        Self {
            callback: Box::new(callback),
        }
    }

    /// Report progress.
    #[inline]
    pub fn report(&self, current: usize, total: usize, message: &str) {
        (self.callback)(current, total, message);
    }

    /// Create a no-op progress reporter that discards all updates.
    pub fn none() -> Self {
        Self::new(|_, _, _| {})
    }
}

impl Default for Progress {
    fn default() -> Self {
        Self::none()
    }
}

impl std::fmt::Debug for Progress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Progress").finish_non_exhaustive()
    }
}

/// Resolution of the scale [`Stages`] reports on.
pub const PROGRESS_SCALE: usize = 1000;

/// Maps per-stage progress onto one overall scale, each stage taking a
/// share proportional to its weight.
///
/// ```
/// use polykernel::algo::progress::{Progress, Stages, PROGRESS_SCALE};
/// use std::sync::{Arc, Mutex};
///
/// let seen = Arc::new(Mutex::new(Vec::new()));
/// let sink = seen.clone();
/// let progress = Progress::new(move |current, _, _| sink.lock().unwrap().push(current));
///
/// let stages = Stages::new(&progress, &[1, 3]);
/// stages.report(0, 1, 1, "first");
/// stages.report(1, 1, 2, "second");
/// assert_eq!(*seen.lock().unwrap(), vec![PROGRESS_SCALE / 4, PROGRESS_SCALE * 5 / 8]);
/// ```
#[derive(Debug)]
pub struct Stages<'a> {
    progress: &'a Progress,
    weights: &'a [usize],
    total_weight: usize,
}

impl<'a> Stages<'a> {
    /// Wrap `progress` for stages with the given relative weights.
    pub fn new(progress: &'a Progress, weights: &'a [usize]) -> Self {
        Self {
            progress,
            weights,
            total_weight: weights.iter().sum(),
        }
    }

    /// Overall position after `done` of `total` steps of `stage`.
    pub fn position(&self, stage: usize, done: usize, total: usize) -> usize {
        if self.total_weight == 0 {
            return 0;
        }
        let before: usize = self.weights[..stage.min(self.weights.len())].iter().sum();
        let share = self.weights.get(stage).copied().unwrap_or(0);
        let within = if total == 0 {
            share * PROGRESS_SCALE
        } else {
            share * PROGRESS_SCALE * done.min(total) / total
        };
        (before * PROGRESS_SCALE + within) / self.total_weight
    }

    /// Report `done` of `total` steps within `stage`.
    pub fn report(&self, stage: usize, done: usize, total: usize, message: &str) {
        self.progress
            .report(self.position(stage, done, total), PROGRESS_SCALE, message);
    }
}

/// Cooperative cancellation flag shared between a caller and a running pass.
///
/// Clones observe the same flag.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    /// Create a token that has not been cancelled.
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    /// Whether cancellation has been requested.
    #[inline]
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// Fires at most once per interval of wall time.
#[derive(Debug)]
pub(crate) struct Ticker {
    interval: Duration,
    last: Instant,
}

impl Ticker {
    pub(crate) fn new(interval: Duration) -> Self {
        Self {
            interval,
            last: Instant::now(),
        }
    }

    /// Whether the interval has elapsed since the last tick; restarts it if so.
    pub(crate) fn tick(&mut self) -> bool {
        let now = Instant::now();
        if now.duration_since(self.last) >= self.interval {
            self.last = now;
            true
        } else {
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[test]
    fn test_stage_positions() {
        let progress = Progress::none();
        let stages = Stages::new(&progress, &[41, 23, 36]);
        assert_eq!(stages.position(0, 0, 10), 0);
        assert_eq!(stages.position(0, 10, 10), 410);
        assert_eq!(stages.position(1, 0, 10), 410);
        assert_eq!(stages.position(1, 5, 10), 410 + 115);
        assert_eq!(stages.position(2, 10, 10), PROGRESS_SCALE);
        assert_eq!(stages.position(2, 0, 0), PROGRESS_SCALE);
    }

    #[test]
    fn test_progress_callback_receives_scale() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let progress = Progress::new(move |c, t, m| sink.lock().unwrap().push((c, t, m.to_string())));
        Stages::new(&progress, &[1, 1]).report(1, 1, 2, "half");
        assert_eq!(*seen.lock().unwrap(), vec![(750, PROGRESS_SCALE, "half".to_string())]);
    }

    #[test]
    fn test_cancellation_shared_between_clones() {
        let token = CancellationToken::new();
        let other = token.clone();
        assert!(!other.is_cancelled());
        token.cancel();
        assert!(other.is_cancelled());
    }

    #[test]
    fn test_ticker_zero_interval_always_fires() {
        let mut ticker = Ticker::new(Duration::ZERO);
        assert!(ticker.tick());
        assert!(ticker.tick());
        let mut slow = Ticker::new(Duration::from_secs(3600));
        assert!(!slow.tick());
    }
}
