//! Weighted progress and cooperative cancellation.
//!
//! Work is measured in weighted steps: one per ordinary row, more for media
//! blobs, and batched for high-volume tables such as nonces. A tracker
//! starts in counting mode (pass 1 of a restore, where the total is being
//! computed) and switches to reporting mode once the total is known.

use crate::error::{CoreError, CoreResult};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::info;

/// Weight of one identity, contact, group, list, ballot, choice, vote or
/// message row.
pub const ROW_WEIGHT: u64 = 1;
/// Weight of a message media blob, thumbnail, contact avatar or profile
/// picture.
pub const MEDIA_WEIGHT: u64 = 25;
/// Weight of a group avatar.
pub const GROUP_AVATAR_WEIGHT: u64 = 50;
/// Nonce rows per step.
pub const NONCES_PER_STEP: u64 = 50;
/// Reaction rows per step.
pub const REACTIONS_PER_STEP: u64 = 25;

/// Shared cancellation flag.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    canceled: Arc<AtomicBool>,
}

impl CancelToken {
    /// Creates an unset token.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests cancellation.
    pub fn cancel(&self) {
        self.canceled.store(true, Ordering::SeqCst);
    }

    /// Returns true once cancellation was requested.
    #[must_use]
    pub fn is_canceled(&self) -> bool {
        self.canceled.load(Ordering::SeqCst)
    }

    /// Returns [`CoreError::Canceled`] if cancellation was requested.
    pub fn check(&self) -> CoreResult<()> {
        if self.is_canceled() {
            Err(CoreError::Canceled)
        } else {
            Ok(())
        }
    }

    /// Returns true if both handles share one flag.
    pub(crate) fn same_as(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.canceled, &other.canceled)
    }
}

/// A progress report.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProgressUpdate {
    /// Completed share of the work, 0 to 100.
    pub percent: u8,
    /// Estimated time left, once enough work was done to tell.
    pub remaining: Option<Duration>,
}

/// How a run ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// Finished normally.
    Succeeded,
    /// Stopped on user request.
    Canceled,
    /// Stopped by a fatal error.
    Failed(String),
}

impl Outcome {
    /// Derives the outcome of a finished run.
    pub fn of<T>(result: &CoreResult<T>) -> Self {
        match result {
            Ok(_) => Outcome::Succeeded,
            Err(CoreError::Canceled) => Outcome::Canceled,
            Err(e) => Outcome::Failed(e.to_string()),
        }
    }
}

/// Receives progress of a backup or restore.
pub trait ProgressSink: Send + Sync {
    /// Called whenever the integer percentage changes.
    fn on_progress(&self, update: ProgressUpdate);

    /// Called exactly once when the run ends.
    fn on_finished(&self, outcome: &Outcome);
}

/// Sink that drops every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullSink;

impl ProgressSink for NullSink {
    fn on_progress(&self, _update: ProgressUpdate) {}

    fn on_finished(&self, _outcome: &Outcome) {}
}

/// Sink that logs progress through `tracing`.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogSink;

impl ProgressSink for LogSink {
    fn on_progress(&self, update: ProgressUpdate) {
        match update.remaining {
            Some(remaining) => info!(
                percent = update.percent,
                remaining_secs = remaining.as_secs(),
                "progress"
            ),
            None => info!(percent = update.percent, "progress"),
        }
    }

    fn on_finished(&self, outcome: &Outcome) {
        info!(?outcome, "finished");
    }
}

/// Sink that records every event.
#[derive(Debug, Default)]
pub struct CollectingSink {
    updates: Mutex<Vec<ProgressUpdate>>,
    outcomes: Mutex<Vec<Outcome>>,
}

impl CollectingSink {
    /// Creates an empty sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the progress updates received so far.
    pub fn updates(&self) -> Vec<ProgressUpdate> {
        self.updates.lock().clone()
    }

    /// Returns the terminal events received so far.
    pub fn outcomes(&self) -> Vec<Outcome> {
        self.outcomes.lock().clone()
    }
}

impl ProgressSink for CollectingSink {
    fn on_progress(&self, update: ProgressUpdate) {
        self.updates.lock().push(update);
    }

    fn on_finished(&self, outcome: &Outcome) {
        self.outcomes.lock().push(outcome.clone());
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Counting,
    Reporting { total: u64 },
}

/// Tracks weighted steps of one run.
pub struct ProgressTracker<'a> {
    mode: Mode,
    steps: u64,
    last_percent: Option<u8>,
    min_percent_step: u8,
    started: Instant,
    cancel: CancelToken,
    sink: &'a dyn ProgressSink,
}

impl<'a> ProgressTracker<'a> {
    /// Creates a tracker in counting mode.
    pub fn counting(cancel: CancelToken, sink: &'a dyn ProgressSink) -> Self {
        Self {
            mode: Mode::Counting,
            steps: 0,
            last_percent: None,
            min_percent_step: 1,
            started: Instant::now(),
            cancel,
            sink,
        }
    }

    /// Creates a tracker that reports against a known total.
    pub fn reporting(total: u64, cancel: CancelToken, sink: &'a dyn ProgressSink) -> Self {
        let mut tracker = Self::counting(cancel, sink);
        tracker.mode = Mode::Reporting { total };
        tracker
    }

    /// Emits only when the percentage grew by at least `step` (and at 100).
    #[must_use]
    pub fn with_percent_step(mut self, step: u8) -> Self {
        self.min_percent_step = step.max(1);
        self
    }

    /// Switches to reporting mode against `total` and restarts the count.
    pub fn start_reporting(&mut self, total: u64) {
        self.mode = Mode::Reporting { total };
        self.steps = 0;
        self.last_percent = None;
        self.started = Instant::now();
    }

    /// Returns the steps counted since the last (re)start.
    #[must_use]
    pub fn steps(&self) -> u64 {
        self.steps
    }

    /// Returns the total, once known.
    #[must_use]
    pub fn total(&self) -> Option<u64> {
        match self.mode {
            Mode::Counting => None,
            Mode::Reporting { total } => Some(total),
        }
    }

    /// Returns the cancel token.
    #[must_use]
    pub fn cancel_token(&self) -> &CancelToken {
        &self.cancel
    }

    /// Checks for cancellation, then adds `weight` steps.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Canceled`] if cancellation was requested; the
    /// steps are not added in that case.
    pub fn advance(&mut self, weight: u64) -> CoreResult<()> {
        self.cancel.check()?;
        self.steps += weight;
        if let Mode::Reporting { total } = self.mode {
            self.report(total);
        }
        Ok(())
    }

    /// Advances for item `index` (zero-based) of a table counted in
    /// batches of `per_step` items: one step on the first item of every
    /// batch, so `n` items cost `ceil(n / per_step)` steps.
    pub fn advance_batched(&mut self, index: u64, per_step: u64) -> CoreResult<()> {
        if index % per_step.max(1) == 0 {
            self.advance(ROW_WEIGHT)
        } else {
            self.cancel.check()
        }
    }

    fn report(&mut self, total: u64) {
        let percent = if total == 0 {
            100
        } else {
            (self.steps.min(total) * 100 / total) as u8
        };
        let due = match self.last_percent {
            None => true,
            Some(last) => {
                percent > last && (percent - last >= self.min_percent_step || percent == 100)
            }
        };
        if !due {
            return;
        }
        self.last_percent = Some(percent);
        self.sink.on_progress(ProgressUpdate {
            percent,
            remaining: self.estimate_remaining(total),
        });
    }

    fn estimate_remaining(&self, total: u64) -> Option<Duration> {
        if self.steps == 0 {
            return None;
        }
        let left = total.saturating_sub(self.steps);
        let elapsed = self.started.elapsed();
        Some(elapsed.mul_f64(left as f64 / self.steps as f64))
    }
}

impl std::fmt::Debug for ProgressTracker<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProgressTracker")
            .field("mode", &self.mode)
            .field("steps", &self.steps)
            .field("last_percent", &self.last_percent)
            .finish_non_exhaustive()
    }
}
