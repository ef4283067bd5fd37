//! Fixed-window admission gate.
//!
//! At most `limit` callers are admitted per window. Callers past that are
//! parked, never rejected, until the window rolls over. A window resets
//! wholesale once its duration has elapsed, so up to `2 * limit` admissions can
//! land around a boundary: `limit` at the tail of one window and `limit` right
//! after the reset.
//!
//! Waiters are not served in arrival order. Every admission and every reset
//! wakes all parked callers and each one re-checks the window itself, so a
//! caller that just arrived may be admitted ahead of one that has waited longer.

use crate::config::RateLimitConfig;
use crate::error::{IngestError, Result};
use crate::observability::metrics::GateMetrics;
use std::future::Future;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::Notify;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

/// Shared admission gate. Create once at startup and share behind an `Arc`.
#[derive(Debug)]
pub struct RateGate {
    limit: usize,
    window: Duration,
    state: Mutex<WindowState>,
    wakeup: Notify,
}

/// Everything in here is read and written only under `RateGate::state`.
#[derive(Debug)]
struct WindowState {
    window_start: Instant,
    count: usize,
    waiting: usize,
    windows_started: u64,
}

/// Point-in-time view of the gate, for health reporting and tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GateSnapshot {
    pub limit: usize,
    pub window: Duration,
    /// Admissions counted in the current window.
    pub count: usize,
    /// Callers currently parked. Never part of `count`.
    pub waiting: usize,
    pub windows_started: u64,
    pub window_remaining: Duration,
}

enum Check {
    Admitted { reset: bool },
    Full { window_end: Instant },
}

impl RateGate {
    pub fn new(limit: usize, window: Duration) -> Result<Self> {
        if limit == 0 {
            return Err(IngestError::Config(
                "request limit must be greater than zero".to_string(),
            ));
        }
        if window.is_zero() {
            return Err(IngestError::Config(
                "rate limit window must be longer than zero".to_string(),
            ));
        }

        Ok(Self {
            limit,
            window,
            state: Mutex::new(WindowState {
                window_start: Instant::now(),
                count: 0,
                waiting: 0,
                windows_started: 1,
            }),
            wakeup: Notify::new(),
        })
    }

    pub fn from_config(config: &RateLimitConfig) -> Result<Self> {
        Self::new(config.limit()?, config.window_duration()?)
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// Wait for a slot in the current or a later window and count it.
    pub async fn acquire(&self) {
        // `pending` never resolves, so admission is the only way out.
        let _ = self
            .acquire_until(std::future::pending::<IngestError>())
            .await;
    }

    /// Like [`acquire`](Self::acquire), but gives up with
    /// [`IngestError::Cancelled`] once `cancel` fires.
    pub async fn acquire_cancellable(&self, cancel: &CancellationToken) -> Result<()> {
        self.acquire_until(async {
            cancel.cancelled().await;
            IngestError::Cancelled
        })
        .await
    }

    /// Bounded wait; gives up with [`IngestError::TimedOut`].
    pub async fn acquire_timeout(&self, max_wait: Duration) -> Result<()> {
        self.acquire_until(async move {
            tokio::time::sleep(max_wait).await;
            IngestError::TimedOut(max_wait)
        })
        .await
    }

    /// Wait for a slot unless `interrupt` resolves first, in which case its
    /// error is returned and nothing is counted.
    ///
    /// An interrupted or dropped wait leaves the wait set without touching
    /// `count` and without waking anyone else.
    pub async fn acquire_until<F>(&self, interrupt: F) -> Result<()>
    where
        F: Future<Output = IngestError>,
    {
        tokio::pin!(interrupt);
        let started = Instant::now();
        let mut parked: Option<Parked<'_>> = None;

        loop {
            // Register before checking so a broadcast sent between the check
            // and the park below is not lost.
            let notified = self.wakeup.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            let check = {
                let mut state = self.lock_state();
                let reset = self.roll_window(&mut state, Instant::now());
                if state.count < self.limit {
                    state.count += 1;
                    if let Some(mut waiter) = parked.take() {
                        waiter.disarm(&mut state);
                    }
                    Check::Admitted { reset }
                } else {
                    if parked.is_none() {
                        parked = Some(Parked::arm(self, &mut state));
                    }
                    Check::Full {
                        window_end: state.window_start + self.window,
                    }
                }
            };

            match check {
                Check::Admitted { reset } => {
                    if reset {
                        GateMetrics::record_window_reset();
                    }
                    self.wakeup.notify_waiters();
                    GateMetrics::record_admission(started.elapsed());
                    return Ok(());
                }
                Check::Full { window_end } => {
                    trace!(limit = self.limit, "Admission window full, parking");
                    tokio::select! {
                        err = &mut interrupt => {
                            debug!(error = %err, waited_ms = started.elapsed().as_millis() as u64, "Admission wait interrupted");
                            GateMetrics::record_interrupted(&err);
                            return Err(err);
                        }
                        _ = &mut notified => {}
                        _ = tokio::time::sleep_until(window_end) => {}
                    }
                }
            }
        }
    }

    pub fn snapshot(&self) -> GateSnapshot {
        let state = self.lock_state();
        let elapsed = Instant::now().saturating_duration_since(state.window_start);
        GateSnapshot {
            limit: self.limit,
            window: self.window,
            count: state.count,
            waiting: state.waiting,
            windows_started: state.windows_started,
            window_remaining: self.window.saturating_sub(elapsed),
        }
    }

    /// Open a fresh window at `now` if the current one has run out.
    fn roll_window(&self, state: &mut WindowState, now: Instant) -> bool {
        if now.saturating_duration_since(state.window_start) < self.window {
            return false;
        }
        debug!(
            admitted = state.count,
            waiting = state.waiting,
            "Admission window elapsed, starting a new one"
        );
        state.window_start = now;
        state.count = 0;
        state.windows_started += 1;
        true
    }

    fn lock_state(&self) -> MutexGuard<'_, WindowState> {
        // No code path panics while holding the lock mid-update.
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Membership in the wait set. Dropping an armed one (an interrupted or
/// abandoned wait) takes the caller back out.
struct Parked<'a> {
    gate: &'a RateGate,
    armed: bool,
}

impl<'a> Parked<'a> {
    fn arm(gate: &'a RateGate, state: &mut WindowState) -> Self {
        state.waiting += 1;
        GateMetrics::set_waiting(state.waiting);
        Self { gate, armed: true }
    }

    fn disarm(&mut self, state: &mut WindowState) {
        state.waiting = state.waiting.saturating_sub(1);
        GateMetrics::set_waiting(state.waiting);
        self.armed = false;
    }
}

impl Drop for Parked<'_> {
    fn drop(&mut self) {
        if self.armed {
            let mut state = self.gate.lock_state();
            state.waiting = state.waiting.saturating_sub(1);
            GateMetrics::set_waiting(state.waiting);
        }
    }
}
