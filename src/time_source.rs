//! Time source abstraction for real and simulated time.
//!
//! Every component that reads the clock or sleeps does so through a
//! [`TimeSource`] handed to it at construction. Production code uses
//! [`RealTimeSource`]; tests use [`ManualClock`], whose time only moves when it
//! is told to and which doubles as a [`Scheduler`] so that timer expiry can be
//! driven deterministically.

use chrono::{DateTime, Local, TimeDelta};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration as StdDuration;

use crate::timers::{Scheduler, TimerHandle, TimerTask};

/// Trait for abstracting time operations
pub trait TimeSource: Send + Sync {
    /// Get the current time
    fn now(&self) -> DateTime<Local>;

    /// Sleep for the specified duration (or simulate it)
    fn sleep(&self, duration: StdDuration);

    /// Check if this is a simulated time source
    fn is_simulated(&self) -> bool {
        false
    }
}

/// Real-time implementation that uses actual system time
#[derive(Debug, Default, Clone, Copy)]
pub struct RealTimeSource;

impl TimeSource for RealTimeSource {
    fn now(&self) -> DateTime<Local> {
        Local::now()
    }

    fn sleep(&self, duration: StdDuration) {
        std::thread::sleep(duration);
    }
}

/// Convert a std duration into a chrono delta, saturating on overflow.
pub fn to_delta(duration: StdDuration) -> TimeDelta {
    TimeDelta::from_std(duration).unwrap_or(TimeDelta::MAX)
}

struct PendingTask {
    due: DateTime<Local>,
    seq: u64,
    cancelled: Arc<AtomicBool>,
    task: TimerTask,
}

struct ManualState {
    now: DateTime<Local>,
    pending: Vec<PendingTask>,
    next_seq: u64,
}

/// Simulated clock that only advances on request.
///
/// Tasks scheduled on it run synchronously inside [`ManualClock::advance`], in
/// deadline order (ties in arming order), with the clock set to each task's
/// deadline while it runs. `sleep` advances the clock, so code that sleeps
/// between steps runs at full speed under simulation.
pub struct ManualClock {
    state: Mutex<ManualState>,
}

impl ManualClock {
    /// Create a clock frozen at `start`.
    pub fn new(start: DateTime<Local>) -> Self {
        Self {
            state: Mutex::new(ManualState {
                now: start,
                pending: Vec::new(),
                next_seq: 0,
            }),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, ManualState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Move time forward, running every task that falls due on the way.
    pub fn advance(&self, by: StdDuration) {
        let target = {
            let state = self.lock();
            state.now + to_delta(by)
        };

        loop {
            // Pop the next due task without holding the lock while it runs,
            // tasks are free to arm new timers on this same clock.
            let next = {
                let mut state = self.lock();
                state.pending.retain(|p| !p.cancelled.load(Ordering::SeqCst));
                let index = state
                    .pending
                    .iter()
                    .enumerate()
                    .filter(|(_, p)| p.due <= target)
                    .min_by_key(|(_, p)| (p.due, p.seq))
                    .map(|(i, _)| i);
                index.map(|i| {
                    let task = state.pending.swap_remove(i);
                    if task.due > state.now {
                        state.now = task.due;
                    }
                    task
                })
            };

            match next {
                Some(pending) => {
                    if !pending.cancelled.load(Ordering::SeqCst) {
                        (pending.task)();
                    }
                }
                None => break,
            }
        }

        let mut state = self.lock();
        if target > state.now {
            state.now = target;
        }
    }

    /// Jump to an absolute time without running any pending task.
    pub fn set(&self, now: DateTime<Local>) {
        self.lock().now = now;
    }

    /// Number of armed timers that have neither fired nor been cancelled.
    pub fn pending(&self) -> usize {
        self.lock()
            .pending
            .iter()
            .filter(|p| !p.cancelled.load(Ordering::SeqCst))
            .count()
    }
}

impl TimeSource for ManualClock {
    fn now(&self) -> DateTime<Local> {
        self.lock().now
    }

    fn sleep(&self, duration: StdDuration) {
        self.advance(duration);
        std::thread::yield_now();
    }

    fn is_simulated(&self) -> bool {
        true
    }
}

impl Scheduler for ManualClock {
    fn schedule(&self, delay: StdDuration, task: TimerTask) -> TimerHandle {
        let cancelled = Arc::new(AtomicBool::new(false));
        let mut state = self.lock();
        let due = state.now + to_delta(delay);
        let seq = state.next_seq;
        state.next_seq += 1;
        state.pending.push(PendingTask {
            due,
            seq,
            cancelled: Arc::clone(&cancelled),
            task,
        });
        TimerHandle::new(cancelled, None)
    }
}
