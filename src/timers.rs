//! Cancellable single-shot timers.
//!
//! Components never spawn timer threads themselves; they ask a [`Scheduler`]
//! to run a task after a delay and keep the returned [`TimerHandle`] around as
//! the cancel token. The production scheduler is [`ThreadScheduler`]; tests and
//! simulations use `time_source::ManualClock`, which fires tasks only when its
//! simulated time is advanced.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::thread;
use std::time::Duration;

/// Work executed when a timer expires.
pub type TimerTask = Box<dyn FnOnce() + Send + 'static>;

/// Something that can run a task once after a delay.
pub trait Scheduler: Send + Sync {
    /// Arm a timer. The task runs on the scheduler's own execution context,
    /// never on the caller's.
    fn schedule(&self, delay: Duration, task: TimerTask) -> TimerHandle;
}

/// Cancel token for an armed timer.
///
/// Cancelling is idempotent and safe after the timer already fired. A task
/// that is already running when `cancel` is called still completes; callers
/// that need stronger guarantees re-check ownership under their own lock.
#[derive(Debug, Clone)]
pub struct TimerHandle {
    cancelled: Arc<AtomicBool>,
    waker: Option<Sender<()>>,
}

impl TimerHandle {
    pub(crate) fn new(cancelled: Arc<AtomicBool>, waker: Option<Sender<()>>) -> Self {
        Self { cancelled, waker }
    }

    /// Prevent the task from running if it has not started yet.
    pub fn cancel(&self) {
        if !self.cancelled.swap(true, Ordering::SeqCst)
            && let Some(waker) = &self.waker
        {
            // The timer thread may already be gone
            let _ = waker.send(());
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

/// Scheduler backed by one short-lived thread per armed timer.
///
/// Each thread parks on a channel with `recv_timeout`, so a cancel wakes it up
/// immediately instead of leaving it asleep until the deadline. Dropping every
/// clone of the handle also releases the thread without running the task.
#[derive(Debug, Default)]
pub struct ThreadScheduler;

impl ThreadScheduler {
    pub fn new() -> Self {
        Self
    }
}

impl Scheduler for ThreadScheduler {
    fn schedule(&self, delay: Duration, task: TimerTask) -> TimerHandle {
        let (waker, sleeper) = mpsc::channel::<()>();
        let cancelled = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&cancelled);

        let spawned = thread::Builder::new()
            .name("deep-slumber-timer".to_string())
            .spawn(move || {
                if let Err(RecvTimeoutError::Timeout) = sleeper.recv_timeout(delay)
                    && !flag.load(Ordering::SeqCst)
                {
                    task();
                }
            });

        if let Err(e) = spawned {
            log_pipe!();
            log_critical!("Failed to spawn timer thread: {e}");
            cancelled.store(true, Ordering::SeqCst);
        }

        TimerHandle::new(cancelled, Some(waker))
    }
}
