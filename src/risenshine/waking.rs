//! Decision timer and wake ramp threads.

use chrono::{DateTime, Local};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use super::WakeLight;
use super::window::place_ahead;
use crate::bus::EventBus;
use crate::outpost::message::{Event, EventType};
use crate::time_source::TimeSource;

/// Callback invoked when the decision time passes.
pub type DecisionCallback = Box<dyn Fn() + Send + 'static>;

/// Background thread that fires once per day at the decision time.
///
/// The thread polls the clock every `check_interval`; once `now` is past the
/// decision time it runs the callback and moves the decision time to its next
/// occurrence. [`DecisionTimer::stop`] returns only after the thread exited,
/// so no callback runs after it.
pub struct DecisionTimer {
    decision: Arc<Mutex<DateTime<Local>>>,
    cancel: Sender<()>,
    handle: Option<JoinHandle<()>>,
}

impl DecisionTimer {
    pub fn start(
        decision: DateTime<Local>,
        check_interval: Duration,
        clock: Arc<dyn TimeSource>,
        callback: DecisionCallback,
    ) -> std::io::Result<Self> {
        let (cancel, cancelled) = mpsc::channel::<()>();
        let shared = Arc::new(Mutex::new(decision));
        let next = Arc::clone(&shared);

        let handle = thread::Builder::new()
            .name("deep-slumber-decision".to_string())
            .spawn(move || {
                loop {
                    let now = clock.now();
                    let due = *next.lock().unwrap_or_else(PoisonError::into_inner);
                    if now > due {
                        callback();
                        let mut rearmed = due;
                        while rearmed < now {
                            rearmed = place_ahead(rearmed, now);
                        }
                        *next.lock().unwrap_or_else(PoisonError::into_inner) = rearmed;
                    }

                    match cancelled.recv_timeout(check_interval) {
                        Err(RecvTimeoutError::Timeout) => continue,
                        // Stop request or owner gone
                        _ => break,
                    }
                }
            })?;

        Ok(Self {
            decision: shared,
            cancel,
            handle: Some(handle),
        })
    }

    /// Next instant at which the callback fires.
    pub fn decision(&self) -> DateTime<Local> {
        *self.decision.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Stop the thread and wait for it.
    pub fn stop(mut self) {
        self.halt();
    }

    fn halt(&mut self) {
        let _ = self.cancel.send(());
        if let Some(handle) = self.handle.take()
            && handle.join().is_err()
        {
            log_error!("Decision timer thread panicked");
        }
    }
}

impl Drop for DecisionTimer {
    fn drop(&mut self) {
        self.halt();
    }
}

/// Everything a running ramp needs.
pub(crate) struct RampContext {
    pub(crate) light: Arc<dyn WakeLight>,
    pub(crate) bus: EventBus,
    pub(crate) clock: Arc<dyn TimeSource>,
    pub(crate) tick: Duration,
    pub(crate) abort: Arc<AtomicBool>,
    pub(crate) debug_enabled: bool,
}

impl RampContext {
    fn emit(&self, event_type: EventType) {
        self.bus
            .log_event(Event::new(event_type, 0.0, self.clock.now().naive_local()));
    }

    /// Drive the light from dark to full over `steps` ticks. Returns `false`
    /// when the ramp was aborted before its last step.
    pub(crate) fn run(&self, steps: u64) -> bool {
        let steps = steps.max(1);
        log_block_start!("Wake ramp started ({steps} steps)");
        self.emit(EventType::StartWaking);

        for i in 1..=steps {
            if self.abort.load(Ordering::SeqCst) {
                log_decorated!("Wake ramp stopped at step {i}/{steps}");
                return false;
            }

            let step = i as f64 / steps as f64;
            self.light.set_wake_light_step(step);
            if self.debug_enabled {
                log_debug!("Wake step {i}/{steps} ({step:.3})");
            }

            if i < steps {
                self.clock.sleep(self.tick);
            }
        }

        self.emit(EventType::EndWaking);
        log_decorated!("Wake ramp finished");
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::EventConsumer;
    use crate::time_source::{ManualClock, RealTimeSource};
    use chrono::{TimeDelta, TimeZone};
    use std::sync::atomic::AtomicUsize;
    use std::time::Instant;

    struct Steps(Mutex<Vec<f64>>);

    impl WakeLight for Steps {
        fn set_wake_light_step(&self, step: f64) {
            self.0.lock().unwrap().push(step);
        }
    }

    struct Kinds(Mutex<Vec<EventType>>);

    impl EventConsumer for Kinds {
        fn consume(&self, event: &Event) {
            self.0.lock().unwrap().push(event.event_type);
        }
    }

    fn wait_until(limit: Duration, mut done: impl FnMut() -> bool) -> bool {
        let start = Instant::now();
        while start.elapsed() < limit {
            if done() {
                return true;
            }
            thread::sleep(Duration::from_millis(2));
        }
        done()
    }

    #[test]
    fn test_decision_timer_fires_and_rearms_next_day() {
        let start = Local.with_ymd_and_hms(2024, 6, 3, 4, 0, 0).unwrap();
        let clock = Arc::new(ManualClock::new(start));
        let fired = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&fired);

        let decision = start + TimeDelta::minutes(30);
        let timer = DecisionTimer::start(
            decision,
            Duration::from_millis(5),
            clock.clone(),
            Box::new(move || {
                counter.fetch_add(1, Ordering::SeqCst);
            }),
        )
        .unwrap();

        thread::sleep(Duration::from_millis(30));
        assert_eq!(fired.load(Ordering::SeqCst), 0);

        clock.advance(Duration::from_secs(31 * 60));
        assert!(wait_until(Duration::from_secs(2), || fired.load(Ordering::SeqCst) == 1));
        assert!(wait_until(Duration::from_secs(2), || {
            timer.decision() == decision + TimeDelta::days(1)
        }));

        thread::sleep(Duration::from_millis(30));
        assert_eq!(fired.load(Ordering::SeqCst), 1);
        timer.stop();
    }

    #[test]
    fn test_no_callback_after_stop() {
        let clock = Arc::new(ManualClock::new(
            Local.with_ymd_and_hms(2024, 6, 3, 4, 0, 0).unwrap(),
        ));
        let fired = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&fired);
        let decision = clock.now() + TimeDelta::minutes(1);

        let timer = DecisionTimer::start(
            decision,
            Duration::from_millis(1),
            clock.clone(),
            Box::new(move || {
                counter.fetch_add(1, Ordering::SeqCst);
            }),
        )
        .unwrap();
        timer.stop();

        clock.advance(Duration::from_secs(3600));
        thread::sleep(Duration::from_millis(20));
        assert_eq!(fired.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_ramp_is_monotonic_and_ends_at_full() {
        let light = Arc::new(Steps(Mutex::new(Vec::new())));
        let kinds = Arc::new(Kinds(Mutex::new(Vec::new())));
        let context = RampContext {
            light: light.clone(),
            bus: EventBus::new(vec![kinds.clone() as Arc<dyn EventConsumer>]),
            clock: Arc::new(RealTimeSource),
            tick: Duration::ZERO,
            abort: Arc::new(AtomicBool::new(false)),
            debug_enabled: false,
        };

        assert!(context.run(8));

        let steps = light.0.lock().unwrap().clone();
        assert_eq!(steps.len(), 8);
        assert!(steps.windows(2).all(|w| w[0] < w[1]));
        assert_eq!(*steps.last().unwrap(), 1.0);
        assert_eq!(
            *kinds.0.lock().unwrap(),
            vec![EventType::StartWaking, EventType::EndWaking]
        );
    }

    #[test]
    fn test_aborted_ramp_skips_end_event() {
        let light = Arc::new(Steps(Mutex::new(Vec::new())));
        let kinds = Arc::new(Kinds(Mutex::new(Vec::new())));
        let context = RampContext {
            light: light.clone(),
            bus: EventBus::new(vec![kinds.clone() as Arc<dyn EventConsumer>]),
            clock: Arc::new(RealTimeSource),
            tick: Duration::ZERO,
            abort: Arc::new(AtomicBool::new(true)),
            debug_enabled: false,
        };

        assert!(!context.run(5));
        assert!(light.0.lock().unwrap().is_empty());
        assert_eq!(*kinds.0.lock().unwrap(), vec![EventType::StartWaking]);
    }
}
