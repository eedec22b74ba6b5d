//! Sunrise wake scheduling.
//!
//! [`RiseNShine`] listens for SETTINGS from the server, turns the wake times
//! into a [`WakeWindow`], and keeps a [`DecisionTimer`] armed for the window's
//! decision time. When that time passes it runs the wake ramp: the light is
//! raised from dark to full over the length of the window, one step per tick,
//! bracketed by START_WAKING and END_WAKING events.

pub mod waking;
pub mod window;

use chrono::{DateTime, Local, NaiveDateTime};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crate::bus::EventBus;
use crate::common::constants::*;
use crate::outpost::OutpostListener;
use crate::outpost::message::{Event, EventType, Message, Settings};
use crate::time_source::TimeSource;
use waking::{DecisionTimer, RampContext};
pub use window::{WakeWindow, WindowError, place_ahead};

/// Light that can follow a wake ramp.
pub trait WakeLight: Send + Sync {
    /// `step` runs from just above 0 to exactly 1.0.
    fn set_wake_light_step(&self, step: f64);
}

/// Something that schedules and performs waking.
pub trait WakingOperator: Send + Sync {
    /// Arm the decision timer for a new window. Invalid windows are rejected
    /// before the current timer is touched.
    fn set_waking_time(
        &self,
        latest: NaiveDateTime,
        earliest: Option<NaiveDateTime>,
    ) -> Result<WakeWindow, WindowError>;

    /// Start a wake ramp unless one is running. Returns whether it started.
    fn perform_waking(&self) -> bool;
}

/// Runtime parameters of the wake scheduler.
#[derive(Debug, Clone, PartialEq)]
pub struct WakeConfig {
    /// Window length when settings give neither an earliest time nor a span.
    pub default_wake_duration: Duration,
    pub wake_check_interval: Duration,
    pub ramp_tick: Duration,
    pub debug_enabled: bool,
}

impl Default for WakeConfig {
    fn default() -> Self {
        Self {
            default_wake_duration: Duration::from_secs(DEFAULT_WAKE_DURATION * 60),
            wake_check_interval: Duration::from_secs(DEFAULT_WAKE_CHECK_INTERVAL),
            ramp_tick: Duration::from_millis(DEFAULT_WAKE_RAMP_TICK_MS),
            debug_enabled: false,
        }
    }
}

#[derive(Default)]
struct Schedule {
    window: Option<WakeWindow>,
    timer: Option<DecisionTimer>,
}

struct Shared {
    config: WakeConfig,
    light: Arc<dyn WakeLight>,
    bus: EventBus,
    clock: Arc<dyn TimeSource>,
    schedule: Mutex<Schedule>,
    settings: Mutex<Option<Settings>>,
    ramping: AtomicBool,
    abort: Arc<AtomicBool>,
    ramp_thread: Mutex<Option<JoinHandle<bool>>>,
}

/// Wake scheduler. Cloning shares the scheduler.
#[derive(Clone)]
pub struct RiseNShine {
    shared: Arc<Shared>,
}

impl RiseNShine {
    pub fn new(
        config: WakeConfig,
        light: Arc<dyn WakeLight>,
        bus: EventBus,
        clock: Arc<dyn TimeSource>,
    ) -> Self {
        Self {
            shared: Arc::new(Shared {
                config,
                light,
                bus,
                clock,
                schedule: Mutex::new(Schedule::default()),
                settings: Mutex::new(None),
                ramping: AtomicBool::new(false),
                abort: Arc::new(AtomicBool::new(false)),
                ramp_thread: Mutex::new(None),
            }),
        }
    }

    /// Store new settings and schedule waking from them. Settings without a
    /// latest wake time clear the schedule.
    pub fn digest_settings(&self, settings: Settings) -> Result<Option<WakeWindow>, WindowError> {
        let latest = settings.latest_wake_time;
        let earliest = settings.earliest_wake_time;
        let max_span = settings.wake_max_span;
        *self.shared.settings() = Some(settings);

        log_block_start!("Received wake settings");
        match latest {
            Some(latest) => self.schedule(latest, earliest, max_span).map(Some),
            None => {
                log_decorated!("No latest wake time, waking disabled");
                self.clear_schedule();
                Ok(None)
            }
        }
    }

    fn schedule(
        &self,
        latest: NaiveDateTime,
        earliest: Option<NaiveDateTime>,
        max_span: i64,
    ) -> Result<WakeWindow, WindowError> {
        let shared = &self.shared;
        let now = shared.clock.now();
        let window = match WakeWindow::compute(
            latest,
            earliest,
            max_span,
            shared.config.default_wake_duration,
            now,
        ) {
            Ok(window) => window,
            Err(e) => {
                log_pipe!();
                log_warning!("Rejected wake window: {e}");
                return Err(e);
            }
        };

        let mut schedule = shared.schedule();
        if let Some(previous) = schedule.timer.take() {
            previous.stop();
        }

        let weak = Arc::downgrade(shared);
        let steps = ramp_steps(window.duration(), shared.config.ramp_tick);
        let started = DecisionTimer::start(
            window.decision,
            shared.config.wake_check_interval,
            Arc::clone(&shared.clock),
            Box::new(move || on_decision_time(&weak, steps)),
        );

        match started {
            Ok(timer) => {
                schedule.timer = Some(timer);
                schedule.window = Some(window);
                log_decorated!(
                    "Wake window {} → {}",
                    window.earliest.format("%a %H:%M"),
                    window.latest.format("%a %H:%M")
                );
                log_indented!("Decision at {}", window.decision.format("%Y-%m-%d %H:%M:%S"));
            }
            Err(e) => {
                schedule.window = None;
                log_pipe!();
                log_critical!("Failed to start decision timer: {e}");
            }
        }
        Ok(window)
    }

    fn clear_schedule(&self) {
        let mut schedule = self.shared.schedule();
        if let Some(timer) = schedule.timer.take() {
            timer.stop();
        }
        schedule.window = None;
    }

    /// Most recently received settings.
    pub fn settings(&self) -> Option<Settings> {
        self.shared.settings().clone()
    }

    /// Current wake window, if one is scheduled.
    pub fn window(&self) -> Option<WakeWindow> {
        self.shared.schedule().window
    }

    /// Next instant at which waking starts.
    pub fn decision_time(&self) -> Option<DateTime<Local>> {
        self.shared.schedule().timer.as_ref().map(DecisionTimer::decision)
    }

    pub fn is_waking(&self) -> bool {
        self.shared.ramping.load(Ordering::SeqCst)
    }

    /// Stop a running ramp and report USER_ABORT_WAKING. Returns whether a
    /// ramp was running.
    pub fn abort_waking(&self) -> bool {
        if !self.is_waking() {
            return false;
        }
        self.shared.abort.store(true, Ordering::SeqCst);

        // A ramp that reached its last step before the flag was seen has
        // already reported END_WAKING
        if self.shared.join_ramp() != Some(false) {
            return false;
        }
        self.shared.bus.log_event(Event::new(
            EventType::UserAbortWaking,
            0.0,
            self.shared.clock.now().naive_local(),
        ));
        true
    }

    /// Wait for the running ramp, if any, to finish.
    pub fn wait_for_ramp(&self) {
        self.shared.join_ramp();
    }

    /// Stop the decision timer and any running ramp.
    pub fn shutdown(&self) {
        self.clear_schedule();
        self.shared.abort.store(true, Ordering::SeqCst);
        self.shared.join_ramp();
    }
}

impl WakingOperator for RiseNShine {
    fn set_waking_time(
        &self,
        latest: NaiveDateTime,
        earliest: Option<NaiveDateTime>,
    ) -> Result<WakeWindow, WindowError> {
        let max_span = self
            .shared
            .settings()
            .as_ref()
            .map_or(0, |s| s.wake_max_span);
        self.schedule(latest, earliest, max_span)
    }

    fn perform_waking(&self) -> bool {
        let duration = self
            .window()
            .map_or(self.shared.config.default_wake_duration, |w| w.duration());
        Shared::start_ramp(&self.shared, ramp_steps(duration, self.shared.config.ramp_tick))
    }
}

impl OutpostListener for RiseNShine {
    fn on_message(&self, message: &Message) {
        if let Message::Settings(settings) = message {
            // Rejections are already logged
            let _ = self.digest_settings(settings.clone());
        }
    }
}

/// Number of ramp ticks that fit into `duration`, at least one.
fn ramp_steps(duration: Duration, tick: Duration) -> u64 {
    let tick = tick.as_millis().max(1);
    u64::try_from(duration.as_millis() / tick)
        .unwrap_or(u64::MAX)
        .max(1)
}

/// The ramp starts right away; choosing a later start inside the window is
/// not implemented yet.
fn on_decision_time(shared: &Weak<Shared>, steps: u64) {
    if let Some(shared) = shared.upgrade() {
        log_block_start!("Decision time reached");
        Shared::start_ramp(&shared, steps);
    }
}

impl Shared {
    fn schedule(&self) -> MutexGuard<'_, Schedule> {
        self.schedule.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn settings(&self) -> MutexGuard<'_, Option<Settings>> {
        self.settings.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn start_ramp(shared: &Arc<Shared>, steps: u64) -> bool {
        // Held until the new handle is stored, so a ramp that ends right away
        // cannot let a second start slip in between
        let mut ramp_thread = shared.ramp_thread.lock().unwrap_or_else(PoisonError::into_inner);
        if shared
            .ramping
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            if shared.config.debug_enabled {
                log_debug!("Wake ramp already running");
            }
            return false;
        }

        // The previous ramp thread has already cleared `ramping`
        if let Some(previous) = ramp_thread.take()
            && previous.join().is_err()
        {
            log_error!("Wake ramp thread panicked");
        }
        shared.abort.store(false, Ordering::SeqCst);

        let context = RampContext {
            light: Arc::clone(&shared.light),
            bus: shared.bus.clone(),
            clock: Arc::clone(&shared.clock),
            tick: shared.config.ramp_tick,
            abort: Arc::clone(&shared.abort),
            debug_enabled: shared.config.debug_enabled,
        };
        let owner = Arc::clone(shared);
        let spawned = thread::Builder::new()
            .name("deep-slumber-ramp".to_string())
            .spawn(move || {
                let completed = context.run(steps);
                owner.ramping.store(false, Ordering::SeqCst);
                completed
            });

        match spawned {
            Ok(handle) => {
                *ramp_thread = Some(handle);
                true
            }
            Err(e) => {
                shared.ramping.store(false, Ordering::SeqCst);
                log_pipe!();
                log_critical!("Failed to start wake ramp: {e}");
                false
            }
        }
    }

    /// Wait for the ramp thread, if any. Returns whether it ran to its last
    /// step.
    fn join_ramp(&self) -> Option<bool> {
        let handle = self
            .ramp_thread
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()?;
        match handle.join() {
            Ok(completed) => Some(completed),
            Err(_) => {
                log_error!("Wake ramp thread panicked");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::EventConsumer;
    use crate::time_source::ManualClock;
    use chrono::{NaiveDate, TimeZone, Timelike};
    use std::sync::mpsc;

    struct Kinds(Mutex<Vec<EventType>>);

    impl EventConsumer for Kinds {
        fn consume(&self, event: &Event) {
            self.0.lock().unwrap().push(event.event_type);
        }
    }

    struct Dark;

    impl WakeLight for Dark {
        fn set_wake_light_step(&self, _step: f64) {}
    }

    fn scheduler(clock: Arc<ManualClock>) -> RiseNShine {
        RiseNShine::new(
            WakeConfig {
                wake_check_interval: Duration::from_millis(5),
                ..WakeConfig::default()
            },
            Arc::new(Dark),
            EventBus::default(),
            clock,
        )
    }

    fn clock_at(h: u32, m: u32) -> Arc<ManualClock> {
        Arc::new(ManualClock::new(
            Local.with_ymd_and_hms(2017, 9, 12, h, m, 0).unwrap(),
        ))
    }

    fn naive(h: u32, m: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2017, 9, 12)
            .unwrap()
            .and_hms_opt(h, m, 0)
            .unwrap()
    }

    #[test]
    fn test_settings_arm_decision_timer() {
        let wake = scheduler(clock_at(13, 0));
        let settings = Settings {
            latest_wake_time: Some(naive(6, 15)),
            wake_max_span: 5400,
            ..Settings::default()
        };

        let window = wake.digest_settings(settings.clone()).unwrap().unwrap();
        let decision = wake.decision_time().unwrap();
        assert_eq!(decision, window.decision);
        assert_eq!((decision.hour(), decision.minute()), (4, 45));
        assert_eq!(wake.settings(), Some(settings));
        wake.shutdown();
        assert!(wake.decision_time().is_none());
    }

    #[test]
    fn test_invalid_settings_keep_previous_timer() {
        let wake = scheduler(clock_at(13, 0));
        wake
            .set_waking_time(naive(7, 0), Some(naive(6, 30)))
            .unwrap();
        let before = wake.decision_time();

        let rejected = wake.set_waking_time(naive(7, 0), Some(naive(7, 0)));
        assert_eq!(rejected, Err(WindowError::Empty));
        assert_eq!(wake.decision_time(), before);
        wake.shutdown();
    }

    #[test]
    fn test_settings_without_latest_clear_schedule() {
        let wake = scheduler(clock_at(13, 0));
        wake.set_waking_time(naive(7, 0), None).unwrap();
        assert!(wake.window().is_some());

        assert_eq!(wake.digest_settings(Settings::default()), Ok(None));
        assert!(wake.window().is_none());
        assert!(wake.decision_time().is_none());
    }

    /// Holds the ramp at its first step until released.
    struct Gated {
        gate: Mutex<mpsc::Receiver<()>>,
        entered: Mutex<mpsc::Sender<()>>,
        steps: Mutex<Vec<f64>>,
    }

    impl Gated {
        /// The light plus the sender that releases it and the receiver that
        /// reports the ramp reached the first step.
        fn new() -> (Arc<Self>, mpsc::Sender<()>, mpsc::Receiver<()>) {
            let (release, gate) = mpsc::channel();
            let (entered, reached) = mpsc::channel();
            let light = Arc::new(Self {
                gate: Mutex::new(gate),
                entered: Mutex::new(entered),
                steps: Mutex::new(Vec::new()),
            });
            (light, release, reached)
        }
    }

    impl WakeLight for Gated {
        fn set_wake_light_step(&self, step: f64) {
            let mut steps = self.steps.lock().unwrap();
            if steps.is_empty() {
                let _ = self.entered.lock().unwrap().send(());
                let _ = self.gate.lock().unwrap().recv();
            }
            steps.push(step);
        }
    }

    fn kinds_bus() -> (Arc<Kinds>, EventBus) {
        let kinds = Arc::new(Kinds(Mutex::new(Vec::new())));
        let bus = EventBus::new(vec![kinds.clone() as Arc<dyn EventConsumer>]);
        (kinds, bus)
    }

    fn one_step() -> WakeConfig {
        WakeConfig {
            default_wake_duration: Duration::from_secs(1),
            ramp_tick: Duration::from_secs(1),
            ..WakeConfig::default()
        }
    }

    #[test]
    fn test_perform_waking_twice_runs_one_ramp() {
        let clock = clock_at(5, 0);
        let (light, release, _reached) = Gated::new();
        let (kinds, bus) = kinds_bus();
        let wake = RiseNShine::new(WakeConfig::default(), light.clone(), bus, clock);
        wake.set_waking_time(naive(7, 0), Some(naive(6, 59))).unwrap();

        let first = wake.perform_waking();
        let second = wake.perform_waking();
        assert!(wake.is_waking());
        release.send(()).unwrap();
        wake.wait_for_ramp();

        assert!(first);
        assert!(!second);
        assert!(!wake.is_waking());
        let steps = light.steps.lock().unwrap().clone();
        assert_eq!(steps.len(), 60);
        assert_eq!(*steps.last().unwrap(), 1.0);
        assert_eq!(
            *kinds.0.lock().unwrap(),
            vec![EventType::StartWaking, EventType::EndWaking]
        );
        wake.shutdown();
    }

    #[test]
    fn test_abort_after_last_step_reports_nothing() {
        let (light, release, reached) = Gated::new();
        let (kinds, bus) = kinds_bus();
        let wake = RiseNShine::new(one_step(), light, bus, clock_at(5, 0));

        assert!(wake.perform_waking());
        reached.recv_timeout(Duration::from_secs(5)).unwrap();

        // The ramp is past its only abort check and finishes once released
        let aborter = {
            let wake = wake.clone();
            thread::spawn(move || wake.abort_waking())
        };
        thread::sleep(Duration::from_millis(20));
        release.send(()).unwrap();

        assert!(!aborter.join().unwrap());
        wake.wait_for_ramp();
        assert_eq!(
            *kinds.0.lock().unwrap(),
            vec![EventType::StartWaking, EventType::EndWaking]
        );
    }

    #[test]
    fn test_back_to_back_ramps_are_all_joined() {
        let (kinds, bus) = kinds_bus();
        let wake = RiseNShine::new(one_step(), Arc::new(Dark), bus, clock_at(5, 0));

        let starters: Vec<_> = (0..2)
            .map(|_| {
                let wake = wake.clone();
                thread::spawn(move || {
                    for _ in 0..200 {
                        wake.perform_waking();
                    }
                })
            })
            .collect();
        for starter in starters {
            starter.join().unwrap();
        }

        wake.wait_for_ramp();
        assert!(!wake.is_waking());

        let kinds = kinds.0.lock().unwrap();
        let started = kinds.iter().filter(|k| **k == EventType::StartWaking).count();
        let ended = kinds.iter().filter(|k| **k == EventType::EndWaking).count();
        assert!(started > 0);
        assert_eq!(started, ended);
    }

    #[test]
    fn test_ramp_steps_follow_tick() {
        let hour = Duration::from_secs(3600);
        assert_eq!(ramp_steps(hour, Duration::from_secs(1)), 3600);
        assert_eq!(ramp_steps(hour, Duration::from_millis(500)), 7200);
        assert_eq!(ramp_steps(Duration::ZERO, Duration::from_secs(1)), 1);
        assert_eq!(ramp_steps(hour, Duration::ZERO), 3_600_000);
    }

    #[test]
    fn test_settings_message_is_digested() {
        let wake = scheduler(clock_at(13, 0));
        let message = Message::Settings(Settings {
            latest_wake_time: Some(naive(0, 5)),
            wake_max_span: 5400,
            ..Settings::default()
        });

        wake.on_message(&message);
        wake.on_message(&Message::Heartbeat);

        let decision = wake.decision_time().unwrap();
        assert_eq!((decision.hour(), decision.minute()), (22, 35));
        wake.shutdown();
    }
}
