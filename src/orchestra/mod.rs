//! Sleep-cycle state machine.
//!
//! The [`Orchestra`] turns presence edges and environment samples into the
//! IDLE → READY → RECORDING ⇄ PAUSED cycle and reports every transition on the
//! event bus:
//!
//! - a rising presence edge wakes the machine from IDLE and starts polling;
//! - sustained movement while READY starts a recording after a quiet period;
//! - leaving the bed while RECORDING pauses it, movement after the debounce
//!   resumes it, and a long absence ends it.
//!
//! All state and the three timer slots sit behind one mutex. Timer callbacks
//! carry the generation they were armed with and are ignored when the slot has
//! moved on, so cancellation races cannot cause a second transition.

pub mod hardware;
pub mod polling;
pub mod state;

use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crate::bus::EventBus;
use crate::common::constants::*;
use crate::outpost::message::{Event, EventType};
use crate::risenshine::WakeLight;
use crate::time_source::{TimeSource, to_delta};
use crate::timers::Scheduler;
use hardware::{EnvironmentSensor, LightActuator, PresenceSensor};
use polling::{PollIntervals, Poller, Sample, SignalKind};
use state::Machine;

pub use state::{OrchestraState, TimerKind};

/// Runtime parameters of the state machine.
#[derive(Debug, Clone, PartialEq)]
pub struct OrchestraConfig {
    pub ready_to_idle_timeout: Duration,
    pub ready_to_recording_timeout: Duration,
    pub paused_to_idle_timeout: Duration,
    pub resume_debounce: Duration,
    pub movement_threshold: f64,
    pub normalizing_movement_polls: u32,
    pub poll_intervals: PollIntervals,
    pub poll_cadence: Duration,
    pub max_light_intensity: u16,
    pub light_off_transition: Duration,
    /// Run the polling loop on its own thread. When off, the owner drives
    /// polling through [`Orchestra::sweep`].
    pub autopoll: bool,
    pub debug_enabled: bool,
}

impl Default for OrchestraConfig {
    fn default() -> Self {
        Self {
            ready_to_idle_timeout: Duration::from_secs(DEFAULT_READY_TO_IDLE_TIMEOUT),
            ready_to_recording_timeout: Duration::from_secs(DEFAULT_READY_TO_RECORDING_TIMEOUT),
            paused_to_idle_timeout: Duration::from_secs(DEFAULT_PAUSED_TO_IDLE_TIMEOUT),
            resume_debounce: Duration::from_secs(DEFAULT_RESUME_DEBOUNCE),
            movement_threshold: DEFAULT_MOVEMENT_THRESHOLD,
            normalizing_movement_polls: DEFAULT_NORMALIZING_MOVEMENT_POLLS,
            poll_intervals: PollIntervals {
                temperature: Duration::from_secs(DEFAULT_TEMPERATURE_POLL_INTERVAL),
                pressure: Duration::from_secs(DEFAULT_PRESSURE_POLL_INTERVAL),
                humidity: Duration::from_secs(DEFAULT_HUMIDITY_POLL_INTERVAL),
                movement: Duration::from_secs(DEFAULT_MOVEMENT_POLL_INTERVAL),
            },
            poll_cadence: Duration::from_millis(DEFAULT_POLL_CADENCE_MS),
            max_light_intensity: DEFAULT_MAX_LIGHT_INTENSITY,
            light_off_transition: Duration::from_secs(DEFAULT_LIGHT_OFF_TRANSITION),
            autopoll: true,
            debug_enabled: false,
        }
    }
}

impl OrchestraConfig {
    fn timeout(&self, kind: TimerKind) -> Duration {
        match kind {
            TimerKind::ReadyToIdle => self.ready_to_idle_timeout,
            TimerKind::ReadyToRecording => self.ready_to_recording_timeout,
            TimerKind::PausedToIdle => self.paused_to_idle_timeout,
        }
    }
}

/// Light intensity for a ramp step in `[0, 1]`.
pub fn step_intensity(step: f64, max: u16) -> u16 {
    if !step.is_finite() {
        return 0;
    }
    (step * f64::from(max)).round().clamp(0.0, f64::from(max)) as u16
}

struct Core {
    config: OrchestraConfig,
    machine: Mutex<Machine>,
    poller: Mutex<Poller>,
    poll_thread: Mutex<Option<JoinHandle<()>>>,
    bus: EventBus,
    scheduler: Arc<dyn Scheduler>,
    clock: Arc<dyn TimeSource>,
    environment: Mutex<Box<dyn EnvironmentSensor>>,
    light: Mutex<Box<dyn LightActuator>>,
}

/// Handle to the sleep-cycle state machine. Cloning shares the machine.
#[derive(Clone)]
pub struct Orchestra {
    core: Arc<Core>,
}

impl Orchestra {
    pub fn new(
        config: OrchestraConfig,
        bus: EventBus,
        scheduler: Arc<dyn Scheduler>,
        clock: Arc<dyn TimeSource>,
        environment: Box<dyn EnvironmentSensor>,
        light: Box<dyn LightActuator>,
    ) -> Self {
        let poller = Poller::new(config.poll_intervals);
        Self {
            core: Arc::new(Core {
                config,
                machine: Mutex::new(Machine::new()),
                poller: Mutex::new(poller),
                poll_thread: Mutex::new(None),
                bus,
                scheduler,
                clock,
                environment: Mutex::new(environment),
                light: Mutex::new(light),
            }),
        }
    }

    /// Route the sensor's edges into this machine.
    pub fn attach_presence(&self, sensor: &dyn PresenceSensor) {
        let weak = Arc::downgrade(&self.core);
        sensor.on_edge(Box::new(move |level| {
            if let Some(core) = weak.upgrade() {
                Core::on_presence_edge(&core, level);
            }
        }));
    }

    /// Feed one presence edge. `rising` is the sensor level after the edge.
    pub fn on_presence_edge(&self, rising: bool) {
        Core::on_presence_edge(&self.core, rising);
    }

    /// Feed one environment sample.
    pub fn on_sample(&self, sample: Sample) {
        Core::on_sample(&self.core, sample);
    }

    /// Run one polling sweep and feed the resulting samples.
    pub fn sweep(&self) {
        Core::sweep(&self.core);
    }

    pub fn state(&self) -> OrchestraState {
        self.core.lock().state
    }

    /// Timers currently armed, for diagnostics.
    pub fn armed_timers(&self) -> Vec<TimerKind> {
        self.core.lock().armed()
    }

    /// Drive the wake light to `step` of its maximum intensity. Failures are
    /// logged and otherwise ignored.
    pub fn set_wake_light_step(&self, step: f64) {
        let intensity = step_intensity(step, self.core.config.max_light_intensity);
        let result = self.core.light().set(
            true,
            intensity,
            Duration::from_millis(WAKE_LIGHT_STEP_TRANSITION_MS),
        );
        if let Err(e) = result {
            log_warning!("Wake light step {step:.3} failed: {e}");
        }
    }

    /// Cancel every timer and stop the polling loop. The current state is
    /// kept; further input is ignored.
    pub fn shutdown(&self) {
        {
            let mut machine = self.core.lock();
            machine.stopped = true;
            machine.cancel_all();
            machine.poll_generation += 1;
        }

        let handle = self
            .core
            .poll_thread
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(handle) = handle
            && handle.join().is_err()
        {
            log_error!("Polling thread panicked");
        }
    }
}

impl WakeLight for Orchestra {
    fn set_wake_light_step(&self, step: f64) {
        Orchestra::set_wake_light_step(self, step);
    }
}

impl Core {
    fn lock(&self) -> MutexGuard<'_, Machine> {
        self.machine.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn light(&self) -> MutexGuard<'_, Box<dyn LightActuator>> {
        self.light.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn emit(&self, event_type: EventType, value: f64) {
        let event = Event::new(event_type, value, self.clock.now().naive_local());
        self.bus.log_event(event);
    }

    fn emit_state(&self, machine: &Machine, to: OrchestraState) {
        log_block_start!("Sleep cycle {} → {}", machine.state, to);
        self.emit(EventType::StateChange, f64::from(to.code()));
    }

    fn arm(core: &Arc<Core>, machine: &mut Machine, kind: TimerKind) {
        let generation = machine.next_generation();
        let weak = Arc::downgrade(core);
        let delay = core.config.timeout(kind);
        let handle = core.scheduler.schedule(
            delay,
            Box::new(move || {
                if let Some(core) = weak.upgrade() {
                    Core::on_timer(&core, kind, generation);
                }
            }),
        );
        machine.slot_mut(kind).arm(generation, handle);
        if core.config.debug_enabled {
            log_debug!("Armed {kind} timer ({}s)", delay.as_secs());
        }
    }

    fn on_timer(core: &Arc<Core>, kind: TimerKind, generation: u64) {
        let mut light_off = false;
        {
            let mut machine = core.lock();
            if machine.stopped || !machine.slot_mut(kind).claim(generation) {
                return;
            }

            match (kind, machine.state) {
                (TimerKind::ReadyToIdle, OrchestraState::Ready)
                | (TimerKind::PausedToIdle, OrchestraState::Paused) => {
                    core.go_idle(&mut machine);
                }
                (TimerKind::ReadyToRecording, OrchestraState::Ready) => {
                    core.emit_state(&machine, OrchestraState::Recording);
                    core.emit(EventType::StartRec, 0.0);
                    machine.state = OrchestraState::Recording;
                    light_off = true;
                }
                _ => {}
            }
        }

        if light_off {
            let transition = core.config.light_off_transition;
            if let Err(e) = core.light().set(false, 0, transition) {
                log_warning!("Could not switch the light off: {e}");
            }
        }
    }

    fn go_idle(&self, machine: &mut Machine) {
        machine.cancel_all();
        if machine.state == OrchestraState::Paused {
            self.emit(EventType::StopRec, 0.0);
        }
        self.emit_state(machine, OrchestraState::Idle);
        machine.state = OrchestraState::Idle;
        machine.poll_generation += 1;
    }

    fn on_presence_edge(core: &Arc<Core>, rising: bool) {
        let mut machine = core.lock();
        if machine.stopped {
            return;
        }
        machine.last_presence_edge = Some(core.clock.now());
        if !rising {
            return;
        }

        match machine.state {
            OrchestraState::Idle => {
                core.emit_state(&machine, OrchestraState::Ready);
                machine.state = OrchestraState::Ready;
                machine.normalizing_polls = 0;
                machine.poll_generation += 1;
                *core.poller.lock().unwrap_or_else(PoisonError::into_inner) =
                    Poller::new(core.config.poll_intervals);
                Core::arm(core, &mut machine, TimerKind::ReadyToIdle);
                if core.config.autopoll {
                    Core::start_polling(core, machine.poll_generation);
                }
            }
            OrchestraState::Recording => {
                core.emit_state(&machine, OrchestraState::Paused);
                machine.state = OrchestraState::Paused;
                core.emit(EventType::PauseRec, 0.0);
                Core::arm(core, &mut machine, TimerKind::PausedToIdle);
            }
            OrchestraState::Ready | OrchestraState::Paused => {}
        }
    }

    fn start_polling(core: &Arc<Core>, generation: u64) {
        let weak = Arc::downgrade(core);
        let spawned = thread::Builder::new()
            .name("deep-slumber-poll".to_string())
            .spawn(move || Core::poll_loop(weak, generation));

        match spawned {
            // A previous loop notices the new generation and exits on its own
            Ok(handle) => {
                *core.poll_thread.lock().unwrap_or_else(PoisonError::into_inner) = Some(handle);
            }
            Err(e) => {
                log_pipe!();
                log_critical!("Failed to start sensor polling: {e}");
            }
        }
    }

    fn poll_loop(weak: Weak<Core>, generation: u64) {
        loop {
            let Some(core) = weak.upgrade() else {
                return;
            };
            if !core.is_polling(generation) {
                return;
            }
            Core::sweep(&core);

            let cadence = core.config.poll_cadence;
            let clock = Arc::clone(&core.clock);
            drop(core);
            clock.sleep(cadence);
        }
    }

    fn is_polling(&self, generation: u64) -> bool {
        let machine = self.lock();
        !machine.stopped && machine.state != OrchestraState::Idle && machine.poll_generation == generation
    }

    fn sweep(core: &Arc<Core>) {
        let now = core.clock.now();
        let samples = {
            let mut poller = core.poller.lock().unwrap_or_else(PoisonError::into_inner);
            let mut environment = core.environment.lock().unwrap_or_else(PoisonError::into_inner);
            poller.sweep(now, environment.as_mut())
        };
        for sample in samples {
            Core::on_sample(core, sample);
        }
    }

    fn on_sample(core: &Arc<Core>, sample: Sample) {
        if sample.kind == SignalKind::Movement {
            Core::on_movement(core, sample.difference);
            return;
        }

        let machine = core.lock();
        if !machine.stopped && machine.state == OrchestraState::Recording {
            core.emit(sample.kind.event_type(), sample.reading.value());
        }
    }

    fn on_movement(core: &Arc<Core>, difference: f64) {
        let mut machine = core.lock();
        if machine.stopped {
            return;
        }

        let settled = machine.normalizing_polls >= core.config.normalizing_movement_polls;
        if difference <= core.config.movement_threshold || !settled {
            machine.normalizing_polls = machine.normalizing_polls.saturating_add(1);
            return;
        }

        if core.config.debug_enabled {
            log_debug!("Movement {difference:.3} in {}", machine.state);
        }
        machine.ready_to_idle.cancel();

        match machine.state {
            OrchestraState::Ready => {
                if !machine.ready_to_recording.is_armed() {
                    Core::arm(core, &mut machine, TimerKind::ReadyToRecording);
                }
            }
            OrchestraState::Recording => {
                core.emit(EventType::Movement, 0.0);
                core.emit(EventType::Movement, 1.0);
                core.emit(EventType::Movement, 0.0);
                machine.normalizing_polls = 0;
            }
            OrchestraState::Paused => {
                let now = core.clock.now();
                let debounce = to_delta(core.config.resume_debounce);
                let quiet = machine
                    .last_presence_edge
                    .is_none_or(|edge| now - edge > debounce);
                if quiet {
                    core.emit_state(&machine, OrchestraState::Recording);
                    machine.state = OrchestraState::Recording;
                    core.emit(EventType::ResumeRec, 0.0);
                    machine.paused_to_idle.cancel();
                }
            }
            OrchestraState::Idle => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::EventConsumer;
    use crate::orchestra::hardware::{
        DetachedEnvironment, MockLightActuator, MotionVector,
    };
    use crate::orchestra::polling::Reading;
    use crate::time_source::ManualClock;
    use chrono::{Local, TimeZone};
    use proptest::prelude::*;

    #[derive(Default)]
    struct Collect(Mutex<Vec<(EventType, f64)>>);

    impl EventConsumer for Collect {
        fn consume(&self, event: &Event) {
            self.0.lock().unwrap().push((event.event_type, event.value));
        }
    }

    impl Collect {
        fn take(&self) -> Vec<(EventType, f64)> {
            std::mem::take(&mut *self.0.lock().unwrap())
        }
    }

    struct Rig {
        orchestra: Orchestra,
        clock: Arc<ManualClock>,
        events: Arc<Collect>,
    }

    fn rig_with_light(light: Box<dyn LightActuator>) -> Rig {
        rig_with(OrchestraConfig::default(), light)
    }

    fn rig_with(config: OrchestraConfig, light: Box<dyn LightActuator>) -> Rig {
        let clock = Arc::new(ManualClock::new(
            Local.with_ymd_and_hms(2024, 2, 1, 22, 0, 0).unwrap(),
        ));
        let events = Arc::new(Collect::default());
        let config = OrchestraConfig {
            autopoll: false,
            ..config
        };
        let orchestra = Orchestra::new(
            config,
            EventBus::new(vec![events.clone() as Arc<dyn EventConsumer>]),
            clock.clone(),
            clock.clone(),
            Box::new(DetachedEnvironment),
            light,
        );
        Rig {
            orchestra,
            clock,
            events,
        }
    }

    fn rig() -> Rig {
        let mut light = MockLightActuator::new();
        light.expect_set().returning(|_, _, _| Ok(()));
        rig_with_light(Box::new(light))
    }

    fn movement(difference: f64) -> Sample {
        Sample {
            kind: SignalKind::Movement,
            reading: Reading::Motion(MotionVector::default()),
            difference,
        }
    }

    fn state_change(state: OrchestraState) -> (EventType, f64) {
        (EventType::StateChange, f64::from(state.code()))
    }

    /// IDLE → READY → RECORDING with the default timings.
    fn to_recording(rig: &Rig) {
        rig.orchestra.on_presence_edge(true);
        rig.orchestra.on_sample(movement(0.0));
        rig.orchestra.on_sample(movement(0.5));
        rig.clock.advance(Duration::from_secs(DEFAULT_READY_TO_RECORDING_TIMEOUT));
        assert_eq!(rig.orchestra.state(), OrchestraState::Recording);
        rig.events.take();
    }

    #[test]
    fn test_rising_edge_moves_idle_to_ready() {
        let rig = rig();
        rig.orchestra.on_presence_edge(false);
        assert_eq!(rig.orchestra.state(), OrchestraState::Idle);

        rig.orchestra.on_presence_edge(true);
        assert_eq!(rig.orchestra.state(), OrchestraState::Ready);
        assert_eq!(rig.events.take(), vec![state_change(OrchestraState::Ready)]);
        assert_eq!(rig.orchestra.armed_timers(), vec![TimerKind::ReadyToIdle]);
    }

    #[test]
    fn test_ready_falls_back_to_idle_without_movement() {
        let rig = rig();
        rig.orchestra.on_presence_edge(true);
        rig.events.take();

        rig.clock.advance(Duration::from_secs(DEFAULT_READY_TO_IDLE_TIMEOUT));
        assert_eq!(rig.orchestra.state(), OrchestraState::Idle);
        assert_eq!(rig.events.take(), vec![state_change(OrchestraState::Idle)]);
        assert!(rig.orchestra.armed_timers().is_empty());
    }

    #[test]
    fn test_movement_in_ready_starts_recording_and_dims_light() {
        let mut light = MockLightActuator::new();
        light
            .expect_set()
            .withf(|on, intensity, transition| {
                !*on && *intensity == 0 && *transition == Duration::from_secs(10)
            })
            .times(1)
            .returning(|_, _, _| Ok(()));
        let rig = rig_with_light(Box::new(light));

        rig.orchestra.on_presence_edge(true);
        // First sample only settles the sensor
        rig.orchestra.on_sample(movement(0.9));
        assert_eq!(rig.orchestra.armed_timers(), vec![TimerKind::ReadyToIdle]);

        rig.orchestra.on_sample(movement(0.9));
        assert_eq!(
            rig.orchestra.armed_timers(),
            vec![TimerKind::ReadyToRecording]
        );
        rig.events.take();

        rig.clock.advance(Duration::from_secs(DEFAULT_READY_TO_RECORDING_TIMEOUT));
        assert_eq!(rig.orchestra.state(), OrchestraState::Recording);
        assert_eq!(
            rig.events.take(),
            vec![
                state_change(OrchestraState::Recording),
                (EventType::StartRec, 0.0)
            ]
        );
    }

    #[test]
    fn test_repeated_movement_keeps_single_recording_timer() {
        let rig = rig();
        rig.orchestra.on_presence_edge(true);
        rig.orchestra.on_sample(movement(0.0));
        rig.orchestra.on_sample(movement(0.5));
        rig.clock.advance(Duration::from_secs(60));
        rig.orchestra.on_sample(movement(0.5));

        assert_eq!(rig.clock.pending(), 1);
        // Still fires on the first arming's deadline
        rig.clock.advance(Duration::from_secs(DEFAULT_READY_TO_RECORDING_TIMEOUT - 60));
        assert_eq!(rig.orchestra.state(), OrchestraState::Recording);
    }

    #[test]
    fn test_movement_while_recording_emits_pulse() {
        let rig = rig();
        to_recording(&rig);

        rig.orchestra.on_sample(movement(0.5));
        assert_eq!(
            rig.events.take(),
            vec![
                (EventType::Movement, 0.0),
                (EventType::Movement, 1.0),
                (EventType::Movement, 0.0)
            ]
        );

        // Counter was reset, the next sample only settles again
        rig.orchestra.on_sample(movement(0.5));
        assert!(rig.events.take().is_empty());
        rig.orchestra.on_sample(movement(0.01));
        assert!(rig.events.take().is_empty());
    }

    #[test]
    fn test_without_settling_polls_first_movement_counts() {
        let mut light = MockLightActuator::new();
        light.expect_set().returning(|_, _, _| Ok(()));
        let config = OrchestraConfig {
            normalizing_movement_polls: 0,
            ..OrchestraConfig::default()
        };
        let rig = rig_with(config, Box::new(light));

        rig.orchestra.on_presence_edge(true);
        rig.orchestra.on_sample(movement(0.5));
        assert_eq!(
            rig.orchestra.armed_timers(),
            vec![TimerKind::ReadyToRecording]
        );

        rig.clock.advance(Duration::from_secs(DEFAULT_READY_TO_RECORDING_TIMEOUT));
        rig.events.take();

        // Every qualifying sample pulses, none is spent on settling
        rig.orchestra.on_sample(movement(0.5));
        rig.orchestra.on_sample(movement(0.5));
        assert_eq!(rig.events.take().len(), 6);
    }

    #[test]
    fn test_environment_samples_only_reported_while_recording() {
        let rig = rig();
        let temperature = Sample {
            kind: SignalKind::Temperature,
            reading: Reading::Scalar(19.25),
            difference: 0.0,
        };

        rig.orchestra.on_sample(temperature);
        rig.orchestra.on_presence_edge(true);
        rig.events.take();
        rig.orchestra.on_sample(temperature);
        assert!(rig.events.take().is_empty());

        rig.orchestra.on_sample(movement(0.0));
        rig.orchestra.on_sample(movement(0.5));
        rig.clock.advance(Duration::from_secs(DEFAULT_READY_TO_RECORDING_TIMEOUT));
        rig.events.take();

        rig.orchestra.on_sample(temperature);
        assert_eq!(rig.events.take(), vec![(EventType::Temperature, 19.25)]);
    }

    #[test]
    fn test_pause_resume_respects_debounce() {
        let rig = rig();
        to_recording(&rig);

        rig.orchestra.on_presence_edge(true);
        assert_eq!(rig.orchestra.state(), OrchestraState::Paused);
        assert_eq!(
            rig.events.take(),
            vec![
                state_change(OrchestraState::Paused),
                (EventType::PauseRec, 0.0)
            ]
        );

        // Within the debounce window nothing happens
        rig.clock.advance(Duration::from_secs(1));
        rig.orchestra.on_sample(movement(0.5));
        assert_eq!(rig.orchestra.state(), OrchestraState::Paused);

        rig.clock.advance(Duration::from_secs(2));
        rig.orchestra.on_sample(movement(0.5));
        assert_eq!(rig.orchestra.state(), OrchestraState::Recording);
        assert_eq!(
            rig.events.take(),
            vec![
                state_change(OrchestraState::Recording),
                (EventType::ResumeRec, 0.0)
            ]
        );
        assert!(rig.orchestra.armed_timers().is_empty());
    }

    #[test]
    fn test_long_pause_stops_recording() {
        let rig = rig();
        to_recording(&rig);
        rig.orchestra.on_presence_edge(true);
        rig.events.take();

        rig.clock.advance(Duration::from_secs(DEFAULT_PAUSED_TO_IDLE_TIMEOUT));
        assert_eq!(rig.orchestra.state(), OrchestraState::Idle);
        assert_eq!(
            rig.events.take(),
            vec![(EventType::StopRec, 0.0), state_change(OrchestraState::Idle)]
        );
    }

    #[test]
    fn test_light_failure_is_swallowed() {
        let mut light = MockLightActuator::new();
        light
            .expect_set()
            .returning(|_, _, _| Err(anyhow::anyhow!("bridge unreachable")));
        let rig = rig_with_light(Box::new(light));

        rig.orchestra.set_wake_light_step(0.5);
        to_recording(&rig);
    }

    #[test]
    fn test_wake_light_step_scales_and_clamps() {
        assert_eq!(step_intensity(0.0, 255), 0);
        assert_eq!(step_intensity(0.5, 255), 128);
        assert_eq!(step_intensity(1.0, 255), 255);
        assert_eq!(step_intensity(1.7, 255), 255);
        assert_eq!(step_intensity(-0.2, 255), 0);
        assert_eq!(step_intensity(f64::NAN, 255), 0);

        let mut light = MockLightActuator::new();
        light
            .expect_set()
            .withf(|on, intensity, _| *on && *intensity == 64)
            .times(1)
            .returning(|_, _, _| Ok(()));
        let rig = rig_with_light(Box::new(light));
        rig.orchestra.set_wake_light_step(0.25);
    }

    #[test]
    fn test_shutdown_cancels_timers_and_ignores_input() {
        let rig = rig();
        rig.orchestra.on_presence_edge(true);
        rig.orchestra.shutdown();
        assert!(rig.orchestra.armed_timers().is_empty());

        rig.clock.advance(Duration::from_secs(DEFAULT_READY_TO_IDLE_TIMEOUT));
        rig.events.take();
        rig.orchestra.on_presence_edge(true);
        assert_eq!(rig.orchestra.state(), OrchestraState::Ready);
        assert!(rig.events.take().is_empty());
    }

    #[derive(Debug, Clone)]
    enum Input {
        Edge(bool),
        Move(f64),
        Wait(u64),
    }

    fn input() -> impl Strategy<Value = Input> {
        prop_oneof![
            any::<bool>().prop_map(Input::Edge),
            (0.0f64..0.2).prop_map(Input::Move),
            (0u64..700).prop_map(Input::Wait),
        ]
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(64))]

        #[test]
        fn prop_timer_slots_match_state(inputs in prop::collection::vec(input(), 0..40)) {
            let rig = rig();
            for step in inputs {
                match step {
                    Input::Edge(level) => rig.orchestra.on_presence_edge(level),
                    Input::Move(d) => rig.orchestra.on_sample(movement(d)),
                    Input::Wait(s) => rig.clock.advance(Duration::from_secs(s)),
                }

                let state = rig.orchestra.state();
                let armed = rig.orchestra.armed_timers();
                prop_assert!(armed.len() <= 2);
                prop_assert_eq!(rig.clock.pending(), armed.len());
                match state {
                    OrchestraState::Idle => prop_assert!(armed.is_empty()),
                    OrchestraState::Recording => prop_assert!(armed.is_empty()),
                    OrchestraState::Paused => {
                        prop_assert_eq!(armed, vec![TimerKind::PausedToIdle])
                    }
                    OrchestraState::Ready => prop_assert!(
                        !armed.contains(&TimerKind::PausedToIdle)
                    ),
                }
            }
        }
    }
}
