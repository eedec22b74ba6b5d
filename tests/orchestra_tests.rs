//! Sleep-cycle scenarios driven through the public API with simulated time.

use chrono::{Local, TimeZone};
use std::sync::Arc;
use std::time::Duration;

use deep_slumber::bus::{EventBus, EventConsumer};
use deep_slumber::logger::Log;
use deep_slumber::orchestra::{Orchestra, OrchestraConfig, OrchestraState, TimerKind};
use deep_slumber::outpost::message::EventType;
use deep_slumber::testing::{
    LightCall, ManualPresence, RecordingConsumer, RecordingLight, ScriptedEnvironment,
};
use deep_slumber::time_source::ManualClock;

struct Bedroom {
    clock: Arc<ManualClock>,
    orchestra: Orchestra,
    presence: ManualPresence,
    environment: ScriptedEnvironment,
    light: RecordingLight,
    events: Arc<RecordingConsumer>,
}

impl Bedroom {
    fn new() -> Self {
        Log::set_enabled(false);

        let clock = Arc::new(ManualClock::new(
            Local.with_ymd_and_hms(2024, 3, 9, 22, 0, 0).unwrap(),
        ));
        let presence = ManualPresence::new();
        let environment = ScriptedEnvironment::new();
        let light = RecordingLight::new();
        let events = RecordingConsumer::new();

        let config = OrchestraConfig {
            autopoll: false,
            ..OrchestraConfig::default()
        };
        let orchestra = Orchestra::new(
            config,
            EventBus::new(vec![events.clone() as Arc<dyn EventConsumer>]),
            clock.clone(),
            clock.clone(),
            Box::new(environment.clone()),
            Box::new(light.clone()),
        );
        orchestra.attach_presence(&presence);

        environment.push_motion(0.0, 0.0, 0.0);
        environment.set_climate(21.5, 1013.0, 40.0);

        Self {
            clock,
            orchestra,
            presence,
            environment,
            light,
            events,
        }
    }

    fn advance(&self, secs: u64) {
        self.clock.advance(Duration::from_secs(secs));
    }

    /// Someone lies down and moves: READY, then RECORDING once the
    /// ready-to-recording timeout passes.
    fn fall_asleep(&self) {
        self.presence.trigger(true);
        self.orchestra.sweep();

        self.advance(1);
        self.environment.push_motion(0.1, 0.0, 0.0);
        self.orchestra.sweep();

        self.advance(300);
        assert_eq!(self.orchestra.state(), OrchestraState::Recording);
        self.events.take();
    }
}

#[test]
fn test_full_night() {
    let room = Bedroom::new();

    room.presence.trigger(true);
    assert_eq!(room.orchestra.state(), OrchestraState::Ready);
    assert_eq!(room.events.take(), vec![(EventType::StateChange, 2.0)]);
    assert_eq!(room.orchestra.armed_timers(), vec![TimerKind::ReadyToIdle]);

    // First movement reading only establishes the baseline
    room.orchestra.sweep();
    assert!(room.events.take().is_empty());

    room.advance(1);
    room.environment.push_motion(0.1, 0.0, 0.0);
    room.orchestra.sweep();
    assert_eq!(
        room.orchestra.armed_timers(),
        vec![TimerKind::ReadyToRecording]
    );

    room.advance(300);
    assert_eq!(room.orchestra.state(), OrchestraState::Recording);
    assert_eq!(
        room.events.take(),
        vec![(EventType::StateChange, 3.0), (EventType::StartRec, 0.0)]
    );
    assert_eq!(
        room.light.calls().last(),
        Some(&LightCall {
            on: false,
            intensity: 0,
            transition: Duration::from_secs(10),
        })
    );

    // Climate readings are reported while recording
    room.advance(300);
    room.orchestra.sweep();
    assert_eq!(
        room.events.take(),
        vec![
            (EventType::Temperature, 21.5),
            (EventType::Pressure, 1013.0),
            (EventType::Humidity, 40.0),
        ]
    );

    room.advance(1);
    room.environment.push_motion(0.3, 0.0, 0.0);
    room.orchestra.sweep();
    assert_eq!(
        room.events.take(),
        vec![
            (EventType::Movement, 0.0),
            (EventType::Movement, 1.0),
            (EventType::Movement, 0.0),
        ]
    );

    // Getting up pauses, staying away ends the session
    room.presence.trigger(false);
    room.presence.trigger(true);
    assert_eq!(room.orchestra.state(), OrchestraState::Paused);
    assert_eq!(
        room.events.take(),
        vec![(EventType::StateChange, 4.0), (EventType::PauseRec, 0.0)]
    );

    room.advance(600);
    assert_eq!(room.orchestra.state(), OrchestraState::Idle);
    assert_eq!(
        room.events.take(),
        vec![(EventType::StopRec, 0.0), (EventType::StateChange, 1.0)]
    );
    assert!(room.orchestra.armed_timers().is_empty());
}

#[test]
fn test_nobody_moves_returns_to_idle() {
    let room = Bedroom::new();

    room.presence.trigger(true);
    room.orchestra.sweep();
    room.events.take();

    room.advance(179);
    assert_eq!(room.orchestra.state(), OrchestraState::Ready);

    room.advance(1);
    assert_eq!(room.orchestra.state(), OrchestraState::Idle);
    assert_eq!(room.events.take(), vec![(EventType::StateChange, 1.0)]);
    assert_eq!(room.clock.pending(), 0);
}

#[test]
fn test_resume_waits_for_debounce() {
    let room = Bedroom::new();
    room.fall_asleep();

    room.presence.trigger(true);
    assert_eq!(room.orchestra.state(), OrchestraState::Paused);
    room.events.take();

    // Movement right after the presence edge is the person getting up
    room.advance(1);
    room.environment.push_motion(0.5, 0.0, 0.0);
    room.orchestra.sweep();
    assert_eq!(room.orchestra.state(), OrchestraState::Paused);

    room.advance(2);
    room.environment.push_motion(0.9, 0.0, 0.0);
    room.orchestra.sweep();
    assert_eq!(room.orchestra.state(), OrchestraState::Recording);
    assert_eq!(
        room.events.take(),
        vec![(EventType::StateChange, 3.0), (EventType::ResumeRec, 0.0)]
    );
    assert!(room.orchestra.armed_timers().is_empty());
}

#[test]
fn test_failing_light_does_not_block_recording() {
    let room = Bedroom::new();
    room.light.set_failing(true);

    room.fall_asleep();

    assert_eq!(room.orchestra.state(), OrchestraState::Recording);
    assert_eq!(room.light.calls().len(), 1);
}

#[test]
fn test_wake_light_steps_scale_to_max_intensity() {
    let room = Bedroom::new();

    room.orchestra.set_wake_light_step(0.5);
    room.orchestra.set_wake_light_step(1.0);

    let calls = room.light.calls();
    assert_eq!(calls.len(), 2);
    assert!(calls.iter().all(|c| c.on));
    assert_eq!(calls[0].intensity, 128);
    assert_eq!(calls[1].intensity, 255);
}

#[test]
fn test_shutdown_freezes_machine() {
    let room = Bedroom::new();

    room.presence.trigger(true);
    room.events.take();
    room.orchestra.shutdown();

    room.advance(3600);
    room.presence.trigger(false);
    room.presence.trigger(true);

    assert_eq!(room.orchestra.state(), OrchestraState::Ready);
    assert!(room.events.take().is_empty());
    assert!(room.orchestra.armed_timers().is_empty());
}
