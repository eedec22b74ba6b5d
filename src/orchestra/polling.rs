//! Environment polling.
//!
//! A [`Poller`] is created each time the polling loop (re)starts. Every sweep
//! visits the four signals in a fixed order and reads the ones whose interval
//! elapsed (or that were never read), producing [`Sample`]s for the state
//! machine.

use chrono::{DateTime, Local};
use std::time::Duration;

use super::hardware::{EnvironmentSensor, MotionVector, SensorError};
use crate::outpost::message::EventType;
use crate::time_source::to_delta;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SignalKind {
    Temperature,
    Pressure,
    Humidity,
    Movement,
}

impl SignalKind {
    /// Sweep order.
    pub const ALL: [SignalKind; 4] = [
        SignalKind::Temperature,
        SignalKind::Pressure,
        SignalKind::Humidity,
        SignalKind::Movement,
    ];

    fn index(self) -> usize {
        match self {
            SignalKind::Temperature => 0,
            SignalKind::Pressure => 1,
            SignalKind::Humidity => 2,
            SignalKind::Movement => 3,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            SignalKind::Temperature => "temperature",
            SignalKind::Pressure => "pressure",
            SignalKind::Humidity => "humidity",
            SignalKind::Movement => "movement",
        }
    }

    pub fn event_type(self) -> EventType {
        match self {
            SignalKind::Temperature => EventType::Temperature,
            SignalKind::Pressure => EventType::Pressure,
            SignalKind::Humidity => EventType::Humidity,
            SignalKind::Movement => EventType::Movement,
        }
    }

    fn read(self, sensor: &mut dyn EnvironmentSensor) -> Result<Reading, SensorError> {
        Ok(match self {
            SignalKind::Temperature => Reading::Scalar(sensor.temperature()?),
            SignalKind::Pressure => Reading::Scalar(sensor.pressure()?),
            SignalKind::Humidity => Reading::Scalar(sensor.humidity()?),
            SignalKind::Movement => Reading::Motion(sensor.movement_vector()?),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Reading {
    Scalar(f64),
    Motion(MotionVector),
}

impl Reading {
    /// Change since `previous`. Only motion readings carry a difference;
    /// scalar signals and first readings report 0.
    pub fn difference(&self, previous: Option<&Reading>) -> f64 {
        match (self, previous) {
            (Reading::Motion(now), Some(Reading::Motion(before))) => now.distance(before),
            _ => 0.0,
        }
    }

    /// Value as reported in an event.
    pub fn value(&self) -> f64 {
        match self {
            Reading::Scalar(v) => *v,
            Reading::Motion(m) => m.x.abs() + m.y.abs() + m.z.abs(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct PollState {
    pub last_poll_time: Option<DateTime<Local>>,
    pub last_value: Option<Reading>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollIntervals {
    pub temperature: Duration,
    pub pressure: Duration,
    pub humidity: Duration,
    pub movement: Duration,
}

impl PollIntervals {
    pub fn for_kind(&self, kind: SignalKind) -> Duration {
        match kind {
            SignalKind::Temperature => self.temperature,
            SignalKind::Pressure => self.pressure,
            SignalKind::Humidity => self.humidity,
            SignalKind::Movement => self.movement,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sample {
    pub kind: SignalKind,
    pub reading: Reading,
    pub difference: f64,
}

#[derive(Debug, Clone)]
pub struct Poller {
    intervals: PollIntervals,
    states: [PollState; 4],
}

impl Poller {
    pub fn new(intervals: PollIntervals) -> Self {
        Self {
            intervals,
            states: Default::default(),
        }
    }

    pub fn state(&self, kind: SignalKind) -> &PollState {
        &self.states[kind.index()]
    }

    fn is_due(&self, kind: SignalKind, now: DateTime<Local>) -> bool {
        let interval = to_delta(self.intervals.for_kind(kind));
        self.state(kind)
            .last_poll_time
            .is_none_or(|last| now - last >= interval)
    }

    /// Read every due signal once. A failed read still counts as a poll, so a
    /// broken sensor is retried on its normal interval rather than every sweep.
    pub fn sweep(&mut self, now: DateTime<Local>, sensor: &mut dyn EnvironmentSensor) -> Vec<Sample> {
        let mut samples = Vec::new();

        for kind in SignalKind::ALL {
            if !self.is_due(kind, now) {
                continue;
            }

            let state = &mut self.states[kind.index()];
            state.last_poll_time = Some(now);

            match kind.read(sensor) {
                Ok(reading) => {
                    let difference = reading.difference(state.last_value.as_ref());
                    state.last_value = Some(reading);
                    samples.push(Sample {
                        kind,
                        reading,
                        difference,
                    });
                }
                Err(e) => {
                    log_warning!("Polling {} failed: {e}", kind.name());
                }
            }
        }

        samples
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::orchestra::hardware::MockEnvironmentSensor;
    use chrono::{TimeDelta, TimeZone};

    fn intervals() -> PollIntervals {
        PollIntervals {
            temperature: Duration::from_secs(600),
            pressure: Duration::from_secs(600),
            humidity: Duration::from_secs(600),
            movement: Duration::from_secs(1),
        }
    }

    fn start() -> DateTime<Local> {
        Local.with_ymd_and_hms(2024, 5, 1, 23, 0, 0).unwrap()
    }

    #[test]
    fn test_first_sweep_reads_everything_without_difference() {
        let mut sensor = MockEnvironmentSensor::new();
        sensor.expect_temperature().times(1).returning(|| Ok(21.5));
        sensor.expect_pressure().times(1).returning(|| Ok(1013.0));
        sensor.expect_humidity().times(1).returning(|| Ok(40.0));
        sensor
            .expect_movement_vector()
            .times(1)
            .returning(|| Ok(MotionVector::new(0.3, 0.3, 0.3)));

        let mut poller = Poller::new(intervals());
        let samples = poller.sweep(start(), &mut sensor);

        let kinds: Vec<SignalKind> = samples.iter().map(|s| s.kind).collect();
        assert_eq!(kinds, SignalKind::ALL.to_vec());
        assert!(samples.iter().all(|s| s.difference == 0.0));
        assert_eq!(samples[0].reading.value(), 21.5);
    }

    #[test]
    fn test_only_due_signals_are_read() {
        let mut sensor = MockEnvironmentSensor::new();
        sensor.expect_temperature().times(1).returning(|| Ok(20.0));
        sensor.expect_pressure().times(1).returning(|| Ok(1000.0));
        sensor.expect_humidity().times(1).returning(|| Ok(50.0));
        let mut readings = vec![
            MotionVector::new(0.0, 0.0, 0.0),
            MotionVector::new(0.1, -0.1, 0.0),
        ]
        .into_iter();
        sensor
            .expect_movement_vector()
            .times(2)
            .returning(move || Ok(readings.next().unwrap()));

        let mut poller = Poller::new(intervals());
        poller.sweep(start(), &mut sensor);
        let samples = poller.sweep(start() + TimeDelta::seconds(1), &mut sensor);

        assert_eq!(samples.len(), 1);
        assert_eq!(samples[0].kind, SignalKind::Movement);
        assert!((samples[0].difference - 0.2).abs() < 1e-12);
    }

    #[test]
    fn test_failed_read_keeps_value_and_updates_time() {
        let mut sensor = MockEnvironmentSensor::new();
        sensor
            .expect_temperature()
            .returning(|| Err(SensorError::Read("i2c timeout".to_string())));
        sensor.expect_pressure().returning(|| Ok(1000.0));
        sensor.expect_humidity().returning(|| Ok(50.0));
        sensor
            .expect_movement_vector()
            .returning(|| Err(SensorError::NotAttached));

        let mut poller = Poller::new(intervals());
        let samples = poller.sweep(start(), &mut sensor);

        assert_eq!(samples.len(), 2);
        let temperature = poller.state(SignalKind::Temperature);
        assert_eq!(temperature.last_poll_time, Some(start()));
        assert_eq!(temperature.last_value, None);
    }

    #[test]
    fn test_scalar_difference_is_zero() {
        let before = Reading::Scalar(20.0);
        assert_eq!(Reading::Scalar(25.0).difference(Some(&before)), 0.0);
        assert_eq!(
            Reading::Motion(MotionVector::new(1.0, 0.0, 0.0)).difference(None),
            0.0
        );
    }
}
