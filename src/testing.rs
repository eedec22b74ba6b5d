//! In-memory stand-ins for the network and the hardware.
//!
//! Available to unit tests and, through the `testing-support` feature, to the
//! integration suites under `tests/`.

use std::collections::VecDeque;
use std::io;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex, PoisonError};
use std::time::{Duration, Instant};

use crate::bus::EventConsumer;
use crate::orchestra::hardware::{
    EdgeCallback, EnvironmentSensor, LightActuator, MotionVector, PresenceSensor, SensorError,
};
use crate::outpost::link::{Connector, Link, LinkError};
use crate::outpost::message::{Event, EventType, Message, decode_frame};
use crate::risenshine::WakeLight;

fn wait_until(limit: Duration, mut done: impl FnMut() -> bool) -> bool {
    let start = Instant::now();
    loop {
        if done() {
            return true;
        }
        if start.elapsed() >= limit {
            return false;
        }
        std::thread::sleep(Duration::from_millis(2));
    }
}

/// Bus consumer that keeps every event.
#[derive(Default)]
pub struct RecordingConsumer {
    events: Mutex<Vec<Event>>,
}

impl RecordingConsumer {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn events(&self) -> Vec<Event> {
        self.events.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Event types with their values, in arrival order.
    pub fn kinds(&self) -> Vec<(EventType, f64)> {
        self.events()
            .iter()
            .map(|e| (e.event_type, e.value))
            .collect()
    }

    /// Drain the recorded events.
    pub fn take(&self) -> Vec<(EventType, f64)> {
        let drained = std::mem::take(&mut *self.events.lock().unwrap_or_else(PoisonError::into_inner));
        drained.iter().map(|e| (e.event_type, e.value)).collect()
    }

    /// Wait until at least `count` events arrived.
    pub fn wait_for(&self, count: usize, limit: Duration) -> bool {
        wait_until(limit, || {
            self.events.lock().unwrap_or_else(PoisonError::into_inner).len() >= count
        })
    }
}

impl EventConsumer for RecordingConsumer {
    fn consume(&self, event: &Event) {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(event.clone());
    }
}

/// One `LightActuator::set` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LightCall {
    pub on: bool,
    pub intensity: u16,
    pub transition: Duration,
}

/// Light that records ramp steps and actuator calls. Clones share the record.
#[derive(Clone, Default)]
pub struct RecordingLight {
    steps: Arc<Mutex<Vec<f64>>>,
    calls: Arc<Mutex<Vec<LightCall>>>,
    failing: Arc<AtomicBool>,
}

impl RecordingLight {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn steps(&self) -> Vec<f64> {
        self.steps.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub fn calls(&self) -> Vec<LightCall> {
        self.calls.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Make subsequent actuator calls fail (they are still recorded).
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }
}

impl WakeLight for RecordingLight {
    fn set_wake_light_step(&self, step: f64) {
        self.steps
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(step);
    }
}

impl LightActuator for RecordingLight {
    fn set(&mut self, on: bool, intensity: u16, transition: Duration) -> anyhow::Result<()> {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(LightCall {
                on,
                intensity,
                transition,
            });
        if self.failing.load(Ordering::SeqCst) {
            anyhow::bail!("light bridge unreachable");
        }
        Ok(())
    }
}

#[derive(Default)]
struct EnvironmentScript {
    motion: VecDeque<MotionVector>,
    last_motion: Option<MotionVector>,
    temperature: f64,
    pressure: f64,
    humidity: f64,
    reads: usize,
}

/// Environment board fed from a script. Motion readings are consumed in
/// order; once the script runs dry the last reading repeats.
#[derive(Clone, Default)]
pub struct ScriptedEnvironment {
    script: Arc<Mutex<EnvironmentScript>>,
}

impl ScriptedEnvironment {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_motion(&self, x: f64, y: f64, z: f64) {
        self.script
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .motion
            .push_back(MotionVector::new(x, y, z));
    }

    pub fn set_climate(&self, temperature: f64, pressure: f64, humidity: f64) {
        let mut script = self.script.lock().unwrap_or_else(PoisonError::into_inner);
        script.temperature = temperature;
        script.pressure = pressure;
        script.humidity = humidity;
    }

    /// Total number of reads served.
    pub fn reads(&self) -> usize {
        self.script.lock().unwrap_or_else(PoisonError::into_inner).reads
    }

    fn with<T>(&self, f: impl FnOnce(&mut EnvironmentScript) -> T) -> T {
        let mut script = self.script.lock().unwrap_or_else(PoisonError::into_inner);
        script.reads += 1;
        f(&mut script)
    }
}

impl EnvironmentSensor for ScriptedEnvironment {
    fn temperature(&mut self) -> Result<f64, SensorError> {
        Ok(self.with(|s| s.temperature))
    }

    fn pressure(&mut self) -> Result<f64, SensorError> {
        Ok(self.with(|s| s.pressure))
    }

    fn humidity(&mut self) -> Result<f64, SensorError> {
        Ok(self.with(|s| s.humidity))
    }

    fn movement_vector(&mut self) -> Result<MotionVector, SensorError> {
        self.with(|s| {
            if let Some(next) = s.motion.pop_front() {
                s.last_motion = Some(next);
            }
            s.last_motion
                .ok_or_else(|| SensorError::Read("no motion scripted".to_string()))
        })
    }
}

/// Presence sensor whose edges are triggered by the test.
#[derive(Clone, Default)]
pub struct ManualPresence {
    level: Arc<AtomicBool>,
    callback: Arc<Mutex<Option<EdgeCallback>>>,
}

impl ManualPresence {
    pub fn new() -> Self {
        Self::default()
    }

    /// Change the level and notify the installed callback.
    pub fn trigger(&self, level: bool) {
        self.level.store(level, Ordering::SeqCst);
        let callback = self.callback.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(callback) = callback.as_ref() {
            callback(level);
        }
    }
}

impl PresenceSensor for ManualPresence {
    fn read(&self) -> bool {
        self.level.load(Ordering::SeqCst)
    }

    fn on_edge(&self, callback: EdgeCallback) {
        *self.callback.lock().unwrap_or_else(PoisonError::into_inner) = Some(callback);
    }
}

/// One direction of an in-memory connection.
#[derive(Default)]
struct Pipe {
    frames: Mutex<VecDeque<String>>,
    ready: Condvar,
}

impl Pipe {
    fn push(&self, text: String) {
        self.frames
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push_back(text);
        self.ready.notify_all();
    }

    /// Frames queued before a close are still delivered.
    fn pop(&self, timeout: Duration, closed: &AtomicBool) -> Result<Option<String>, LinkError> {
        let deadline = Instant::now() + timeout;
        let mut frames = self.frames.lock().unwrap_or_else(PoisonError::into_inner);
        loop {
            if let Some(text) = frames.pop_front() {
                return Ok(Some(text));
            }
            if closed.load(Ordering::SeqCst) {
                return Err(LinkError::Closed);
            }
            let now = Instant::now();
            if now >= deadline {
                return Ok(None);
            }
            frames = self
                .ready
                .wait_timeout(frames, deadline - now)
                .unwrap_or_else(PoisonError::into_inner)
                .0;
        }
    }
}

#[derive(Default)]
struct Channel {
    to_server: Pipe,
    to_device: Pipe,
    closed: AtomicBool,
}

impl Channel {
    fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
        // Wake blocked readers on both ends
        for pipe in [&self.to_server, &self.to_device] {
            let _guard = pipe.frames.lock().unwrap_or_else(PoisonError::into_inner);
            pipe.ready.notify_all();
        }
    }
}

#[derive(Default)]
struct ServerState {
    accepting: AtomicBool,
    attempts: AtomicUsize,
    pending: Mutex<VecDeque<Arc<Channel>>>,
    arrived: Condvar,
}

/// Server end of an in-memory network.
#[derive(Clone)]
pub struct MemoryServer {
    state: Arc<ServerState>,
}

impl Default for MemoryServer {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryServer {
    /// A server that accepts connections.
    pub fn new() -> Self {
        let state = ServerState::default();
        state.accepting.store(true, Ordering::SeqCst);
        Self {
            state: Arc::new(state),
        }
    }

    pub fn connector(&self) -> MemoryConnector {
        MemoryConnector {
            state: Arc::clone(&self.state),
        }
    }

    /// Refuse (or accept again) new connections.
    pub fn set_accepting(&self, accepting: bool) {
        self.state.accepting.store(accepting, Ordering::SeqCst);
    }

    /// Connection attempts seen so far, refused ones included.
    pub fn attempts(&self) -> usize {
        self.state.attempts.load(Ordering::SeqCst)
    }

    /// Wait for the next device connection.
    pub fn accept(&self, timeout: Duration) -> Option<ServerConnection> {
        let deadline = Instant::now() + timeout;
        let mut pending = self.state.pending.lock().unwrap_or_else(PoisonError::into_inner);
        loop {
            if let Some(channel) = pending.pop_front() {
                return Some(ServerConnection { channel });
            }
            let now = Instant::now();
            if now >= deadline {
                return None;
            }
            pending = self
                .state
                .arrived
                .wait_timeout(pending, deadline - now)
                .unwrap_or_else(PoisonError::into_inner)
                .0;
        }
    }
}

/// Server view of one connection. Dropping it closes the connection.
pub struct ServerConnection {
    channel: Arc<Channel>,
}

impl ServerConnection {
    /// Next frame sent by the device, `None` on timeout or close.
    pub fn recv(&self, timeout: Duration) -> Option<String> {
        self.channel
            .to_server
            .pop(timeout, &self.channel.closed)
            .ok()
            .flatten()
    }

    /// Next frame, decoded.
    pub fn recv_message(&self, timeout: Duration) -> Option<Message> {
        self.recv(timeout).and_then(|text| decode_frame(&text).ok())
    }

    pub fn send(&self, text: &str) {
        self.channel.to_device.push(text.to_string());
    }

    pub fn send_message(&self, message: &Message) {
        self.send(&message.encode());
    }

    pub fn close(&self) {
        self.channel.close();
    }

    pub fn is_closed(&self) -> bool {
        self.channel.closed.load(Ordering::SeqCst)
    }
}

impl Drop for ServerConnection {
    fn drop(&mut self) {
        self.channel.close();
    }
}

/// Device-side connector into a [`MemoryServer`].
pub struct MemoryConnector {
    state: Arc<ServerState>,
}

impl Connector for MemoryConnector {
    fn connect(&self) -> Result<Box<dyn Link>, LinkError> {
        self.state.attempts.fetch_add(1, Ordering::SeqCst);
        if !self.state.accepting.load(Ordering::SeqCst) {
            return Err(LinkError::Connect {
                address: self.describe(),
                source: Box::new(io::Error::new(
                    io::ErrorKind::ConnectionRefused,
                    "server is not accepting",
                )),
            });
        }

        let channel = Arc::new(Channel::default());
        self.state
            .pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push_back(Arc::clone(&channel));
        self.state.arrived.notify_all();
        Ok(Box::new(MemoryLink { channel }))
    }

    fn describe(&self) -> String {
        "memory://server".to_string()
    }
}

struct MemoryLink {
    channel: Arc<Channel>,
}

impl Link for MemoryLink {
    fn send(&mut self, text: &str) -> Result<(), LinkError> {
        if self.channel.closed.load(Ordering::SeqCst) {
            return Err(LinkError::Closed);
        }
        self.channel.to_server.push(text.to_string());
        Ok(())
    }

    fn receive(&mut self, timeout: Duration) -> Result<Option<String>, LinkError> {
        self.channel.to_device.pop(timeout, &self.channel.closed)
    }
}

impl Drop for MemoryLink {
    fn drop(&mut self) {
        self.channel.close();
    }
}
