//! Sleep-cycle states and timer bookkeeping.

use chrono::{DateTime, Local};
use std::fmt;

use crate::timers::TimerHandle;

/// Where the sleeper is in the cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OrchestraState {
    Idle,
    Ready,
    Recording,
    Paused,
}

impl OrchestraState {
    /// Value carried by STATE_CHANGE events.
    pub fn code(self) -> u8 {
        match self {
            OrchestraState::Idle => 1,
            OrchestraState::Ready => 2,
            OrchestraState::Recording => 3,
            OrchestraState::Paused => 4,
        }
    }

    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            1 => Some(OrchestraState::Idle),
            2 => Some(OrchestraState::Ready),
            3 => Some(OrchestraState::Recording),
            4 => Some(OrchestraState::Paused),
            _ => None,
        }
    }
}

impl fmt::Display for OrchestraState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            OrchestraState::Idle => "IDLE",
            OrchestraState::Ready => "READY",
            OrchestraState::Recording => "RECORDING",
            OrchestraState::Paused => "PAUSED",
        };
        write!(f, "{name}")
    }
}

/// The three transition timers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerKind {
    ReadyToIdle,
    ReadyToRecording,
    PausedToIdle,
}

impl TimerKind {
    pub const ALL: [TimerKind; 3] = [
        TimerKind::ReadyToIdle,
        TimerKind::ReadyToRecording,
        TimerKind::PausedToIdle,
    ];
}

impl fmt::Display for TimerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TimerKind::ReadyToIdle => "ready→idle",
            TimerKind::ReadyToRecording => "ready→recording",
            TimerKind::PausedToIdle => "paused→idle",
        };
        write!(f, "{name}")
    }
}

/// Holds at most one live timer. The generation identifies which arming a
/// firing callback belongs to, so a superseded callback can tell it is stale.
#[derive(Debug, Default)]
pub(crate) struct TimerSlot {
    armed: Option<(u64, TimerHandle)>,
}

impl TimerSlot {
    pub(crate) fn arm(&mut self, generation: u64, handle: TimerHandle) {
        self.cancel();
        self.armed = Some((generation, handle));
    }

    pub(crate) fn cancel(&mut self) {
        if let Some((_, handle)) = self.armed.take() {
            handle.cancel();
        }
    }

    pub(crate) fn is_armed(&self) -> bool {
        self.armed.is_some()
    }

    /// Claim the slot for a firing callback. Returns `false` when the callback
    /// was cancelled or superseded.
    pub(crate) fn claim(&mut self, generation: u64) -> bool {
        match &self.armed {
            Some((armed, _)) if *armed == generation => {
                self.armed = None;
                true
            }
            _ => false,
        }
    }
}

/// Everything guarded by the state machine lock.
#[derive(Debug)]
pub(crate) struct Machine {
    pub(crate) state: OrchestraState,
    pub(crate) ready_to_idle: TimerSlot,
    pub(crate) ready_to_recording: TimerSlot,
    pub(crate) paused_to_idle: TimerSlot,
    pub(crate) next_generation: u64,
    pub(crate) normalizing_polls: u32,
    pub(crate) last_presence_edge: Option<DateTime<Local>>,
    /// Bumped whenever the polling loop must restart or stop.
    pub(crate) poll_generation: u64,
    pub(crate) stopped: bool,
}

impl Machine {
    pub(crate) fn new() -> Self {
        Self {
            state: OrchestraState::Idle,
            ready_to_idle: TimerSlot::default(),
            ready_to_recording: TimerSlot::default(),
            paused_to_idle: TimerSlot::default(),
            next_generation: 0,
            normalizing_polls: 0,
            last_presence_edge: None,
            poll_generation: 0,
            stopped: false,
        }
    }

    pub(crate) fn slot_mut(&mut self, kind: TimerKind) -> &mut TimerSlot {
        match kind {
            TimerKind::ReadyToIdle => &mut self.ready_to_idle,
            TimerKind::ReadyToRecording => &mut self.ready_to_recording,
            TimerKind::PausedToIdle => &mut self.paused_to_idle,
        }
    }

    pub(crate) fn next_generation(&mut self) -> u64 {
        self.next_generation += 1;
        self.next_generation
    }

    pub(crate) fn cancel_all(&mut self) {
        for kind in TimerKind::ALL {
            self.slot_mut(kind).cancel();
        }
    }

    pub(crate) fn armed(&self) -> Vec<TimerKind> {
        let mut armed = Vec::new();
        if self.ready_to_idle.is_armed() {
            armed.push(TimerKind::ReadyToIdle);
        }
        if self.ready_to_recording.is_armed() {
            armed.push(TimerKind::ReadyToRecording);
        }
        if self.paused_to_idle.is_armed() {
            armed.push(TimerKind::PausedToIdle);
        }
        armed
    }
}
