//! Reconnecting duplex channel to the deep-slumber server.
//!
//! [`Outpost::connect`] owns the calling thread until shutdown. Each session
//! starts with a HELLO frame, then alternates between flushing the outbound
//! queue and waiting briefly for inbound frames, which are decoded and handed
//! to the registered listeners. When a session fails, the outpost waits for
//! the configured hold-off and tries again. Messages submitted in the meantime
//! stay queued and are delivered in submission order once a link is back.
//!
//! Producers never touch the send queue. [`Outpost::submit`] hands messages
//! over a bounded channel; the connection loop drains it into a backlog it
//! owns, and a message leaves the backlog only once its send succeeded.

pub mod link;
pub mod message;

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::mpsc::{self, Receiver, SyncSender, TrySendError};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::thread;
use std::time::{Duration, Instant};

use crate::bus::EventConsumer;
use crate::common::constants::*;
use link::{Connector, Link, LinkError};
use message::{Event, Hello, Message, MessageType, decode_frame};

/// Receives inbound messages from the server.
pub trait OutpostListener: Send + Sync {
    fn on_message(&self, message: &Message);
}

/// Runtime parameters of the transport.
#[derive(Debug, Clone, PartialEq)]
pub struct OutpostConfig {
    pub hardware_id: String,
    pub connection_holdoff: Duration,
    /// `None` disables outbound heartbeats.
    pub heartbeat_interval: Option<Duration>,
    pub session_poll_interval: Duration,
    pub queue_capacity: usize,
    pub debug_enabled: bool,
}

impl Default for OutpostConfig {
    fn default() -> Self {
        Self {
            hardware_id: DEFAULT_HARDWARE_ID.to_string(),
            connection_holdoff: Duration::from_secs(DEFAULT_CONNECTION_HOLDOFF),
            heartbeat_interval: None,
            session_poll_interval: Duration::from_millis(SESSION_POLL_INTERVAL_MS),
            queue_capacity: OUTBOUND_QUEUE_CAPACITY,
            debug_enabled: false,
        }
    }
}

struct Registration {
    listener: Arc<dyn OutpostListener>,
    types: Option<Vec<MessageType>>,
}

impl Registration {
    fn accepts(&self, kind: MessageType) -> bool {
        self.types.as_ref().is_none_or(|types| types.contains(&kind))
    }

    fn is(&self, listener: &Arc<dyn OutpostListener>) -> bool {
        identity(&self.listener) == identity(listener)
    }
}

fn identity(listener: &Arc<dyn OutpostListener>) -> *const () {
    Arc::as_ptr(listener) as *const ()
}

/// Server connection with an outbound queue and inbound listener registry.
pub struct Outpost {
    config: OutpostConfig,
    connector: Box<dyn Connector>,
    outbound: SyncSender<Message>,
    inbox: Mutex<Receiver<Message>>,
    // Submitted and not yet sent
    in_flight: AtomicUsize,
    listeners: RwLock<Vec<Registration>>,
    running: Arc<AtomicBool>,
}

impl Outpost {
    /// `running` is shared with the signal handler; clearing it ends
    /// [`Outpost::connect`].
    pub fn new(config: OutpostConfig, connector: Box<dyn Connector>, running: Arc<AtomicBool>) -> Self {
        let (outbound, inbox) = mpsc::sync_channel(config.queue_capacity.max(1));
        Self {
            config,
            connector,
            outbound,
            inbox: Mutex::new(inbox),
            in_flight: AtomicUsize::new(0),
            listeners: RwLock::new(Vec::new()),
            running,
        }
    }

    /// Move submitted messages behind the backlog, up to the queue capacity.
    fn collect(&self, backlog: &mut VecDeque<Message>) {
        let inbox = self.inbox.lock().unwrap_or_else(PoisonError::into_inner);
        while backlog.len() < self.config.queue_capacity.max(1) {
            match inbox.try_recv() {
                Ok(message) => backlog.push_back(message),
                Err(_) => break,
            }
        }
    }

    fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Register a listener for the given message types, or for all types when
    /// `types` is `None`. Registering the same listener again has no effect.
    /// Returns whether the listener was added.
    pub fn register_listener(
        &self,
        listener: Arc<dyn OutpostListener>,
        types: Option<&[MessageType]>,
    ) -> bool {
        let mut registry = self.listeners.write().unwrap_or_else(PoisonError::into_inner);
        if registry.iter().any(|r| r.is(&listener)) {
            return false;
        }
        registry.push(Registration {
            listener,
            types: types.map(<[MessageType]>::to_vec),
        });
        true
    }

    /// Queue a message for delivery. Events are stamped with the hardware id.
    /// Never blocks; when the queue is full the message is dropped.
    pub fn submit(&self, mut message: Message) {
        if let Message::Event(event) = &mut message {
            event.hwid = Some(self.config.hardware_id.clone());
        }

        // Counted before the handoff so a fast send cannot underflow it
        self.in_flight.fetch_add(1, Ordering::SeqCst);
        match self.outbound.try_send(message) {
            Ok(()) => {}
            Err(TrySendError::Full(message) | TrySendError::Disconnected(message)) => {
                self.in_flight.fetch_sub(1, Ordering::SeqCst);
                log_warning!(
                    "Outbound queue full ({} messages), dropping {} message",
                    self.config.queue_capacity,
                    message.message_type()
                );
            }
        }
    }

    /// Number of messages submitted and not yet sent.
    pub fn queued(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    /// Ask [`Outpost::connect`] to return at the next opportunity.
    pub fn shutdown(&self) {
        self.running.store(false, Ordering::SeqCst);
    }

    /// Run the connection loop until shutdown.
    pub fn connect(&self) {
        let endpoint = self.connector.describe();
        let mut backlog = VecDeque::new();

        while self.is_running() {
            log_block_start!("Connecting to {endpoint}");
            match self.connector.connect() {
                Ok(link) => {
                    log_decorated!("Connected to {endpoint}");
                    match self.run_session(link, &mut backlog) {
                        Ok(()) => log_decorated!("Session closed"),
                        Err(e) => {
                            log_pipe!();
                            log_warning!("Connection lost: {e}");
                        }
                    }
                }
                Err(e) => {
                    log_pipe!();
                    log_warning!("{e}");
                    if let Some(source) = std::error::Error::source(&e) {
                        log_indented!("Cause: {source}");
                    }
                }
            }

            if !self.is_running() {
                break;
            }
            log_indented!(
                "Retrying in {}s ({} queued)",
                self.config.connection_holdoff.as_secs(),
                self.queued()
            );
            self.hold_off();
        }
    }

    fn hold_off(&self) {
        let slice = self.config.session_poll_interval.max(Duration::from_millis(1));
        let deadline = Instant::now() + self.config.connection_holdoff;
        while self.is_running() {
            let now = Instant::now();
            if now >= deadline {
                break;
            }
            thread::sleep(slice.min(deadline - now));
        }
    }

    fn run_session(
        &self,
        mut link: Box<dyn Link>,
        backlog: &mut VecDeque<Message>,
    ) -> Result<(), LinkError> {
        let hello = Message::Hello(Hello {
            hwid: self.config.hardware_id.clone(),
        });
        link.send(&hello.encode())?;

        let mut last_heartbeat = Instant::now();
        while self.is_running() {
            self.flush(link.as_mut(), backlog)?;

            if let Some(interval) = self.config.heartbeat_interval
                && last_heartbeat.elapsed() >= interval
            {
                link.send(&Message::Heartbeat.encode())?;
                last_heartbeat = Instant::now();
            }

            if let Some(text) = link.receive(self.config.session_poll_interval)? {
                self.dispatch(&text);
            }
        }
        Ok(())
    }

    /// Send queued messages in order. A message leaves the backlog only after
    /// its send succeeded.
    fn flush(&self, link: &mut dyn Link, backlog: &mut VecDeque<Message>) -> Result<(), LinkError> {
        loop {
            self.collect(backlog);
            let Some(text) = backlog.front().map(Message::encode) else {
                return Ok(());
            };
            link.send(&text)?;
            backlog.pop_front();
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
        }
    }

    fn dispatch(&self, text: &str) {
        let message = match decode_frame(text) {
            Ok(message) => message,
            Err(e) => {
                log_pipe!();
                log_warning!("Dropping inbound frame: {e}");
                return;
            }
        };

        let kind = message.message_type();
        if self.config.debug_enabled {
            log_debug!("Received {kind} frame");
        }

        // Listeners run outside the registry lock so they may register others
        let targets: Vec<Arc<dyn OutpostListener>> = self
            .listeners
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|r| r.accepts(kind))
            .map(|r| Arc::clone(&r.listener))
            .collect();

        for listener in targets {
            listener.on_message(&message);
        }
    }
}

impl EventConsumer for Outpost {
    fn consume(&self, event: &Event) {
        self.submit(Message::Event(event.clone()));
    }
}
