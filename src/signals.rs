//! Signal handling for deep-slumber.
//!
//! SIGINT, SIGTERM and SIGHUP all request a graceful shutdown: the shared
//! `running` flag is cleared and every loop that watches it (the transport
//! session, the reconnect hold-off) returns on its next check.

use anyhow::{Context, Result};
use signal_hook::{
    consts::signal::{SIGHUP, SIGINT, SIGTERM},
    iterator::{Handle, Signals},
};
use std::{
    sync::Arc,
    sync::atomic::{AtomicBool, Ordering},
    thread,
};

/// Signal handling state shared between threads
pub struct SignalState {
    /// Atomic flag indicating if the application should keep running
    pub running: Arc<AtomicBool>,
    handle: Handle,
}

impl SignalState {
    /// Stop listening for signals. The handler thread exits afterwards.
    pub fn close(&self) {
        self.handle.close();
    }
}

/// Message printed when a shutdown signal arrives.
pub(crate) fn shutdown_message(signal: i32, debug_enabled: bool) -> &'static str {
    match signal {
        SIGINT if debug_enabled => "Received SIGINT (Ctrl+C), initiating graceful shutdown...",
        SIGINT => "Received interrupt signal, initiating graceful shutdown...",
        SIGTERM => "Received termination request, initiating graceful shutdown...",
        SIGHUP => "Received hangup signal, initiating graceful shutdown...",
        _ => "Received shutdown signal, initiating graceful shutdown...",
    }
}

/// Install the shutdown handlers and return the flag they clear.
pub fn setup_signal_handler(debug_enabled: bool) -> Result<SignalState> {
    let running = Arc::new(AtomicBool::new(true));

    let mut signals = Signals::new([SIGINT, SIGTERM, SIGHUP])
        .context("failed to register signal handlers")?;
    let handle = signals.handle();

    let running_clone = Arc::clone(&running);
    thread::Builder::new()
        .name("deep-slumber-signals".to_string())
        .spawn(move || {
            // Keep processing until the handle is closed so repeated Ctrl+C
            // does not fall back to the default handler mid-shutdown
            for sig in signals.forever() {
                log_pipe!();
                log_info!("{}", shutdown_message(sig, debug_enabled));
                running_clone.store(false, Ordering::SeqCst);
            }
        })
        .context("failed to spawn signal handler thread")?;

    Ok(SignalState { running, handle })
}
