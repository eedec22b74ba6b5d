//! Console logging with the deep-slumber box-drawing layout.
//!
//! Every line written by the daemon goes through the macros defined here. They
//! share a single formatting path (`write_line`) and can be silenced at runtime,
//! which the test suites use to keep their output readable.
//!
//! When the daemon runs unattended its output usually ends up in the system
//! journal, so a wall-clock `[HH:MM:SS]` prefix can be switched on with
//! [`Log::set_timestamps`].

use std::io::Write;
use std::sync::atomic::{AtomicBool, Ordering};

static LOGGING_ENABLED: AtomicBool = AtomicBool::new(true);
static TIMESTAMPS_ENABLED: AtomicBool = AtomicBool::new(false);

/// Main logging interface.
///
/// ## Logging Conventions
///
/// - **`log_block_start!`** opens a new conceptual block (connection attempts,
///   state transitions, settings ingestion). Prints an empty pipe `┃` followed by
///   `┣ message`.
/// - **`log_decorated!`** continues a block: `┣ message`.
/// - **`log_indented!`** nests detail under the previous line: `┃   message`.
/// - **`log_pipe!`** inserts a single `┃` spacer, typically before a
///   `log_warning!`/`log_error!` that starts its own block.
/// - **`log_version!`** prints the startup header, **`log_end!`** the final `╹`.
/// - **`log_info!`, `log_warning!`, `log_error!`, `log_debug!`, `log_critical!`**
///   carry a colored `[LEVEL]` tag after the `┣` decoration.
pub struct Log;

impl Log {
    /// Enable or disable all output.
    pub fn set_enabled(enabled: bool) {
        LOGGING_ENABLED.store(enabled, Ordering::SeqCst);
    }

    /// Check if logging is currently enabled.
    pub fn is_enabled() -> bool {
        LOGGING_ENABLED.load(Ordering::SeqCst)
    }

    /// Prefix every line with the local wall-clock time.
    pub fn set_timestamps(enabled: bool) {
        TIMESTAMPS_ENABLED.store(enabled, Ordering::SeqCst);
    }

    /// Timestamp prefix for the current line, or an empty string.
    pub fn get_timestamp_prefix() -> String {
        if TIMESTAMPS_ENABLED.load(Ordering::SeqCst) {
            format!("[{}] ", chrono::Local::now().format("%H:%M:%S"))
        } else {
            String::new()
        }
    }
}

/// Write one decorated line. `spacer` adds an empty pipe line above it.
///
/// Public because the exported macros expand to calls of this function.
pub fn write_line(decoration: &str, message: &str, spacer: bool) {
    if !Log::is_enabled() {
        return;
    }

    let prefix = Log::get_timestamp_prefix();
    let mut text = String::with_capacity(prefix.len() * 2 + decoration.len() + message.len() + 8);
    if spacer {
        text.push_str(&prefix);
        text.push_str("┃\n");
    }
    text.push_str(&prefix);
    text.push_str(decoration);
    text.push_str(message);
    text.push('\n');

    let mut stdout = std::io::stdout().lock();
    let _ = stdout.write_all(text.as_bytes());
    let _ = stdout.flush();
}

#[doc(hidden)]
#[macro_export]
macro_rules! __log_with {
    ($decoration:expr, $spacer:expr, $fmt:literal $($arg:tt)*) => {{
        if $crate::logger::Log::is_enabled() {
            $crate::logger::write_line($decoration, &format!($fmt $($arg)*), $spacer);
        }
    }};
    ($decoration:expr, $spacer:expr, $expr:expr) => {{
        if $crate::logger::Log::is_enabled() {
            $crate::logger::write_line($decoration, &format!("{}", $expr), $spacer);
        }
    }};
}

/// Log a decorated message as part of the current block.
#[macro_export]
macro_rules! log_decorated {
    ($($arg:tt)+) => { $crate::__log_with!("┣ ", false, $($arg)+) };
}

/// Log an indented detail line.
#[macro_export]
macro_rules! log_indented {
    ($($arg:tt)+) => { $crate::__log_with!("┃   ", false, $($arg)+) };
}

/// Log a visual pipe separator for vertical spacing.
#[macro_export]
macro_rules! log_pipe {
    () => { $crate::__log_with!("┃", false, "") };
}

/// Start a new block of related log lines.
#[macro_export]
macro_rules! log_block_start {
    ($($arg:tt)+) => { $crate::__log_with!("┣ ", true, $($arg)+) };
}

/// Log the application version header.
#[macro_export]
macro_rules! log_version {
    () => {
        $crate::__log_with!("┏ ", false, "deep-slumber v{} ━━╸", env!("CARGO_PKG_VERSION"))
    };
}

/// Log the final termination marker.
#[macro_export]
macro_rules! log_end {
    () => { $crate::__log_with!("╹", false, "") };
}

/// Log a warning with a yellow tag.
#[macro_export]
macro_rules! log_warning {
    ($($arg:tt)+) => { $crate::__log_with!("┣[\x1b[33mWARNING\x1b[0m] ", false, $($arg)+) };
}

/// Log an error with a red tag.
#[macro_export]
macro_rules! log_error {
    ($($arg:tt)+) => { $crate::__log_with!("┣[\x1b[31mERROR\x1b[0m] ", false, $($arg)+) };
}

/// Log an error that terminates the current flow (`┗` corner).
#[macro_export]
macro_rules! log_error_exit {
    ($($arg:tt)+) => { $crate::__log_with!("┗[\x1b[31mERROR\x1b[0m] ", true, $($arg)+) };
}

/// Log an informational message with a green tag.
#[macro_export]
macro_rules! log_info {
    ($($arg:tt)+) => { $crate::__log_with!("┣[\x1b[32mINFO\x1b[0m] ", false, $($arg)+) };
}

/// Log operational detail, normally only when debug output is on.
#[macro_export]
macro_rules! log_debug {
    ($($arg:tt)+) => { $crate::__log_with!("┣[\x1b[32mDEBUG\x1b[0m] ", false, $($arg)+) };
}

/// Log a critical message with a red tag.
#[macro_export]
macro_rules! log_critical {
    ($($arg:tt)+) => { $crate::__log_with!("┣[\x1b[31mCRITICAL\x1b[0m] ", false, $($arg)+) };
}
