//! Default configuration file creation.
//!
//! The default file lists every key with its default value and a short
//! comment, aligned by a small builder so the result stays readable.

use anyhow::{Context, Result};
use std::fs;
use std::path::Path;

use crate::common::constants::*;

/// Write the commented default configuration to `path`, creating parent
/// directories as needed.
pub fn create_default_config(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).context("Failed to create config directory")?;
    }

    fs::write(path, default_config_content())
        .with_context(|| format!("Failed to write default config to {}", path.display()))?;

    log_block_start!("Created default configuration");
    log_indented!("{}", path.display());
    Ok(())
}

/// Text of the default configuration file.
pub fn default_config_content() -> String {
    let mut content = ConfigBuilder::new()
        .add_section("Connection")
        .add_setting(
            "server_address",
            &format!("\"{DEFAULT_SERVER_ADDRESS}\""),
            "Recording server endpoint (ws:// only)",
        )
        .add_setting(
            "hardware_id",
            &format!("\"{DEFAULT_HARDWARE_ID}\""),
            "Identifier announced to the server",
        )
        .add_setting(
            "connection_holdoff",
            &DEFAULT_CONNECTION_HOLDOFF.to_string(),
            "Seconds to wait before reconnecting",
        )
        .add_setting(
            "heartbeat_interval",
            &DEFAULT_HEARTBEAT_INTERVAL.to_string(),
            "Seconds between heartbeats (0 = off)",
        )
        .add_section("Presence timeouts")
        .add_setting(
            "ready_to_idle_timeout",
            &DEFAULT_READY_TO_IDLE_TIMEOUT.to_string(),
            "Seconds in READY without presence before going IDLE",
        )
        .add_setting(
            "ready_to_recording_timeout",
            &DEFAULT_READY_TO_RECORDING_TIMEOUT.to_string(),
            "Seconds of presence in READY before recording starts",
        )
        .add_setting(
            "paused_to_idle_timeout",
            &DEFAULT_PAUSED_TO_IDLE_TIMEOUT.to_string(),
            "Seconds in PAUSED before the session ends",
        )
        .add_setting(
            "resume_debounce",
            &DEFAULT_RESUME_DEBOUNCE.to_string(),
            "Seconds of presence needed to resume a paused recording",
        )
        .add_section("Sensors")
        .add_setting(
            "movement_threshold",
            &DEFAULT_MOVEMENT_THRESHOLD.to_string(),
            "Movement difference that counts as activity",
        )
        .add_setting(
            "normalizing_movement_polls",
            &DEFAULT_NORMALIZING_MOVEMENT_POLLS.to_string(),
            "Movement polls to ignore after polling starts",
        )
        .add_setting(
            "movement_poll_interval",
            &DEFAULT_MOVEMENT_POLL_INTERVAL.to_string(),
            "Seconds between movement reads",
        )
        .add_setting(
            "temperature_poll_interval",
            &DEFAULT_TEMPERATURE_POLL_INTERVAL.to_string(),
            "Seconds between temperature reads",
        )
        .add_setting(
            "pressure_poll_interval",
            &DEFAULT_PRESSURE_POLL_INTERVAL.to_string(),
            "Seconds between pressure reads",
        )
        .add_setting(
            "humidity_poll_interval",
            &DEFAULT_HUMIDITY_POLL_INTERVAL.to_string(),
            "Seconds between humidity reads",
        )
        .add_setting(
            "poll_cadence_ms",
            &DEFAULT_POLL_CADENCE_MS.to_string(),
            &format!(
                "Polling loop sleep ({MINIMUM_POLL_CADENCE_MS}-{MAXIMUM_POLL_CADENCE_MS})ms"
            ),
        )
        .add_section("Wake light")
        .add_setting(
            "max_light_intensity",
            &DEFAULT_MAX_LIGHT_INTENSITY.to_string(),
            &format!(
                "Full brightness ({MINIMUM_MAX_LIGHT_INTENSITY}-{MAXIMUM_MAX_LIGHT_INTENSITY})"
            ),
        )
        .add_setting(
            "light_off_transition",
            &DEFAULT_LIGHT_OFF_TRANSITION.to_string(),
            "Seconds to fade the light out when the session ends",
        )
        .add_setting(
            "default_wake_duration",
            &DEFAULT_WAKE_DURATION.to_string(),
            &format!(
                "Wake ramp minutes when the server sends none ({MINIMUM_WAKE_DURATION}-{MAXIMUM_WAKE_DURATION})"
            ),
        )
        .add_setting(
            "wake_check_interval",
            &DEFAULT_WAKE_CHECK_INTERVAL.to_string(),
            &format!(
                "Seconds between wake time checks ({MINIMUM_WAKE_CHECK_INTERVAL}-{MAXIMUM_WAKE_CHECK_INTERVAL})"
            ),
        )
        .build();
    content.push('\n');
    content
}

/// Builder for aligned `key = value  # comment` files.
struct ConfigBuilder {
    entries: Vec<Entry>,
}

enum Entry {
    Section(String),
    Setting { line: String, comment: String },
}

impl ConfigBuilder {
    fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    fn add_section(mut self, title: &str) -> Self {
        self.entries.push(Entry::Section(format!("#[{title}]")));
        self
    }

    fn add_setting(mut self, key: &str, value: &str, comment: &str) -> Self {
        self.entries.push(Entry::Setting {
            line: format!("{key} = {value}"),
            comment: format!("# {comment}"),
        });
        self
    }

    fn build(self) -> String {
        // One space between the longest setting and its comment
        let width = self
            .entries
            .iter()
            .filter_map(|entry| match entry {
                Entry::Setting { line, .. } => Some(line.len()),
                Entry::Section(_) => None,
            })
            .max()
            .unwrap_or(0)
            + 1;

        let mut lines = Vec::new();
        for entry in self.entries {
            match entry {
                Entry::Section(title) => {
                    if !lines.is_empty() {
                        lines.push(String::new());
                    }
                    lines.push(title);
                }
                Entry::Setting { line, comment } => {
                    let padding = " ".repeat(width - line.len());
                    lines.push(format!("{line}{padding}{comment}"));
                }
            }
        }
        lines.join("\n")
    }
}
