//! Application coordinator that manages the complete lifecycle of deep-slumber.
//!
//! [`Appliance`] wires the components together: the transport receives every
//! event from the bus, the wake scheduler listens for settings and drives the
//! light through the state machine. [`DeepSlumber`] adds the process concerns
//! around it (headers, signals, configuration, shutdown).
//!
//! - Normal startup: `DeepSlumber::new(debug_enabled).run()`
//! - Custom configuration: `DeepSlumber::new(false).with_config_path(path).run()`

use anyhow::{Context, Result};
use std::io::IsTerminal;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::AtomicBool;

use crate::bus::{EventBus, EventConsumer, EventLogConsumer};
use crate::config::{self, Config};
use crate::logger::Log;
use crate::orchestra::Orchestra;
use crate::orchestra::hardware::{
    DetachedEnvironment, DetachedPresence, EnvironmentSensor, LightActuator, LoggingLight,
    PresenceSensor,
};
use crate::outpost::Outpost;
use crate::outpost::link::{Connector, WebSocketConnector};
use crate::outpost::message::MessageType;
use crate::risenshine::RiseNShine;
use crate::signals::setup_signal_handler;
use crate::time_source::{RealTimeSource, TimeSource};
use crate::timers::{Scheduler, ThreadScheduler};

/// The device drivers the appliance runs on.
pub struct Hardware {
    pub environment: Box<dyn EnvironmentSensor>,
    pub presence: Box<dyn PresenceSensor>,
    pub light: Box<dyn LightActuator>,
}

impl Hardware {
    /// Adapters for a board without sensors: nothing is measured and the
    /// light only logs.
    pub fn detached(debug_enabled: bool) -> Self {
        Self {
            environment: Box::new(DetachedEnvironment),
            presence: Box::new(DetachedPresence),
            light: Box::new(LoggingLight::new(debug_enabled)),
        }
    }
}

/// Everything the runtime needs besides configuration.
pub struct Runtime {
    pub connector: Box<dyn Connector>,
    pub scheduler: Arc<dyn Scheduler>,
    pub clock: Arc<dyn TimeSource>,
    pub running: Arc<AtomicBool>,
}

/// The assembled components.
pub struct Appliance {
    outpost: Arc<Outpost>,
    orchestra: Orchestra,
    risenshine: RiseNShine,
    // Edges stop when the sensor is dropped
    _presence: Box<dyn PresenceSensor>,
}

impl Appliance {
    pub fn assemble(config: &Config, debug_enabled: bool, hardware: Hardware, runtime: Runtime) -> Self {
        let Runtime {
            connector,
            scheduler,
            clock,
            running,
        } = runtime;

        let outpost = Arc::new(Outpost::new(
            config.outpost_config(debug_enabled),
            connector,
            running,
        ));

        let mut consumers: Vec<Arc<dyn EventConsumer>> = vec![outpost.clone() as Arc<dyn EventConsumer>];
        if debug_enabled {
            consumers.push(Arc::new(EventLogConsumer));
        }
        let bus = EventBus::new(consumers);

        let orchestra = Orchestra::new(
            config.orchestra_config(debug_enabled),
            bus.clone(),
            scheduler,
            Arc::clone(&clock),
            hardware.environment,
            hardware.light,
        );
        orchestra.attach_presence(hardware.presence.as_ref());

        let risenshine = RiseNShine::new(
            config.wake_config(debug_enabled),
            Arc::new(orchestra.clone()),
            bus,
            clock,
        );
        outpost.register_listener(Arc::new(risenshine.clone()), Some(&[MessageType::Settings]));

        Self {
            outpost,
            orchestra,
            risenshine,
            _presence: hardware.presence,
        }
    }

    pub fn outpost(&self) -> &Arc<Outpost> {
        &self.outpost
    }

    pub fn orchestra(&self) -> &Orchestra {
        &self.orchestra
    }

    pub fn risenshine(&self) -> &RiseNShine {
        &self.risenshine
    }

    /// Serve the connection until the running flag is cleared.
    pub fn run(&self) {
        self.outpost.connect();
    }

    /// Stop the wake scheduler first so no ramp drives a stopped machine.
    pub fn shutdown(&self) {
        self.outpost.shutdown();
        self.risenshine.shutdown();
        self.orchestra.shutdown();
    }
}

/// Builder for configuring and running the deep-slumber daemon.
pub struct DeepSlumber {
    debug_enabled: bool,
    config_path: Option<PathBuf>,
    show_headers: bool,
}

impl DeepSlumber {
    /// Create a new runner with defaults matching normal run
    pub fn new(debug_enabled: bool) -> Self {
        Self {
            debug_enabled,
            config_path: None,
            show_headers: true,
        }
    }

    /// Load this file instead of the default configuration.
    pub fn with_config_path(mut self, path: Option<PathBuf>) -> Self {
        self.config_path = path;
        self
    }

    /// Skip header display
    pub fn without_headers(mut self) -> Self {
        self.show_headers = false;
        self
    }

    /// Execute the daemon until a shutdown signal arrives.
    pub fn run(self) -> Result<()> {
        // Output usually lands in the journal when not attached to a terminal
        Log::set_timestamps(!std::io::stdout().is_terminal());

        if self.show_headers {
            log_version!();
            if self.debug_enabled {
                log_pipe!();
                log_debug!("Debug mode enabled - showing events and sensor detail");
            }
        }

        let signal_state = setup_signal_handler(self.debug_enabled)?;

        let (config, source) = match &self.config_path {
            Some(path) => (config::load_from_path(path)?, path.display().to_string()),
            None => {
                let path = config::get_config_path()?;
                (config::load()?, path.display().to_string())
            }
        };
        config.log_config(&source);

        let runtime = Runtime {
            connector: Box::new(WebSocketConnector::new(config.server_address())),
            scheduler: Arc::new(ThreadScheduler::new()),
            clock: Arc::new(RealTimeSource),
            running: Arc::clone(&signal_state.running),
        };
        let appliance = Appliance::assemble(
            &config,
            self.debug_enabled,
            Hardware::detached(self.debug_enabled),
            runtime,
        );

        appliance.run();

        log_block_start!("Shutting down");
        appliance.shutdown();
        signal_state.close();
        log_end!();

        Ok(())
    }
}

/// Resolve the `--config` argument.
pub fn config_path_from_arg(arg: Option<String>) -> Result<Option<PathBuf>> {
    arg.map(|path| {
        let path = PathBuf::from(path);
        if path.is_dir() {
            anyhow::bail!("{} is a directory, expected a configuration file", path.display());
        }
        Ok(path)
    })
    .transpose()
    .context("Invalid --config argument")
}
