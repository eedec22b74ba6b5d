//! Main application entry point.
//!
//! Parses the command line and hands over to [`DeepSlumber`], which owns the
//! daemon lifecycle:
//!
//! 1. Argument parsing and early exit for help/version
//! 2. Signal handler setup
//! 3. Configuration loading and validation
//! 4. Component assembly and the connection loop
//! 5. Graceful shutdown once a signal clears the running flag

use anyhow::Result;
use deep_slumber::args::{self, CliAction, ParsedArgs};
use deep_slumber::common::constants::EXIT_FAILURE;
use deep_slumber::{DeepSlumber, config_path_from_arg, log_end, log_error_exit};

fn main() -> Result<()> {
    let parsed_args = ParsedArgs::from_env();

    match parsed_args.action {
        CliAction::ShowVersion => {
            args::display_version_info();
            Ok(())
        }
        CliAction::ShowHelp => {
            args::display_help();
            Ok(())
        }
        CliAction::ShowHelpDueToError => {
            args::display_help();
            std::process::exit(EXIT_FAILURE);
        }
        CliAction::Run {
            debug_enabled,
            config_path,
        } => {
            let result = config_path_from_arg(config_path).and_then(|path| {
                DeepSlumber::new(debug_enabled)
                    .with_config_path(path)
                    .run()
            });

            if let Err(e) = result {
                log_error_exit!("{e:#}");
                log_end!();
                std::process::exit(EXIT_FAILURE);
            }
            Ok(())
        }
    }
}
