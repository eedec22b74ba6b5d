//! Command-line argument parsing and processing.
//!
//! The daemon accepts a handful of flags: a configuration file override, debug
//! output, help and version. Anything else is reported and answered with the
//! help text.

/// Represents the parsed command-line arguments and their intended actions.
#[derive(Debug, PartialEq)]
pub enum CliAction {
    /// Run the daemon with these settings
    Run {
        debug_enabled: bool,
        config_path: Option<String>,
    },
    /// Display help information and exit
    ShowHelp,
    /// Display version information and exit
    ShowVersion,
    /// Show help due to unknown or incomplete arguments and exit
    ShowHelpDueToError,
}

/// Result of parsing command-line arguments.
pub struct ParsedArgs {
    pub action: CliAction,
}

impl ParsedArgs {
    /// Parse command-line arguments into a structured result.
    ///
    /// The first item is the program name and is skipped. Version wins over
    /// help, and both win over errors so `--help --bogus` still prints help.
    pub fn parse<I, S>(args: I) -> ParsedArgs
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut debug_enabled = false;
        let mut display_help = false;
        let mut display_version = false;
        let mut unknown_arg_found = false;
        let mut config_path: Option<String> = None;

        let mut args = args.into_iter().skip(1);
        while let Some(arg) = args.next() {
            match arg.as_ref() {
                "--debug" | "-d" => debug_enabled = true,
                "--help" | "-h" => display_help = true,
                "--version" | "-V" => display_version = true,
                "--config" | "-c" => match args.next() {
                    Some(path) if !path.as_ref().starts_with('-') => {
                        config_path = Some(path.as_ref().to_string());
                    }
                    _ => {
                        log_warning!("Missing file path after --config");
                        unknown_arg_found = true;
                    }
                },
                other => {
                    log_warning!("Unknown argument: {other}");
                    unknown_arg_found = true;
                }
            }
        }

        let action = if display_version {
            CliAction::ShowVersion
        } else if display_help {
            CliAction::ShowHelp
        } else if unknown_arg_found {
            CliAction::ShowHelpDueToError
        } else {
            CliAction::Run {
                debug_enabled,
                config_path,
            }
        };

        ParsedArgs { action }
    }

    /// Convenience method to parse from std::env::args()
    pub fn from_env() -> ParsedArgs {
        Self::parse(std::env::args())
    }
}

/// Displays version information using custom logging style.
pub fn display_version_info() {
    log_version!();
    log_pipe!();
    println!("┗ {}", env!("CARGO_PKG_DESCRIPTION"));
}

/// Displays custom help message using logger methods.
pub fn display_help() {
    log_version!();
    log_block_start!(env!("CARGO_PKG_DESCRIPTION"));
    log_block_start!("Usage:");
    log_indented!("deep-slumber [OPTIONS]");
    log_block_start!("Options:");
    log_indented!("-c, --config <file>    Use a custom configuration file");
    log_indented!("-d, --debug            Enable detailed debug output");
    log_indented!("-h, --help             Print help information");
    log_indented!("-V, --version          Print version information");
    log_end!();
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(debug_enabled: bool, config_path: Option<&str>) -> CliAction {
        CliAction::Run {
            debug_enabled,
            config_path: config_path.map(str::to_string),
        }
    }

    #[test]
    fn test_parse_no_args() {
        let parsed = ParsedArgs::parse(["deep-slumber"]);
        assert_eq!(parsed.action, run(false, None));
    }

    #[test]
    fn test_parse_debug_flags() {
        for flag in ["--debug", "-d"] {
            let parsed = ParsedArgs::parse(["deep-slumber", flag]);
            assert_eq!(parsed.action, run(true, None));
        }
    }

    #[test]
    fn test_parse_help_flags() {
        for flag in ["--help", "-h"] {
            let parsed = ParsedArgs::parse(["deep-slumber", flag]);
            assert_eq!(parsed.action, CliAction::ShowHelp);
        }
    }

    #[test]
    fn test_parse_version_flags() {
        for flag in ["--version", "-V"] {
            let parsed = ParsedArgs::parse(["deep-slumber", flag]);
            assert_eq!(parsed.action, CliAction::ShowVersion);
        }
    }

    #[test]
    fn test_parse_config_path() {
        let parsed = ParsedArgs::parse(["deep-slumber", "-c", "/etc/slumber.toml", "--debug"]);
        assert_eq!(parsed.action, run(true, Some("/etc/slumber.toml")));

        let parsed = ParsedArgs::parse(["deep-slumber", "--config", "local.toml"]);
        assert_eq!(parsed.action, run(false, Some("local.toml")));
    }

    #[test]
    fn test_config_without_path_is_an_error() {
        let parsed = ParsedArgs::parse(["deep-slumber", "--config"]);
        assert_eq!(parsed.action, CliAction::ShowHelpDueToError);

        let parsed = ParsedArgs::parse(["deep-slumber", "--config", "--debug"]);
        assert_eq!(parsed.action, CliAction::ShowHelpDueToError);
    }

    #[test]
    fn test_parse_unknown_flag() {
        let parsed = ParsedArgs::parse(["deep-slumber", "--unknown"]);
        assert_eq!(parsed.action, CliAction::ShowHelpDueToError);
    }

    #[test]
    fn test_help_and_version_take_precedence() {
        let parsed = ParsedArgs::parse(["deep-slumber", "--bogus", "--help"]);
        assert_eq!(parsed.action, CliAction::ShowHelp);

        let parsed = ParsedArgs::parse(["deep-slumber", "--help", "--version"]);
        assert_eq!(parsed.action, CliAction::ShowVersion);
    }
}
