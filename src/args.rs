//! Command-line argument parsing.
//!
//! Hand-rolled: the surface is a handful of flags and three subcommands.
//! Unknown options fall through to the help screen rather than erroring out.

/// What the process should do, as decided by the command line.
#[derive(Debug, PartialEq)]
pub enum CliAction {
    /// Run the daemon.
    Run {
        debug_enabled: bool,
        config_dir: Option<String>,
        log_file: Option<String>,
        /// Drive a simulated radio and clock instead of the host network.
        simulate: bool,
    },
    /// Print persisted state and exit.
    Status { config_dir: Option<String> },
    /// Resolve the API server now, ignoring the cache age.
    Discover {
        debug_enabled: bool,
        config_dir: Option<String>,
    },
    /// Clear every persisted namespace.
    Wipe {
        config_dir: Option<String>,
        confirmed: bool,
    },
    ShowHelp,
    ShowVersion,
    ShowHelpDueToError,
}

pub struct ParsedArgs {
    pub action: CliAction,
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Command {
    Run,
    Status,
    Discover,
    Wipe,
}

impl ParsedArgs {
    /// Parse arguments, including the program name in position 0.
    pub fn parse<I, S>(args: I) -> ParsedArgs
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut debug_enabled = false;
        let mut display_help = false;
        let mut display_version = false;
        let mut simulate = false;
        let mut confirmed = false;
        let mut unknown_arg_found = false;
        let mut config_dir: Option<String> = None;
        let mut log_file: Option<String> = None;
        let mut command: Option<Command> = None;

        let args_vec: Vec<String> = args
            .into_iter()
            .skip(1)
            .map(|s| s.as_ref().to_string())
            .collect();

        let mut i = 0;
        while i < args_vec.len() {
            let arg_str = args_vec[i].as_str();
            match arg_str {
                "-h" | "--help" => display_help = true,
                "-V" | "--version" => display_version = true,
                "-d" | "--debug" => debug_enabled = true,
                "-S" | "--simulate" => simulate = true,
                "-y" | "--yes" => confirmed = true,
                "-c" | "--config" => match args_vec.get(i + 1) {
                    Some(dir) if !dir.starts_with('-') => {
                        config_dir = Some(dir.clone());
                        i += 1;
                    }
                    _ => {
                        log_warning!("Missing directory for {arg_str}");
                        unknown_arg_found = true;
                    }
                },
                "-l" | "--log" => match args_vec.get(i + 1) {
                    Some(path) if !path.starts_with('-') => {
                        log_file = Some(path.clone());
                        i += 1;
                    }
                    _ => {
                        log_warning!("Missing file path for {arg_str}");
                        unknown_arg_found = true;
                    }
                },
                _ if arg_str.starts_with('-') => {
                    log_warning!("Unknown option: {arg_str}");
                    unknown_arg_found = true;
                }
                _ => {
                    let parsed = match arg_str {
                        "run" => Some(Command::Run),
                        "status" => Some(Command::Status),
                        "discover" => Some(Command::Discover),
                        "wipe" => Some(Command::Wipe),
                        _ => None,
                    };
                    match (parsed, command) {
                        (Some(cmd), None) => command = Some(cmd),
                        (Some(_), Some(_)) => {
                            log_warning!("Only one command may be given");
                            unknown_arg_found = true;
                        }
                        (None, _) => {
                            log_warning!("Unknown command: {arg_str}");
                            unknown_arg_found = true;
                        }
                    }
                }
            }
            i += 1;
        }

        let action = if display_version {
            CliAction::ShowVersion
        } else if unknown_arg_found {
            CliAction::ShowHelpDueToError
        } else if display_help {
            CliAction::ShowHelp
        } else {
            match command.unwrap_or(Command::Run) {
                Command::Run => CliAction::Run {
                    debug_enabled,
                    config_dir,
                    log_file,
                    simulate,
                },
                Command::Status => CliAction::Status { config_dir },
                Command::Discover => CliAction::Discover {
                    debug_enabled,
                    config_dir,
                },
                Command::Wipe => CliAction::Wipe {
                    config_dir,
                    confirmed,
                },
            }
        };

        ParsedArgs { action }
    }

    pub fn from_env() -> ParsedArgs {
        Self::parse(std::env::args())
    }
}

pub fn display_version_info() {
    log_version!();
    log_pipe!();
    println!("┗ {}", env!("CARGO_PKG_DESCRIPTION"));
}

pub fn display_help() {
    log_version!();
    log_block_start!(env!("CARGO_PKG_DESCRIPTION"));
    log_block_start!("Usage:");
    log_indented!("lamplink [OPTIONS] [COMMAND]");
    log_block_start!("Options:");
    log_indented!("-c, --config <dir>     Use custom configuration directory");
    log_indented!("-d, --debug            Enable detailed debug output");
    log_indented!("-l, --log <file>       Also write output to a log file");
    log_indented!("-S, --simulate         Run against a simulated network");
    log_indented!("-y, --yes              Skip confirmation for 'wipe'");
    log_indented!("-h, --help             Print help information");
    log_indented!("-V, --version          Print version information");
    log_block_start!("Commands:");
    log_indented!("run                    Run the daemon (default)");
    log_indented!("status                 Show persisted fingerprint, server and location");
    log_indented!("discover               Resolve the API server now");
    log_indented!("wipe                   Clear all persisted state");
    log_end!();
}
