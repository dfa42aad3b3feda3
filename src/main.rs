//! Binary entry point: parse the command line and dispatch.
//!
//! - `lamplink` / `lamplink run`: run the daemon through [`Lamplink`]
//! - `lamplink status`: print persisted state
//! - `lamplink discover`: resolve the API server now
//! - `lamplink wipe --yes`: clear persisted state

use anyhow::Result;

use lamplink::Lamplink;
use lamplink::args::{self, CliAction, ParsedArgs};
use lamplink::commands;
use lamplink::common::constants::EXIT_FAILURE;
use lamplink::config::{self, Config};
use lamplink::logger::Log;
use lamplink::{log_end, log_error_exit, log_version};

fn main() -> Result<()> {
    let parsed_args = ParsedArgs::from_env();

    let result = match parsed_args.action {
        CliAction::ShowVersion => {
            args::display_version_info();
            Ok(())
        }
        CliAction::ShowHelp | CliAction::ShowHelpDueToError => {
            args::display_help();
            Ok(())
        }
        CliAction::Run {
            debug_enabled,
            config_dir,
            log_file,
            simulate,
        } => config::set_config_dir(config_dir).and_then(|_| {
            Lamplink::new(debug_enabled)
                .with_log_file(log_file)
                .simulated(simulate)
                .run()
        }),
        CliAction::Status { config_dir } => with_config(config_dir, false, |config| {
            commands::status::handle_status_command(config)
        }),
        CliAction::Discover {
            debug_enabled,
            config_dir,
        } => with_config(config_dir, debug_enabled, |config| {
            commands::discover::handle_discover_command(config)
        }),
        CliAction::Wipe {
            config_dir,
            confirmed,
        } => with_config(config_dir, false, |config| {
            commands::wipe::handle_wipe_command(config, confirmed)
        }),
    };

    if let Err(e) = result {
        log_error_exit!("{}", e);
        eprintln!("{:?}", e);
        std::process::exit(EXIT_FAILURE);
    }
    Ok(())
}

/// Load configuration for a one-shot command and run it.
fn with_config(
    config_dir: Option<String>,
    debug_enabled: bool,
    command: impl FnOnce(&Config) -> Result<()>,
) -> Result<()> {
    Log::set_debug_enabled(debug_enabled);
    config::set_config_dir(config_dir)?;
    log_version!();
    let config = Config::load()?;
    let result = command(&config);
    if result.is_ok() {
        log_end!();
    }
    result
}
