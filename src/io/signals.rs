//! Shutdown signal handling.
//!
//! SIGINT, SIGTERM and SIGHUP clear the shared `running` flag. The network
//! worker and render loop poll that flag and wind down on their own; nothing
//! is torn down from the signal thread.

use anyhow::{Context, Result};
use signal_hook::{
    consts::signal::{SIGHUP, SIGINT, SIGTERM},
    iterator::Signals,
};
use std::{
    sync::Arc,
    sync::atomic::{AtomicBool, Ordering},
    thread,
};

pub struct SignalState {
    /// Cleared once a shutdown signal arrives.
    pub running: Arc<AtomicBool>,
}

impl SignalState {
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }
}

/// Register handlers and spawn the listener thread.
pub fn setup_signal_handler() -> Result<SignalState> {
    let running = Arc::new(AtomicBool::new(true));

    let mut signals =
        Signals::new([SIGINT, SIGTERM, SIGHUP]).context("failed to register signal handlers")?;

    let running_clone = running.clone();
    thread::Builder::new()
        .name("signals".into())
        .spawn(move || {
            for sig in signals.forever() {
                let name = match sig {
                    SIGINT => "SIGINT",
                    SIGTERM => "SIGTERM",
                    SIGHUP => "SIGHUP",
                    _ => "signal",
                };
                if running_clone.swap(false, Ordering::SeqCst) {
                    log_pipe!();
                    log_info!("Received {}, shutting down", name);
                } else {
                    log_debug!("Received {} during shutdown", name);
                }
            }
        })
        .context("failed to spawn signal thread")?;

    Ok(SignalState { running })
}
