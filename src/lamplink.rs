//! Application coordinator: owns the process lifecycle of the daemon.
//!
//! It loads configuration, takes the instance lock, installs signal handlers
//! and then starts the two long-lived execution contexts:
//!
//! - the render thread, which runs for the whole process and never blocks;
//! - the network worker thread, which is supervised from the main thread and
//!   rebuilt whenever it asks for a restart (reset button, abandoned portal).
//!
//! The shared state is split exactly once, so each writer handle has one owner
//! for the lifetime of the process. The network handle travels into the worker
//! thread and comes back out when the worker exits.

use anyhow::{Context, Result};
use serde_json::Value;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crate::clock::{SharedClock, SystemClock};
use crate::config::Config;
use crate::coordinator::{NetworkHandle, SharedState};
use crate::discovery::ServerDiscovery;
use crate::http::{HttpClient, ReqwestClient};
use crate::io::lock::{acquire_lock, get_lock_path, read_lock_pid};
use crate::io::signals::setup_signal_handler;
use crate::logger::Log;
use crate::render::{ConsoleRenderer, RenderLoop};
use crate::storage::{FileStore, MemoryStore, SharedStore};
use crate::sunset::{SolarCalculator, SunsetScheduler};
use crate::wifi::host::HostRadio;
use crate::wifi::reset::ResetButton;
use crate::wifi::sim::SimEnvironment;
use crate::wifi::{ConnectivityManager, FingerprintStore, WifiRadio};
use crate::worker::{NetworkWorker, WorkerExit, WorkerServices};

/// How long shutdown waits for a busy network worker.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(3);
const SUPERVISOR_POLL: Duration = Duration::from_millis(100);
/// Pause before rebuilding a worker whose services failed to load.
const REBUILD_BACKOFF: Duration = Duration::from_secs(5);

const SIM_HOME_SSID: &str = "LampHome";
const SIM_NEIGHBORS: [&str; 3] = ["Neighbor-5G", "CafeGuest", "PrinterDirect"];

/// Builder for running the daemon.
///
/// ```no_run
/// use lamplink::Lamplink;
///
/// # fn main() -> anyhow::Result<()> {
/// Lamplink::new(false).run()?;
///
/// // Against a simulated radio, without touching the instance lock
/// Lamplink::new(true).simulated(true).without_lock().run()?;
/// # Ok(())
/// # }
/// ```
pub struct Lamplink {
    debug_enabled: bool,
    create_lock: bool,
    show_headers: bool,
    log_file: Option<String>,
    simulate: bool,
}

impl Lamplink {
    pub fn new(debug_enabled: bool) -> Self {
        Self {
            debug_enabled,
            create_lock: true,
            show_headers: true,
            log_file: None,
            simulate: false,
        }
    }

    pub fn without_lock(mut self) -> Self {
        self.create_lock = false;
        self
    }

    pub fn without_headers(mut self) -> Self {
        self.show_headers = false;
        self
    }

    pub fn with_log_file(mut self, path: Option<String>) -> Self {
        self.log_file = path;
        self
    }

    /// Use a simulated radio and in-memory storage.
    pub fn simulated(mut self, simulate: bool) -> Self {
        self.simulate = simulate;
        self
    }

    pub fn run(self) -> Result<()> {
        Log::set_debug_enabled(self.debug_enabled);
        Log::set_timestamps(self.debug_enabled);

        // Held until the end of run so the writer thread flushes on exit.
        let _log_guard = match &self.log_file {
            Some(path) => Some(
                Log::start_file_logging(path.clone()).context("failed to start file logging")?,
            ),
            None => None,
        };

        if self.show_headers {
            log_version!();
        }

        let config = Config::load().context("Configuration failed")?;
        config.log_config();

        let _lock = if self.create_lock {
            let lock_path = get_lock_path();
            match acquire_lock(&lock_path)? {
                Some(lock) => Some(lock),
                None => {
                    log_pipe!();
                    match read_lock_pid(&lock_path) {
                        Some(pid) => log_error!("lamplink is already running (PID: {pid})"),
                        None => log_error!("lamplink is already running"),
                    }
                    log_end!();
                    return Ok(());
                }
            }
        } else {
            None
        };

        let signals = setup_signal_handler()?;
        let running = signals.running.clone();

        let environment = Environment::build(&config, self.simulate)?;
        let (network, render) = SharedState::split(config.sunset_window_minutes());

        let render_thread = {
            let mut render_loop = RenderLoop::new(
                render,
                Box::new(ConsoleRenderer::new()),
                environment.clock.clone(),
                config.render_hz(),
                running.clone(),
            );
            thread::Builder::new()
                .name("render".into())
                .spawn(move || render_loop.run())
                .context("failed to spawn render thread")?
        };

        supervise(&environment, &config, network, &running);

        running.store(false, Ordering::SeqCst);
        if render_thread.join().is_err() {
            log_critical!("Render thread panicked");
        }

        log_block_start!("Shut down cleanly");
        log_end!();
        Ok(())
    }
}

/// Host or simulated collaborators shared by every worker generation.
struct Environment {
    clock: SharedClock,
    store: SharedStore,
    http: Arc<dyn HttpClient>,
    sim: Option<SimEnvironment>,
}

impl Environment {
    fn build(config: &Config, simulate: bool) -> Result<Self> {
        let clock = SystemClock::shared();
        let http: Arc<dyn HttpClient> = Arc::new(ReqwestClient::new()?);

        if simulate {
            log_block_start!("Simulation mode");
            log_indented!("Radio: simulated, home network '{}'", SIM_HOME_SSID);
            log_indented!("Storage: in memory");
            let sim = SimEnvironment::at_home(clock.clone(), SIM_HOME_SSID, &SIM_NEIGHBORS);
            return Ok(Self {
                clock,
                store: Arc::new(MemoryStore::new()),
                http,
                sim: Some(sim),
            });
        }

        let store = FileStore::open(config.storage_dir()).context("Failed to open state directory")?;
        Ok(Self {
            clock,
            store: Arc::new(store),
            http,
            sim: None,
        })
    }

    fn radio(&self) -> (Box<dyn WifiRadio>, Option<Box<dyn ResetButton>>) {
        match &self.sim {
            Some(sim) => (Box::new(sim.radio()), Some(Box::new(sim.button()))),
            None => (
                Box::new(HostRadio::new(self.store.clone(), self.clock.clone())),
                None,
            ),
        }
    }

    fn services(&self, config: &Config) -> Result<(WorkerServices, Option<Box<dyn ResetButton>>)> {
        let fingerprint = FingerprintStore::load(self.store.clone())?;
        let sunset = SunsetScheduler::load(
            self.store.clone(),
            Box::new(SolarCalculator),
            config.sunset_window_minutes(),
        )?;
        let (radio, button) = self.radio();
        let (reconnect_interval, max_reconnects) = config.health_settings();
        let manager = ConnectivityManager::new(
            radio,
            fingerprint,
            self.clock.clone(),
            config.retry_policy(),
            config.portal_settings(),
        )
        .with_health(reconnect_interval, max_reconnects);
        let discovery = ServerDiscovery::new(
            self.http.clone(),
            self.store.clone(),
            self.clock.clone(),
            config.discovery_settings(),
        );
        Ok((
            WorkerServices {
                manager,
                discovery,
                sunset,
                http: self.http.clone(),
            },
            button,
        ))
    }
}

/// Run network worker generations until shutdown.
fn supervise(
    environment: &Environment,
    config: &Config,
    mut network: NetworkHandle,
    running: &Arc<AtomicBool>,
) {
    let mut generation = 0u32;

    while running.load(Ordering::SeqCst) {
        let (services, button) = match environment.services(config) {
            Ok(parts) => parts,
            Err(e) => {
                log_error!("Could not prepare network worker: {:#}", e);
                environment.clock.sleep(REBUILD_BACKOFF);
                continue;
            }
        };

        generation += 1;
        log_debug!("Starting network worker (generation {})", generation);

        let mut worker = NetworkWorker::new(
            services,
            network,
            environment.clock.clone(),
            config.worker_settings(),
            running.clone(),
        )
        .with_payload_sink(Box::new(log_payload));
        if let Some(button) = button {
            worker = worker.with_reset_button(button);
        }

        let spawned = thread::Builder::new()
            .name("network".into())
            .spawn(move || {
                let exit = worker.run();
                (exit, worker.into_shared())
            });
        let handle = match spawned {
            Ok(handle) => handle,
            Err(e) => {
                log_critical!("Failed to spawn network worker: {}", e);
                return;
            }
        };

        let Some(joined) = wait_for_worker(handle, running) else {
            return;
        };
        let (exit, returned) = joined;
        network = returned;

        match exit {
            WorkerExit::Shutdown => return,
            WorkerExit::RestartRequested => {
                log_block_start!("Restarting after credential reset");
            }
            WorkerExit::PortalAbandoned => {
                log_block_start!("Setup portal closed without a connection, restarting");
            }
        }
    }
}

/// Wait for the worker to finish. After shutdown is requested it gets a short
/// grace period; a worker still blocked in a portal or HTTP call is left
/// behind and dies with the process.
fn wait_for_worker(
    handle: JoinHandle<(WorkerExit, NetworkHandle)>,
    running: &Arc<AtomicBool>,
) -> Option<(WorkerExit, NetworkHandle)> {
    let mut shutdown_at: Option<Instant> = None;
    loop {
        if handle.is_finished() {
            return match handle.join() {
                Ok(result) => Some(result),
                Err(_) => {
                    log_critical!("Network worker panicked");
                    running.store(false, Ordering::SeqCst);
                    None
                }
            };
        }

        if !running.load(Ordering::SeqCst) {
            let since = *shutdown_at.get_or_insert_with(Instant::now);
            if since.elapsed() >= SHUTDOWN_GRACE {
                log_warning!("Network worker still busy, not waiting for it");
                return None;
            }
        }
        thread::sleep(SUPERVISOR_POLL);
    }
}

fn log_payload(payload: &Value) {
    match payload.as_object() {
        Some(fields) => log_debug!("Received payload with {} fields", fields.len()),
        None => log_debug!("Received non-object payload"),
    }
}
