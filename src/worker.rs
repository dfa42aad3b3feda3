//! The blocking side: connectivity, discovery, data fetch and time sync.
//!
//! The worker owns every networking component and the persistent store. Its
//! only channel to the render side is the [`NetworkHandle`].

use serde_json::Value;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use crate::clock::{Interval, SharedClock};
use crate::common::constants::*;
use crate::coordinator::NetworkHandle;
use crate::discovery::ServerDiscovery;
use crate::http::HttpClient;
use crate::sunset::{Coordinates, SunsetScheduler};
use crate::time_sync::TimeSynchronizer;
use crate::wifi::health::HealthAction;
use crate::wifi::reset::{ResetAction, ResetButton, ResetWatcher};
use crate::wifi::{ConnectOutcome, ConnectivityManager};

/// Receives each successfully parsed data payload.
pub type PayloadSink = Box<dyn FnMut(&Value) + Send>;

#[derive(Debug, Clone, PartialEq)]
pub struct WorkerSettings {
    pub device_id: u32,
    pub data_path_template: String,
    pub fetch_interval: Duration,
    pub settle_delay: Duration,
    pub http_timeout: Duration,
    pub loop_period: Duration,
    pub reset_hold: Duration,
}

impl Default for WorkerSettings {
    fn default() -> Self {
        Self {
            device_id: DEFAULT_DEVICE_ID,
            data_path_template: DEFAULT_DATA_PATH_TEMPLATE.to_string(),
            fetch_interval: Duration::from_secs(DEFAULT_FETCH_INTERVAL_SECS),
            settle_delay: Duration::from_secs(DEFAULT_SETTLE_DELAY_SECS),
            http_timeout: Duration::from_secs(DATA_HTTP_TIMEOUT_SECS),
            loop_period: Duration::from_millis(NETWORK_LOOP_PERIOD_MS),
            reset_hold: Duration::from_millis(DEFAULT_RESET_HOLD_MS),
        }
    }
}

/// Why the worker stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerExit {
    Shutdown,
    /// Reset button wiped credentials.
    RestartRequested,
    /// The final portal closed without a connection.
    PortalAbandoned,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepResult {
    Continue,
    /// Link reconnects ran out; run the connection scenario again.
    Reconnect,
    Exit(WorkerExit),
}

/// Components the worker drives.
pub struct WorkerServices {
    pub manager: ConnectivityManager,
    pub discovery: ServerDiscovery,
    pub sunset: SunsetScheduler,
    pub http: Arc<dyn HttpClient>,
}

pub struct NetworkWorker {
    manager: ConnectivityManager,
    discovery: ServerDiscovery,
    sunset: SunsetScheduler,
    http: Arc<dyn HttpClient>,
    time: TimeSynchronizer,
    shared: NetworkHandle,
    clock: SharedClock,
    settings: WorkerSettings,
    running: Arc<AtomicBool>,
    reset: Option<(Box<dyn ResetButton>, ResetWatcher)>,
    payload_sink: Option<PayloadSink>,
    fetch_timer: Interval,
    settle_until_ms: u64,
}

impl NetworkWorker {
    pub fn new(
        services: WorkerServices,
        shared: NetworkHandle,
        clock: SharedClock,
        settings: WorkerSettings,
        running: Arc<AtomicBool>,
    ) -> Self {
        let mut time = TimeSynchronizer::new();
        let coordinates = services.sunset.coordinates();
        if let Some(c) = &coordinates {
            time.set_tz_offset(c.tz_offset_hours);
        }
        shared.set_coordinates_known(coordinates.is_some());

        let now = clock.now_ms();
        Self {
            manager: services.manager,
            discovery: services.discovery,
            sunset: services.sunset,
            http: services.http,
            time,
            shared,
            clock,
            fetch_timer: Interval::immediate(settings.fetch_interval, now),
            settings,
            running,
            reset: None,
            payload_sink: None,
            settle_until_ms: now,
        }
    }

    pub fn with_reset_button(mut self, button: Box<dyn ResetButton>) -> Self {
        let watcher = ResetWatcher::new(self.settings.reset_hold.as_millis() as u64);
        self.reset = Some((button, watcher));
        self
    }

    pub fn with_payload_sink(mut self, sink: PayloadSink) -> Self {
        self.payload_sink = Some(sink);
        self
    }

    fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Connect, then loop until shutdown, reset or an abandoned portal.
    pub fn run(&mut self) -> WorkerExit {
        loop {
            if !self.is_running() {
                return WorkerExit::Shutdown;
            }

            self.shared.set_network_healthy(false);
            if self.manager.connect() == ConnectOutcome::PortalOpened {
                return WorkerExit::PortalAbandoned;
            }
            self.shared.set_network_healthy(true);
            self.begin_settle();

            loop {
                if !self.is_running() {
                    return WorkerExit::Shutdown;
                }
                match self.step() {
                    StepResult::Continue => self.clock.sleep(self.settings.loop_period),
                    StepResult::Reconnect => break,
                    StepResult::Exit(exit) => return exit,
                }
            }
        }
    }

    /// Hold off fetching until DNS and DHCP settle, then fetch right away.
    fn begin_settle(&mut self) {
        let now = self.clock.now_ms();
        self.settle_until_ms = now + self.settings.settle_delay.as_millis() as u64;
        self.fetch_timer.trigger_now(now);
        log_debug!(
            "Waiting {}s for the network to settle",
            self.settings.settle_delay.as_secs()
        );
    }

    /// One iteration of the steady-state loop. Never sleeps itself.
    pub fn step(&mut self) -> StepResult {
        let now = self.clock.now_ms();

        if let Some((button, watcher)) = &mut self.reset
            && watcher.poll(button.is_pressed(), now) == ResetAction::Triggered
        {
            log_block_start!("Reset button held, wiping WiFi settings");
            if let Err(e) = self.manager.wipe_credentials() {
                log_error!("Failed to wipe credentials: {}", e);
            }
            self.shared.set_network_healthy(false);
            return StepResult::Exit(WorkerExit::RestartRequested);
        }

        match self.manager.check_health() {
            HealthAction::Exhausted => {
                self.shared.set_network_healthy(false);
                return StepResult::Reconnect;
            }
            HealthAction::JustReconnected => {
                self.shared.set_network_healthy(true);
                self.begin_settle();
            }
            HealthAction::Healthy => self.shared.set_network_healthy(true),
            HealthAction::Waiting | HealthAction::Reconnecting { .. } => {
                self.shared.set_network_healthy(false)
            }
        }

        self.sync_acknowledgment();

        let local = self.time.local_now(now);
        if let Some(today) = &local
            && self.sunset.observe_day(today)
        {
            self.sunset.recompute(local);
            self.shared.publish_sunset(self.sunset.window().minute_of_day);
        }

        if self.manager.is_connected()
            && now >= self.settle_until_ms
            && self.fetch_timer.poll(now)
        {
            self.fetch_cycle();
        }

        let now = self.clock.now_ms();
        self.shared
            .publish_time(self.time.now_utc(now), self.time.local_now(now));
        StepResult::Continue
    }

    /// Mirror the render side's acknowledgment into the scheduler.
    fn sync_acknowledgment(&mut self) {
        let window = self.sunset.window();
        if let Some(day) = self.shared.acknowledged_day()
            && window.day == Some(day)
            && !window.played_today
        {
            self.sunset.acknowledge_played();
        }
    }

    /// Fetch business data, sync time from its `Date` header and update the
    /// location. Returns true when the server answered with data.
    pub fn fetch_cycle(&mut self) -> bool {
        let server = self.discovery.get_server(self.manager.is_connected());
        if server.is_empty() {
            log_warning!("No API server known yet, skipping data fetch");
            return false;
        }

        let url = data_url(&server, &self.settings.data_path_template, self.settings.device_id);
        log_block_start!("Fetching lamp data");
        log_debug!("GET {}", url);

        let response = match self.http.get(&url, self.settings.http_timeout) {
            Ok(response) => response,
            Err(e) => {
                log_warning!("Data fetch failed: {}", e);
                return false;
            }
        };
        if !response.is_success() {
            log_warning!("Data fetch returned HTTP {}", response.status);
            return false;
        }

        let now = self.clock.now_ms();
        let synced = match response.date.as_deref() {
            Some(date) => self.time.parse_and_update(date, now),
            None => {
                log_warning!("Response carried no Date header");
                false
            }
        };

        let payload = match serde_json::from_str::<Value>(&response.body) {
            Ok(payload) => Some(payload),
            Err(e) => {
                log_warning!("Response body is not JSON: {}", e);
                None
            }
        };

        let mut location_changed = false;
        if let Some(coordinates) = payload.as_ref().and_then(coordinates_from_payload) {
            match self.sunset.update_coordinates(coordinates) {
                Ok(changed) => location_changed = changed,
                Err(e) => log_warning!("Could not save location: {}", e),
            }
        }
        if let Some(c) = self.sunset.coordinates() {
            self.time.set_tz_offset(c.tz_offset_hours);
        }
        self.shared
            .set_coordinates_known(self.sunset.coordinates().is_some());

        if synced || (location_changed && self.time.is_valid()) {
            self.sunset.recompute(self.time.local_now(now));
            self.shared
                .publish_sunset(self.sunset.window().minute_of_day);
        }

        if let (Some(sink), Some(payload)) = (self.payload_sink.as_mut(), payload.as_ref()) {
            sink(payload);
        }

        self.shared.record_fetch(now);
        log_decorated!("Data fetch complete");
        true
    }

    pub fn manager(&self) -> &ConnectivityManager {
        &self.manager
    }

    pub fn time(&self) -> &TimeSynchronizer {
        &self.time
    }

    pub fn sunset(&self) -> &SunsetScheduler {
        &self.sunset
    }

    /// Give the shared-state writer back so a replacement worker can use it.
    pub fn into_shared(self) -> NetworkHandle {
        self.shared
    }
}

/// `https://{server}{path}` with `{id}` in the path replaced by the device id.
pub fn data_url(server: &str, path_template: &str, device_id: u32) -> String {
    let path = path_template.replace("{id}", &device_id.to_string());
    format!("https://{server}{path}")
}

/// Location fields of the data payload. `tz_offset` is whole hours.
pub fn coordinates_from_payload(payload: &Value) -> Option<Coordinates> {
    let latitude = payload.get("latitude")?.as_f64()?;
    let longitude = payload.get("longitude")?.as_f64()?;
    let tz_offset = payload
        .get("tz_offset")
        .and_then(|v| v.as_i64().or_else(|| v.as_f64().map(|f| f.round() as i64)))
        .unwrap_or(0);
    if !(MINIMUM_TZ_OFFSET_HOURS as i64..=MAXIMUM_TZ_OFFSET_HOURS as i64).contains(&tz_offset) {
        return None;
    }
    let coordinates = Coordinates {
        latitude,
        longitude,
        tz_offset_hours: tz_offset as i8,
    };
    coordinates.is_known().then_some(coordinates)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_data_url() {
        assert_eq!(
            data_url("api.example.com", "/api/arduino/v2/{id}/data", 7),
            "https://api.example.com/api/arduino/v2/7/data"
        );
    }

    #[test]
    fn test_coordinates_from_payload() {
        let payload = json!({"latitude": 32.0853, "longitude": 34.7818, "tz_offset": 2, "wave_height_cm": 80});
        let c = coordinates_from_payload(&payload).unwrap();
        assert_eq!(c.tz_offset_hours, 2);
        assert!((c.latitude - 32.0853).abs() < 1e-9);

        assert!(coordinates_from_payload(&json!({"latitude": 0.0, "longitude": 0.0})).is_none());
        assert!(coordinates_from_payload(&json!({"latitude": 10.0})).is_none());
        assert!(
            coordinates_from_payload(&json!({"latitude": 10.0, "longitude": 10.0, "tz_offset": 20}))
                .is_none()
        );
        assert_eq!(
            coordinates_from_payload(&json!({"latitude": 10.0, "longitude": 10.0, "tz_offset": -3.0}))
                .map(|c| c.tz_offset_hours),
            Some(-3)
        );
    }
}
