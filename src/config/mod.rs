//! Configuration for the lamplink daemon.
//!
//! Settings are read from `lamplink.toml` in `XDG_CONFIG_HOME/lamplink/` (or
//! the directory given with `--config`). Every field is optional; missing
//! values fall back to the defaults in [`crate::common::constants`].
//!
//! ```toml
//! #[Device]
//! device_id = 1
//! data_path_template = "/api/arduino/v2/{id}/data"
//!
//! #[Connectivity]
//! credentials_scenario = "router_reboot"   # "router_reboot" or "has_credentials"
//! router_reboot_window = 300               # seconds
//! first_setup_portal_timeout = 1020        # seconds
//!
//! #[Discovery]
//! discovery_urls = ["https://a.example/config.json", "https://b.example/config.json"]
//! discovery_ttl_hours = 24
//! ```
//!
//! Out-of-range values are rejected at load time with a message naming the
//! field and its allowed range.

pub mod builder;
pub mod loading;
pub mod validation;

use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

use crate::common::constants::*;
use crate::common::utils::{format_duration, private_path};
use crate::discovery::DiscoverySettings;
use crate::storage::resolve_state_dir;
use crate::wifi::manager::{Backoff, CredentialsScenario, PortalSettings};
use crate::wifi::RetryPolicy;
use crate::worker::WorkerSettings;

pub use builder::create_default_config;
pub use loading::{get_config_path, get_custom_config_dir, load, load_from_path, set_config_dir};

#[derive(Debug, Deserialize, Clone, PartialEq, Default)]
pub struct Config {
    pub device_id: Option<u32>,
    pub data_path_template: Option<String>,

    pub portal_ssid: Option<String>,
    pub portal_password: Option<String>,

    pub credentials_scenario: Option<CredentialsScenario>,
    pub connect_attempt_timeout: Option<u64>, // seconds, first setup
    pub first_setup_portal_timeout: Option<u64>, // seconds
    pub router_reboot_window: Option<u64>,    // seconds
    pub connect_timeout_base: Option<u64>,
    pub connect_timeout_cap: Option<u64>,
    pub retry_delay_base: Option<u64>,
    pub retry_delay_cap: Option<u64>,
    pub has_credentials_max_attempts: Option<u32>,
    pub weak_signal_threshold: Option<i32>, // dBm
    pub health_reconnect_interval: Option<u64>, // seconds
    pub health_max_reconnects: Option<u32>,
    pub reset_hold: Option<u64>, // milliseconds

    pub discovery_urls: Option<Vec<String>>,
    pub discovery_attempts: Option<u32>,
    pub discovery_delay_base: Option<u64>,
    pub discovery_delay_cap: Option<u64>,
    pub discovery_ttl_hours: Option<u64>,

    pub fetch_interval: Option<u64>, // seconds
    pub settle_delay: Option<u64>,   // seconds

    pub render_hz: Option<u32>,
    pub sunset_window_minutes: Option<i32>,

    pub storage_dir: Option<String>,
}

impl Config {
    pub fn load() -> anyhow::Result<Self> {
        load()
    }

    pub fn load_from_path(path: &PathBuf) -> anyhow::Result<Self> {
        load_from_path(path)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        let defaults = RetryPolicy::default();
        RetryPolicy {
            credentials_scenario: self.credentials_scenario.unwrap_or_default(),
            first_setup_attempt_timeout: self
                .connect_attempt_timeout
                .map_or(defaults.first_setup_attempt_timeout, Duration::from_secs),
            first_setup_portal_timeout: self
                .first_setup_portal_timeout
                .map_or(defaults.first_setup_portal_timeout, Duration::from_secs),
            router_reboot_window: self
                .router_reboot_window
                .map_or(defaults.router_reboot_window, Duration::from_secs),
            connect_timeout: Backoff::new(
                self.connect_timeout_base
                    .unwrap_or(DEFAULT_CONNECT_TIMEOUT_BASE_SECS),
                self.connect_timeout_cap
                    .unwrap_or(DEFAULT_CONNECT_TIMEOUT_CAP_SECS),
            ),
            retry_delay: Backoff::new(
                self.retry_delay_base.unwrap_or(DEFAULT_RETRY_DELAY_BASE_SECS),
                self.retry_delay_cap.unwrap_or(DEFAULT_RETRY_DELAY_CAP_SECS),
            ),
            has_credentials_max_attempts: self
                .has_credentials_max_attempts
                .unwrap_or(defaults.has_credentials_max_attempts),
            weak_signal_threshold: self
                .weak_signal_threshold
                .unwrap_or(defaults.weak_signal_threshold),
        }
    }

    pub fn portal_settings(&self) -> PortalSettings {
        let defaults = PortalSettings::default();
        PortalSettings {
            ssid: self.portal_ssid.clone().unwrap_or(defaults.ssid),
            password: self.portal_password.clone().unwrap_or(defaults.password),
        }
    }

    pub fn discovery_settings(&self) -> DiscoverySettings {
        let defaults = DiscoverySettings::default();
        DiscoverySettings {
            urls: self.discovery_urls.clone().unwrap_or(defaults.urls),
            attempts: self.discovery_attempts.unwrap_or(defaults.attempts),
            delay: Backoff::new(
                self.discovery_delay_base
                    .unwrap_or(DEFAULT_DISCOVERY_DELAY_BASE_SECS),
                self.discovery_delay_cap
                    .unwrap_or(DEFAULT_DISCOVERY_DELAY_CAP_SECS),
            ),
            ttl: self
                .discovery_ttl_hours
                .map_or(defaults.ttl, |hours| Duration::from_secs(hours * 3600)),
            http_timeout: defaults.http_timeout,
        }
    }

    pub fn worker_settings(&self) -> WorkerSettings {
        let defaults = WorkerSettings::default();
        WorkerSettings {
            device_id: self.device_id.unwrap_or(defaults.device_id),
            data_path_template: self
                .data_path_template
                .clone()
                .unwrap_or(defaults.data_path_template),
            fetch_interval: self
                .fetch_interval
                .map_or(defaults.fetch_interval, Duration::from_secs),
            settle_delay: self
                .settle_delay
                .map_or(defaults.settle_delay, Duration::from_secs),
            reset_hold: self
                .reset_hold
                .map_or(defaults.reset_hold, Duration::from_millis),
            ..defaults
        }
    }

    /// Link health monitor settings: (reconnect interval, max reconnects).
    pub fn health_settings(&self) -> (Duration, u32) {
        (
            Duration::from_secs(
                self.health_reconnect_interval
                    .unwrap_or(DEFAULT_HEALTH_RECONNECT_INTERVAL_SECS),
            ),
            self.health_max_reconnects
                .unwrap_or(DEFAULT_HEALTH_MAX_RECONNECTS),
        )
    }

    pub fn render_hz(&self) -> u32 {
        self.render_hz.unwrap_or(DEFAULT_RENDER_HZ)
    }

    pub fn sunset_window_minutes(&self) -> i32 {
        self.sunset_window_minutes
            .unwrap_or(DEFAULT_SUNSET_WINDOW_MINUTES)
    }

    pub fn storage_dir(&self) -> PathBuf {
        resolve_state_dir(self.storage_dir.as_deref())
    }

    pub fn log_config(&self) {
        let policy = self.retry_policy();
        let discovery = self.discovery_settings();
        let worker = self.worker_settings();

        log_block_start!("Loaded configuration");
        log_indented!("Device id: {}", worker.device_id);
        log_indented!(
            "Credentials scenario: {}",
            crate::wifi::ConnectionScenario::from(policy.credentials_scenario)
        );
        match policy.credentials_scenario {
            CredentialsScenario::RouterReboot => log_indented!(
                "Router reboot window: {}",
                format_duration(Some(policy.router_reboot_window))
            ),
            CredentialsScenario::HasCredentials => log_indented!(
                "Reconnect attempts: {}",
                policy.has_credentials_max_attempts
            ),
        }
        log_indented!(
            "Setup portal: '{}' for {}",
            self.portal_settings().ssid,
            format_duration(Some(policy.first_setup_portal_timeout))
        );
        log_indented!(
            "Discovery: {} sources, refreshed every {}",
            discovery.urls.len(),
            format_duration(Some(discovery.ttl))
        );
        log_indented!(
            "Fetch interval: {}",
            format_duration(Some(worker.fetch_interval))
        );
        log_indented!(
            "Render rate: {} Hz, sunset window ±{} minutes",
            self.render_hz(),
            self.sunset_window_minutes()
        );
        log_indented!("State directory: {}", private_path(&self.storage_dir()));
    }
}

#[cfg(test)]
mod tests;
