//! Default configuration file generation.
//!
//! The generated file lists every setting with its default value and an
//! aligned comment describing the accepted range.

use anyhow::{Context, Result};
use std::fs;
use std::path::Path;

use crate::common::constants::*;

/// Write a commented default config to `path`, creating parent directories.
pub fn create_default_config(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).context("Failed to create config directory")?;
    }
    fs::write(path, default_config_content())
        .with_context(|| format!("Failed to write default config to {}", path.display()))?;
    Ok(())
}

pub fn default_config_content() -> String {
    let urls = DEFAULT_DISCOVERY_URLS
        .iter()
        .map(|u| format!("\"{u}\""))
        .collect::<Vec<_>>()
        .join(", ");

    ConfigBuilder::new()
        .add_section("Device")
        .add_setting(
            "device_id",
            &DEFAULT_DEVICE_ID.to_string(),
            "Identifier used in the data URL",
        )
        .add_setting(
            "data_path_template",
            &format!("\"{DEFAULT_DATA_PATH_TEMPLATE}\""),
            "Data path on the API server ({id} is replaced)",
        )
        .add_setting(
            "fetch_interval",
            &DEFAULT_FETCH_INTERVAL_SECS.to_string(),
            &format!(
                "Seconds between data fetches ({MINIMUM_FETCH_INTERVAL_SECS}-{MAXIMUM_FETCH_INTERVAL_SECS})"
            ),
        )
        .add_setting(
            "settle_delay",
            &DEFAULT_SETTLE_DELAY_SECS.to_string(),
            "Seconds to wait after (re)connecting before fetching",
        )
        .add_section("Setup portal")
        .add_setting(
            "portal_ssid",
            &format!("\"{DEFAULT_PORTAL_SSID}\""),
            "Access point name shown during setup",
        )
        .add_setting(
            "portal_password",
            &format!("\"{DEFAULT_PORTAL_PASSWORD}\""),
            &format!("Access point password ({MINIMUM_PORTAL_PASSWORD_LEN}+ characters)"),
        )
        .add_setting(
            "first_setup_portal_timeout",
            &DEFAULT_FIRST_SETUP_PORTAL_TIMEOUT_SECS.to_string(),
            "Seconds the first-setup portal stays open",
        )
        .add_section("Connectivity")
        .add_setting(
            "credentials_scenario",
            "\"router_reboot\"",
            "With stored credentials: \"router_reboot\" or \"has_credentials\"",
        )
        .add_setting(
            "connect_attempt_timeout",
            &DEFAULT_CONNECT_ATTEMPT_TIMEOUT_SECS.to_string(),
            "Seconds for the single first-setup attempt",
        )
        .add_setting(
            "router_reboot_window",
            &DEFAULT_ROUTER_REBOOT_WINDOW_SECS.to_string(),
            &format!(
                "Seconds of retries before opening the portal ({MINIMUM_ROUTER_REBOOT_WINDOW_SECS}-{MAXIMUM_ROUTER_REBOOT_WINDOW_SECS})"
            ),
        )
        .add_setting(
            "connect_timeout_base",
            &DEFAULT_CONNECT_TIMEOUT_BASE_SECS.to_string(),
            "Per-attempt timeout, doubled each attempt",
        )
        .add_setting(
            "connect_timeout_cap",
            &DEFAULT_CONNECT_TIMEOUT_CAP_SECS.to_string(),
            "Upper bound for the per-attempt timeout",
        )
        .add_setting(
            "retry_delay_base",
            &DEFAULT_RETRY_DELAY_BASE_SECS.to_string(),
            "Delay between attempts, doubled each attempt",
        )
        .add_setting(
            "retry_delay_cap",
            &DEFAULT_RETRY_DELAY_CAP_SECS.to_string(),
            "Upper bound for the delay between attempts",
        )
        .add_setting(
            "has_credentials_max_attempts",
            &DEFAULT_HAS_CREDENTIALS_MAX_ATTEMPTS.to_string(),
            &format!("Attempts for \"has_credentials\" (1-{MAXIMUM_RETRY_ATTEMPTS})"),
        )
        .add_setting(
            "weak_signal_threshold",
            &DEFAULT_WEAK_SIGNAL_THRESHOLD_DBM.to_string(),
            &format!(
                "Signal below this is reported as weak ({MINIMUM_WEAK_SIGNAL_THRESHOLD_DBM} to {MAXIMUM_WEAK_SIGNAL_THRESHOLD_DBM}) dBm"
            ),
        )
        .add_setting(
            "health_reconnect_interval",
            &DEFAULT_HEALTH_RECONNECT_INTERVAL_SECS.to_string(),
            "Seconds between reconnects after the link drops",
        )
        .add_setting(
            "health_max_reconnects",
            &DEFAULT_HEALTH_MAX_RECONNECTS.to_string(),
            "Reconnects before the full connection sequence reruns",
        )
        .add_setting(
            "reset_hold",
            &DEFAULT_RESET_HOLD_MS.to_string(),
            "Milliseconds the reset button must be held",
        )
        .add_section("Discovery")
        .add_setting(
            "discovery_urls",
            &format!("[{urls}]"),
            "Discovery documents, tried alternately (2+ required)",
        )
        .add_setting(
            "discovery_attempts",
            &DEFAULT_DISCOVERY_ATTEMPTS.to_string(),
            "Attempts per discovery run",
        )
        .add_setting(
            "discovery_delay_base",
            &DEFAULT_DISCOVERY_DELAY_BASE_SECS.to_string(),
            "Delay between discovery attempts, doubled each attempt",
        )
        .add_setting(
            "discovery_delay_cap",
            &DEFAULT_DISCOVERY_DELAY_CAP_SECS.to_string(),
            "Upper bound for the discovery delay",
        )
        .add_setting(
            "discovery_ttl_hours",
            &DEFAULT_DISCOVERY_TTL_HOURS.to_string(),
            "Hours before the cached server is refreshed (1-168)",
        )
        .add_section("Display")
        .add_setting(
            "render_hz",
            &DEFAULT_RENDER_HZ.to_string(),
            &format!("Frame rate ({MINIMUM_RENDER_HZ}-{MAXIMUM_RENDER_HZ}) Hz"),
        )
        .add_setting(
            "sunset_window_minutes",
            &DEFAULT_SUNSET_WINDOW_MINUTES.to_string(),
            &format!(
                "Minutes either side of sunset ({MINIMUM_SUNSET_WINDOW_MINUTES}-{MAXIMUM_SUNSET_WINDOW_MINUTES})"
            ),
        )
        .build()
}

#[derive(Debug)]
enum EntryType {
    Section,
    Setting { line: String, comment: String },
}

#[derive(Debug)]
struct ConfigEntry {
    content: String,
    entry_type: EntryType,
}

/// Collects sections and settings, then aligns every comment to one column.
struct ConfigBuilder {
    entries: Vec<ConfigEntry>,
}

impl ConfigBuilder {
    fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    fn add_section(mut self, title: &str) -> Self {
        self.entries.push(ConfigEntry {
            content: format!("#[{title}]"),
            entry_type: EntryType::Section,
        });
        self
    }

    fn add_setting(mut self, key: &str, value: &str, comment: &str) -> Self {
        let line = format!("{key} = {value}");
        self.entries.push(ConfigEntry {
            content: String::new(),
            entry_type: EntryType::Setting {
                line,
                comment: format!("# {comment}"),
            },
        });
        self
    }

    fn build(self) -> String {
        let max_width = self
            .entries
            .iter()
            .filter_map(|entry| match &entry.entry_type {
                // Long array values would push every comment off screen.
                EntryType::Setting { line, .. } if line.len() <= 60 => Some(line.len()),
                _ => None,
            })
            .max()
            .unwrap_or(0)
            + 1;

        let mut result = Vec::new();
        let mut first_section = true;

        for entry in self.entries {
            match entry.entry_type {
                EntryType::Section => {
                    if !first_section {
                        result.push(String::new());
                    }
                    result.push(entry.content);
                    first_section = false;
                }
                EntryType::Setting { line, comment } => {
                    if line.len() >= max_width {
                        result.push(comment);
                        result.push(line);
                    } else {
                        let padding = " ".repeat(max_width - line.len());
                        result.push(format!("{line}{padding}{comment}"));
                    }
                }
            }
        }

        result.push(String::new());
        result.join("\n")
    }
}
