//! Configuration validation.
//!
//! Rejects values the daemon cannot run with: out-of-range timings, a
//! single discovery source, inverted backoff pairs and malformed templates.

use anyhow::Result;

use super::Config;
use crate::common::constants::*;
use crate::discovery::normalize_server;

pub fn validate_config(config: &Config) -> Result<()> {
    if let Some(id) = config.device_id
        && id == 0
    {
        anyhow::bail!("device_id must be a positive integer");
    }

    if let Some(template) = &config.data_path_template {
        if !template.starts_with('/') {
            anyhow::bail!("data_path_template must start with '/' (got '{}')", template);
        }
        if !template.contains("{id}") {
            anyhow::bail!("data_path_template must contain the '{{id}}' placeholder");
        }
    }

    if let Some(ssid) = &config.portal_ssid
        && (ssid.is_empty() || ssid.len() > FINGERPRINT_MAX_SSID_LEN)
    {
        anyhow::bail!(
            "portal_ssid must be between 1 and {} characters",
            FINGERPRINT_MAX_SSID_LEN
        );
    }

    if let Some(password) = &config.portal_password
        && password.len() < MINIMUM_PORTAL_PASSWORD_LEN
    {
        anyhow::bail!(
            "portal_password must be at least {} characters (WPA2 minimum)",
            MINIMUM_PORTAL_PASSWORD_LEN
        );
    }

    validate_positive(config.connect_attempt_timeout, "connect_attempt_timeout")?;
    validate_positive(config.first_setup_portal_timeout, "first_setup_portal_timeout")?;
    validate_positive(config.fetch_interval, "fetch_interval")?;
    validate_positive(config.health_reconnect_interval, "health_reconnect_interval")?;
    validate_positive(config.reset_hold, "reset_hold")?;

    if let Some(window) = config.router_reboot_window
        && !(MINIMUM_ROUTER_REBOOT_WINDOW_SECS..=MAXIMUM_ROUTER_REBOOT_WINDOW_SECS)
            .contains(&window)
    {
        anyhow::bail!(
            "router_reboot_window ({} seconds) must be between {} and {} seconds",
            window,
            MINIMUM_ROUTER_REBOOT_WINDOW_SECS,
            MAXIMUM_ROUTER_REBOOT_WINDOW_SECS
        );
    }

    validate_backoff(
        config.connect_timeout_base,
        config.connect_timeout_cap,
        DEFAULT_CONNECT_TIMEOUT_BASE_SECS,
        DEFAULT_CONNECT_TIMEOUT_CAP_SECS,
        "connect_timeout",
    )?;
    validate_backoff(
        config.retry_delay_base,
        config.retry_delay_cap,
        DEFAULT_RETRY_DELAY_BASE_SECS,
        DEFAULT_RETRY_DELAY_CAP_SECS,
        "retry_delay",
    )?;
    validate_backoff(
        config.discovery_delay_base,
        config.discovery_delay_cap,
        DEFAULT_DISCOVERY_DELAY_BASE_SECS,
        DEFAULT_DISCOVERY_DELAY_CAP_SECS,
        "discovery_delay",
    )?;

    validate_attempts(config.has_credentials_max_attempts, "has_credentials_max_attempts")?;
    validate_attempts(config.health_max_reconnects, "health_max_reconnects")?;
    validate_attempts(config.discovery_attempts, "discovery_attempts")?;

    if let Some(threshold) = config.weak_signal_threshold
        && !(MINIMUM_WEAK_SIGNAL_THRESHOLD_DBM..=MAXIMUM_WEAK_SIGNAL_THRESHOLD_DBM)
            .contains(&threshold)
    {
        anyhow::bail!(
            "weak_signal_threshold ({} dBm) must be between {} and {} dBm",
            threshold,
            MINIMUM_WEAK_SIGNAL_THRESHOLD_DBM,
            MAXIMUM_WEAK_SIGNAL_THRESHOLD_DBM
        );
    }

    if let Some(urls) = &config.discovery_urls {
        if urls.len() < 2 {
            anyhow::bail!(
                "discovery_urls needs at least 2 sources so a single outage cannot strand the device (got {})",
                urls.len()
            );
        }
        for url in urls {
            if !(url.starts_with("https://") || url.starts_with("http://"))
                || normalize_server(url).is_none()
            {
                anyhow::bail!("discovery_urls entry '{}' is not a valid http(s) URL", url);
            }
        }
    }

    if let Some(ttl) = config.discovery_ttl_hours
        && !(1..=24 * 7).contains(&ttl)
    {
        anyhow::bail!("discovery_ttl_hours ({}) must be between 1 and 168 hours", ttl);
    }

    if let Some(interval) = config.fetch_interval
        && !(MINIMUM_FETCH_INTERVAL_SECS..=MAXIMUM_FETCH_INTERVAL_SECS).contains(&interval)
    {
        anyhow::bail!(
            "fetch_interval ({} seconds) must be between {} and {} seconds",
            interval,
            MINIMUM_FETCH_INTERVAL_SECS,
            MAXIMUM_FETCH_INTERVAL_SECS
        );
    }

    if let Some(hz) = config.render_hz
        && !(MINIMUM_RENDER_HZ..=MAXIMUM_RENDER_HZ).contains(&hz)
    {
        anyhow::bail!(
            "render_hz ({}) must be between {} and {}",
            hz,
            MINIMUM_RENDER_HZ,
            MAXIMUM_RENDER_HZ
        );
    }

    if let Some(window) = config.sunset_window_minutes
        && !(MINIMUM_SUNSET_WINDOW_MINUTES..=MAXIMUM_SUNSET_WINDOW_MINUTES).contains(&window)
    {
        anyhow::bail!(
            "sunset_window_minutes ({}) must be between {} and {} minutes",
            window,
            MINIMUM_SUNSET_WINDOW_MINUTES,
            MAXIMUM_SUNSET_WINDOW_MINUTES
        );
    }

    if let Some(dir) = &config.storage_dir
        && dir.trim().is_empty()
    {
        anyhow::bail!("storage_dir must not be empty");
    }

    Ok(())
}

fn validate_positive(value: Option<u64>, name: &str) -> Result<()> {
    if value == Some(0) {
        anyhow::bail!("{} must be greater than zero", name);
    }
    Ok(())
}

fn validate_attempts(value: Option<u32>, name: &str) -> Result<()> {
    if let Some(attempts) = value
        && !(1..=MAXIMUM_RETRY_ATTEMPTS).contains(&attempts)
    {
        anyhow::bail!(
            "{} ({}) must be between 1 and {}",
            name,
            attempts,
            MAXIMUM_RETRY_ATTEMPTS
        );
    }
    Ok(())
}

/// A backoff pair must have a positive base no larger than its cap.
fn validate_backoff(
    base: Option<u64>,
    cap: Option<u64>,
    default_base: u64,
    default_cap: u64,
    name: &str,
) -> Result<()> {
    let base = base.unwrap_or(default_base);
    let cap = cap.unwrap_or(default_cap);
    if base == 0 {
        anyhow::bail!("{}_base must be greater than zero", name);
    }
    if base > cap {
        anyhow::bail!(
            "{name}_base ({base}s) must not exceed {name}_cap ({cap}s)"
        );
    }
    Ok(())
}
