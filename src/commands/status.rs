//! `lamplink status`: print what the device remembers.

use anyhow::Result;
use chrono::{DateTime, NaiveDate, Utc};

use crate::common::constants::*;
use crate::config::Config;
use crate::discovery::{KEY_LAST_ATTEMPT, KEY_SERVER};
use crate::io::lock::{get_lock_path, read_lock_pid};
use crate::storage::{KeyValueStore, SharedStore};
use crate::sunset::{Coordinates, SolarCalculator, SunsetScheduler, sunset_minute_of_day};
use crate::wifi::FingerprintStore;
use crate::wifi::host::KEY_SSID;

#[derive(Debug, Clone, PartialEq)]
pub struct StatusReport {
    pub stored_ssid: Option<String>,
    pub fingerprint: Vec<String>,
    pub server: Option<String>,
    pub last_discovery: Option<DateTime<Utc>>,
    pub coordinates: Option<Coordinates>,
    /// Local minute of day of today's sunset, when the location is known.
    pub sunset_minute: Option<i32>,
}

pub fn collect_status(store: SharedStore, today: NaiveDate) -> Result<StatusReport> {
    let stored_ssid = store.get_string(NS_CREDENTIALS, KEY_SSID)?;
    let fingerprint = FingerprintStore::load(store.clone())?
        .fingerprint()
        .neighbors()
        .to_vec();
    let server = store
        .get_string(NS_DISCOVERY, KEY_SERVER)?
        .filter(|s| !s.is_empty());
    let last_discovery = store
        .get_i64(NS_DISCOVERY, KEY_LAST_ATTEMPT)?
        .and_then(|secs| DateTime::<Utc>::from_timestamp(secs, 0));

    let calculator = SolarCalculator;
    let coordinates = SunsetScheduler::load(
        store,
        Box::new(SolarCalculator),
        DEFAULT_SUNSET_WINDOW_MINUTES,
    )?
    .coordinates();
    let sunset_minute = coordinates
        .as_ref()
        .and_then(|c| sunset_minute_of_day(&calculator, c, today))
        .filter(|m| *m >= 0);

    Ok(StatusReport {
        stored_ssid,
        fingerprint,
        server,
        last_discovery,
        coordinates,
        sunset_minute,
    })
}

pub fn handle_status_command(config: &Config) -> Result<()> {
    let store = super::open_store(config)?;
    let report = collect_status(store, Utc::now().date_naive())?;

    log_block_start!("lamplink status");
    match read_lock_pid(&get_lock_path()) {
        Some(pid) => log_indented!("Daemon: running (PID: {pid})"),
        None => log_indented!("Daemon: not running"),
    }
    log_indented!(
        "Stored network: {}",
        report.stored_ssid.as_deref().unwrap_or("none (first setup)")
    );

    if report.fingerprint.is_empty() {
        log_indented!("Location fingerprint: none");
    } else {
        log_indented!("Location fingerprint:");
        for neighbor in &report.fingerprint {
            log_indented!("  • {}", neighbor);
        }
    }

    match &report.server {
        Some(server) => log_indented!("API server: {}", server),
        None => log_indented!("API server: not discovered"),
    }
    if let Some(at) = report.last_discovery {
        log_indented!("Last discovery: {}", at.format("%Y-%m-%d %H:%M:%S UTC"));
    }

    match &report.coordinates {
        Some(c) => {
            log_indented!(
                "Location: {:.4}, {:.4} (UTC{:+})",
                c.latitude,
                c.longitude,
                c.tz_offset_hours
            );
            if let Some(minute) = report.sunset_minute {
                log_indented!("Sunset today: {:02}:{:02}", minute / 60, minute % 60);
            }
        }
        None => log_indented!("Location: unknown"),
    }
    log_end!();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::constants::test_constants::*;
    use crate::storage::{MemoryStore, StoredValue};
    use std::sync::Arc;

    #[test]
    fn test_empty_store_reports_nothing() {
        let store: SharedStore = Arc::new(MemoryStore::new());
        let report = collect_status(store, NaiveDate::from_ymd_opt(2025, 6, 1).unwrap()).unwrap();
        assert_eq!(report.stored_ssid, None);
        assert!(report.fingerprint.is_empty());
        assert_eq!(report.server, None);
        assert_eq!(report.coordinates, None);
        assert_eq!(report.sunset_minute, None);
    }

    #[test]
    fn test_populated_store() {
        crate::logger::Log::set_enabled(false);
        let store: SharedStore = Arc::new(MemoryStore::new());
        store
            .put(NS_CREDENTIALS, KEY_SSID, StoredValue::from(TEST_HOME_SSID))
            .unwrap();
        store.put(NS_FINGERPRINT, "count", StoredValue::Integer(1)).unwrap();
        store
            .put(NS_FINGERPRINT, "n0", StoredValue::from(TEST_NEIGHBORS[0]))
            .unwrap();
        store
            .put(NS_DISCOVERY, KEY_SERVER, StoredValue::from(TEST_SERVER))
            .unwrap();
        store
            .put(NS_DISCOVERY, KEY_LAST_ATTEMPT, StoredValue::Integer(1_766_268_562))
            .unwrap();
        store
            .put(NS_LOCATION, "latitude", StoredValue::Float(TEST_LATITUDE))
            .unwrap();
        store
            .put(NS_LOCATION, "longitude", StoredValue::Float(TEST_LONGITUDE))
            .unwrap();
        store
            .put(NS_LOCATION, "tz_offset", StoredValue::Integer(TEST_TZ_OFFSET as i64))
            .unwrap();

        let report =
            collect_status(store, NaiveDate::from_ymd_opt(2025, 12, 20).unwrap()).unwrap();
        assert_eq!(report.stored_ssid.as_deref(), Some(TEST_HOME_SSID));
        assert_eq!(report.fingerprint, vec![TEST_NEIGHBORS[0].to_string()]);
        assert_eq!(report.server.as_deref(), Some(TEST_SERVER));
        assert_eq!(
            report.last_discovery,
            DateTime::<Utc>::from_timestamp(1_766_268_562, 0)
        );
        assert!(report.coordinates.is_some());
        let minute = report.sunset_minute.unwrap();
        assert!((16 * 60..17 * 60).contains(&minute), "sunset at {minute}");
    }
}
