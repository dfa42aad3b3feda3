//! Application-wide constants: defaults, validation limits and protocol values.
//!
//! Durations are plain integers in the unit named by the suffix so they can be
//! used directly as configuration defaults.

// # Application

pub const EXIT_FAILURE: i32 = 1;
pub const CONFIG_FILE_NAME: &str = "lamplink.toml";
pub const APP_DIR_NAME: &str = "lamplink";
pub const LOCK_FILE_NAME: &str = "lamplink.lock";

// # Device identity and portal

pub const DEFAULT_DEVICE_ID: u32 = 1;
pub const DEFAULT_PORTAL_SSID: &str = "SurfLamp-Setup";
pub const DEFAULT_PORTAL_PASSWORD: &str = "surf123456";
pub const MINIMUM_PORTAL_PASSWORD_LEN: usize = 8;

// # Connection scenarios

/// Budget of a single bounded connection attempt (first setup).
pub const DEFAULT_CONNECT_ATTEMPT_TIMEOUT_SECS: u64 = 10;
/// Portal timeout while a human is expected to be present (17 minutes).
pub const DEFAULT_FIRST_SETUP_PORTAL_TIMEOUT_SECS: u64 = 1020;
/// Total wall-clock budget for router-reboot retries.
pub const DEFAULT_ROUTER_REBOOT_WINDOW_SECS: u64 = 300;
pub const DEFAULT_CONNECT_TIMEOUT_BASE_SECS: u64 = 20;
pub const DEFAULT_CONNECT_TIMEOUT_CAP_SECS: u64 = 60;
pub const DEFAULT_RETRY_DELAY_BASE_SECS: u64 = 5;
pub const DEFAULT_RETRY_DELAY_CAP_SECS: u64 = 60;
pub const DEFAULT_HAS_CREDENTIALS_MAX_ATTEMPTS: u32 = 10;
/// Poll interval while waiting for a plain reconnect to come up.
pub const CONNECTION_POLL_MS: u64 = 500;
pub const MINIMUM_ROUTER_REBOOT_WINDOW_SECS: u64 = 30;
pub const MAXIMUM_ROUTER_REBOOT_WINDOW_SECS: u64 = 3600;
pub const MAXIMUM_RETRY_ATTEMPTS: u32 = 100;

// # Diagnostics

pub const DEFAULT_WEAK_SIGNAL_THRESHOLD_DBM: i32 = -85;
pub const MINIMUM_WEAK_SIGNAL_THRESHOLD_DBM: i32 = -100;
pub const MAXIMUM_WEAK_SIGNAL_THRESHOLD_DBM: i32 = -50;
/// Channels above this may be unavailable in some regulatory domains.
pub const HIGHEST_PORTABLE_CHANNEL: u8 = 11;
/// Identical disconnect reasons are re-logged at most this often.
pub const DISCONNECT_LOG_INTERVAL_MS: u64 = 10_000;

// # Location fingerprint

pub const FINGERPRINT_MAX_NEIGHBORS: usize = 4;
pub const FINGERPRINT_MAX_SSID_LEN: usize = 32;

// # Server discovery

pub const DEFAULT_DISCOVERY_URLS: [&str; 2] = [
    "https://shahar42.github.io/final_surf_lamp/discovery-config/config.json",
    "https://raw.githubusercontent.com/shahar42/final_surf_lamp/master/discovery-config/config.json",
];
pub const DEFAULT_DISCOVERY_ATTEMPTS: u32 = 5;
pub const DEFAULT_DISCOVERY_DELAY_BASE_SECS: u64 = 5;
pub const DEFAULT_DISCOVERY_DELAY_CAP_SECS: u64 = 40;
pub const DEFAULT_DISCOVERY_TTL_HOURS: u64 = 24;
pub const DISCOVERY_HTTP_TIMEOUT_SECS: u64 = 10;
pub const MINIMUM_SERVER_LEN: usize = 6;

// # Data fetch and network worker

/// Fetch interval for business data (13 minutes).
pub const DEFAULT_FETCH_INTERVAL_SECS: u64 = 780;
pub const MINIMUM_FETCH_INTERVAL_SECS: u64 = 10;
pub const MAXIMUM_FETCH_INTERVAL_SECS: u64 = 86_400;
/// DNS/DHCP/ARP settle time after (re)connection.
pub const DEFAULT_SETTLE_DELAY_SECS: u64 = 10;
pub const DATA_HTTP_TIMEOUT_SECS: u64 = 15;
pub const DEFAULT_DATA_PATH_TEMPLATE: &str = "/api/arduino/v2/{id}/data";
/// Minimum network worker loop period; bounds staleness of shared state.
pub const NETWORK_LOOP_PERIOD_MS: u64 = 1000;
pub const DEFAULT_HEALTH_RECONNECT_INTERVAL_SECS: u64 = 10;
pub const DEFAULT_HEALTH_MAX_RECONNECTS: u32 = 10;
pub const DEFAULT_RESET_HOLD_MS: u64 = 2000;

// # Render loop

pub const DEFAULT_RENDER_HZ: u32 = 200;
pub const MINIMUM_RENDER_HZ: u32 = 10;
pub const MAXIMUM_RENDER_HZ: u32 = 1000;
/// Long animations must yield at least this often.
pub const ANIMATION_YIELD_INTERVAL_MS: u64 = 50;

// # Sunset

pub const DEFAULT_SUNSET_WINDOW_MINUTES: i32 = 15;
pub const MINIMUM_SUNSET_WINDOW_MINUTES: i32 = 1;
pub const MAXIMUM_SUNSET_WINDOW_MINUTES: i32 = 120;
pub const MINUTES_PER_DAY: i32 = 1440;
/// Coordinate changes smaller than this are not persisted.
pub const COORDINATE_EPSILON: f64 = 0.0001;
pub const MINIMUM_TZ_OFFSET_HOURS: i8 = -12;
pub const MAXIMUM_TZ_OFFSET_HOURS: i8 = 14;

// # Storage namespaces

pub const NS_FINGERPRINT: &str = "wifi_fp";
pub const NS_DISCOVERY: &str = "discovery";
pub const NS_LOCATION: &str = "location";
pub const NS_CREDENTIALS: &str = "wifi_creds";
pub const ALL_NAMESPACES: [&str; 4] = [NS_FINGERPRINT, NS_DISCOVERY, NS_LOCATION, NS_CREDENTIALS];

#[cfg(any(test, feature = "testing-support"))]
pub mod test_constants {
    pub const TEST_HOME_SSID: &str = "HomeNet";
    pub const TEST_NEIGHBORS: [&str; 4] = ["Cafe-Guest", "NETGEAR42", "Pixel_7", "FRITZ!Box 7530"];
    pub const TEST_FOREIGN_NETWORKS: [&str; 3] = ["Hotel-WiFi", "Airport-Free", "eduroam"];
    pub const TEST_SERVER: &str = "final-surf-lamp.onrender.com";
    pub const TEST_DATE_HEADER: &str = "Sat, 20 Dec 2025 22:09:22 GMT";
    /// Tel Aviv, UTC+2 in winter.
    pub const TEST_LATITUDE: f64 = 32.0853;
    pub const TEST_LONGITUDE: f64 = 34.7818;
    pub const TEST_TZ_OFFSET: i8 = 2;
}
