//! WiFi connectivity: the radio capability, diagnostics, relocation
//! fingerprinting and the scenario-driven connection manager.

use anyhow::Result;
use std::time::Duration;

pub mod diagnostics;
pub mod fingerprint;
pub mod health;
pub mod host;
pub mod link;
pub mod manager;
pub mod reason;
pub mod reset;
pub mod sim;

pub use fingerprint::{Fingerprint, FingerprintStore, LocationMatch};
pub use link::LinkStatus;
pub use manager::{ConnectOutcome, ConnectionScenario, ConnectivityManager, RetryPolicy};
pub use reason::DisconnectReason;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SecurityMode {
    Open,
    Wep,
    WpaPsk,
    Wpa2Psk,
    WpaWpa2Psk,
    Wpa2Enterprise,
    Wpa2Wpa3Psk,
    /// WPA3-only networks cannot be joined by the radio.
    Wpa3Psk,
}

impl SecurityMode {
    pub fn is_supported(&self) -> bool {
        !matches!(self, SecurityMode::Wpa3Psk)
    }
}

/// One network seen during a scan.
#[derive(Debug, Clone, PartialEq)]
pub struct ScanEntry {
    pub ssid: String,
    pub rssi: i32,
    pub security: SecurityMode,
    pub channel: u8,
}

impl ScanEntry {
    pub fn new(ssid: &str, rssi: i32) -> Self {
        Self {
            ssid: ssid.to_string(),
            rssi,
            security: SecurityMode::Wpa2Psk,
            channel: 6,
        }
    }
}

/// Notifications delivered by the radio to its observer.
#[derive(Debug, Clone, PartialEq)]
pub enum LinkEvent {
    Connected,
    GotIp(String),
    /// Raw link-layer reason code; classified by `DisconnectReason::from_code`.
    Disconnected { reason: u8 },
}

pub type LinkObserver = Box<dyn Fn(LinkEvent) + Send + Sync>;

/// Parameters of one configuration portal session.
#[derive(Debug, Clone, PartialEq)]
pub struct PortalRequest {
    pub ssid: String,
    pub password: String,
    /// `None` keeps the portal open until someone configures the device.
    pub timeout: Option<Duration>,
    /// Last known failure, shown at the top of the portal page.
    pub error_banner: Option<String>,
}

/// Radio and captive-portal capability.
///
/// Connection calls only start the operation; the manager polls
/// `is_connected` against its own timeout.
pub trait WifiRadio: Send {
    /// Network name of the stored credentials, if any.
    fn stored_ssid(&self) -> Option<String>;

    /// Join the stored network from a cold start.
    fn begin(&mut self);

    /// Plain reconnect with the stored credentials. Never opens a portal.
    fn reconnect(&mut self);

    fn disconnect(&mut self);

    fn is_connected(&self) -> bool;

    /// Blocking scan of visible networks. An empty result may mean the scan failed.
    fn scan(&mut self) -> Vec<ScanEntry>;

    /// Run a portal session. Returns true once the device joined a network
    /// through it, false if the session closed without that happening.
    fn open_portal(&mut self, request: &PortalRequest) -> bool;

    /// Forget stored credentials.
    fn reset_settings(&mut self) -> Result<()>;

    fn current_ssid(&self) -> Option<String>;

    /// Register the link observer. Called once by the manager.
    fn subscribe(&mut self, observer: LinkObserver);
}
