//! Radio backed by the host operating system's network stack.
//!
//! On a desktop or server the OS owns the wireless link, so this radio only
//! observes it: "connected" means a default route exists. Joining, scanning and
//! the portal are delegated to whoever manages the host's network. Stored
//! credentials are the name of the last network the daemon saw itself online
//! on, kept in the `wifi_creds` namespace.
//!
//! There is no scan on the host. Failed attempts are therefore always
//! diagnosed as "no networks visible", and no location fingerprint is ever
//! stored, so relocation detection stays inactive.

use anyhow::Result;
use std::cell::Cell;
use std::net::UdpSocket;
use std::time::Duration;

use super::{LinkEvent, LinkObserver, PortalRequest, ScanEntry, WifiRadio};
use crate::clock::{Deadline, SharedClock};
use crate::common::constants::{CONNECTION_POLL_MS, NS_CREDENTIALS};
use crate::common::utils::format_duration;
use crate::storage::{KeyValueStore, SharedStore, StoredValue};

pub(crate) const KEY_SSID: &str = "ssid";
/// Routing probe target. No packet is sent; `connect` on UDP only resolves a route.
const ROUTE_PROBE_ADDR: &str = "8.8.8.8:53";
const HOST_NETWORK_NAME: &str = "host-network";
/// Reported when the route disappears.
const REASON_BEACON_LOST: u8 = 201;

pub struct HostRadio {
    store: SharedStore,
    clock: SharedClock,
    observers: Vec<LinkObserver>,
    last_state: Cell<Option<bool>>,
    scan_notice_logged: bool,
}

impl HostRadio {
    pub fn new(store: SharedStore, clock: SharedClock) -> Self {
        Self {
            store,
            clock,
            observers: Vec::new(),
            last_state: Cell::new(None),
            scan_notice_logged: false,
        }
    }

    fn route_ip() -> Option<String> {
        let socket = UdpSocket::bind("0.0.0.0:0").ok()?;
        socket.connect(ROUTE_PROBE_ADDR).ok()?;
        let local = socket.local_addr().ok()?;
        if local.ip().is_unspecified() {
            None
        } else {
            Some(local.ip().to_string())
        }
    }

    fn emit(&self, event: LinkEvent) {
        for observer in &self.observers {
            observer(event.clone());
        }
    }

    fn remember_network(&self) {
        if let Err(e) = self
            .store
            .put(NS_CREDENTIALS, KEY_SSID, StoredValue::from(HOST_NETWORK_NAME))
        {
            log_warning!("Could not record network: {}", e);
        }
    }
}

impl WifiRadio for HostRadio {
    fn stored_ssid(&self) -> Option<String> {
        self.store.get_string(NS_CREDENTIALS, KEY_SSID).ok().flatten()
    }

    fn begin(&mut self) {
        if self.is_connected() && self.stored_ssid().is_none() {
            self.remember_network();
        }
    }

    fn reconnect(&mut self) {
        self.is_connected();
    }

    fn disconnect(&mut self) {
        self.last_state.set(None);
    }

    fn is_connected(&self) -> bool {
        let ip = Self::route_ip();
        let connected = ip.is_some();
        if self.last_state.get() != Some(connected) {
            self.last_state.set(Some(connected));
            match ip {
                Some(ip) => {
                    self.emit(LinkEvent::Connected);
                    self.emit(LinkEvent::GotIp(ip));
                }
                None => self.emit(LinkEvent::Disconnected {
                    reason: REASON_BEACON_LOST,
                }),
            }
        }
        connected
    }

    fn scan(&mut self) -> Vec<ScanEntry> {
        if !self.scan_notice_logged {
            self.scan_notice_logged = true;
            log_debug!("Host radio cannot scan; diagnostics and fingerprint are unavailable");
        }
        Vec::new()
    }

    /// Wait for the host to come online, standing in for a person at the portal.
    fn open_portal(&mut self, request: &PortalRequest) -> bool {
        log_indented!(
            "Waiting up to {} for the host network",
            format_duration(request.timeout)
        );
        let deadline = Deadline::after(request.timeout, self.clock.now_ms());
        let poll = Duration::from_millis(CONNECTION_POLL_MS * 4);
        loop {
            if self.is_connected() {
                self.remember_network();
                return true;
            }
            if deadline.is_expired(self.clock.now_ms()) {
                return false;
            }
            self.clock.sleep(poll);
        }
    }

    fn reset_settings(&mut self) -> Result<()> {
        self.store.remove(NS_CREDENTIALS, KEY_SSID)
    }

    fn current_ssid(&self) -> Option<String> {
        if self.last_state.get() == Some(true) {
            Some(HOST_NETWORK_NAME.to_string())
        } else {
            None
        }
    }

    fn subscribe(&mut self, observer: LinkObserver) {
        self.observers.push(observer);
    }
}
