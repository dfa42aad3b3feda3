//! Scripted radio for tests and `--simulate` runs.
//!
//! A [`SimEnvironment`] is the world the radio lives in: which networks are
//! visible, whether the router is up, whether stored credentials work and what
//! a person does when the portal opens. Tests keep a clone of the environment
//! to change the world mid-run and to inspect what the radio was asked to do.

use anyhow::Result;
use std::sync::{Arc, Mutex, MutexGuard};

use super::reset::ResetButton;
use super::{LinkEvent, LinkObserver, PortalRequest, ScanEntry, WifiRadio};
use crate::clock::SharedClock;

const SIMULATED_IP: &str = "192.168.4.2";
/// Reason reported when the stored network cannot be reached.
const REASON_NO_AP_FOUND: u8 = 202;
const REASON_BEACON_LOST: u8 = 201;

/// What the person at the portal does.
#[derive(Debug, Clone, PartialEq)]
pub enum PortalBehavior {
    /// Nobody shows up; bounded sessions run out their timeout.
    TimeOut,
    /// Someone enters credentials for `ssid`.
    Join { ssid: String },
}

#[derive(Debug, Clone, PartialEq)]
pub struct PortalRecord {
    pub opened_at_ms: u64,
    pub request: PortalRequest,
}

struct SimState {
    visible: Vec<ScanEntry>,
    stored_ssid: Option<String>,
    credentials_valid: bool,
    router_up: bool,
    router_up_at_ms: Option<u64>,
    scan_fails: bool,
    failure_reason: Option<u8>,
    portal_behavior: PortalBehavior,
    portal_log: Vec<PortalRecord>,
    portal_active: bool,
    max_concurrent_portals: u32,
    begin_calls: u32,
    reconnect_calls: u32,
    connected: bool,
    joining: bool,
    button_pressed: bool,
}

impl SimState {
    fn router_available(&self, now_ms: u64) -> bool {
        self.router_up && self.router_up_at_ms.is_none_or(|at| now_ms >= at)
    }

    fn link_available(&self, now_ms: u64) -> bool {
        let Some(target) = &self.stored_ssid else {
            return false;
        };
        self.credentials_valid
            && self.router_available(now_ms)
            && self.visible.iter().any(|e| &e.ssid == target)
    }

    fn failure_code(&self, now_ms: u64) -> u8 {
        if let Some(code) = self.failure_reason {
            return code;
        }
        if self.router_available(now_ms) {
            REASON_NO_AP_FOUND
        } else {
            REASON_BEACON_LOST
        }
    }
}

/// Shared handle on the simulated world.
#[derive(Clone)]
pub struct SimEnvironment {
    state: Arc<Mutex<SimState>>,
    clock: SharedClock,
}

impl SimEnvironment {
    /// Empty world: nothing visible, no credentials, router up.
    pub fn new(clock: SharedClock) -> Self {
        Self {
            state: Arc::new(Mutex::new(SimState {
                visible: Vec::new(),
                stored_ssid: None,
                credentials_valid: true,
                router_up: true,
                router_up_at_ms: None,
                scan_fails: false,
                failure_reason: None,
                portal_behavior: PortalBehavior::TimeOut,
                portal_log: Vec::new(),
                portal_active: false,
                max_concurrent_portals: 0,
                begin_calls: 0,
                reconnect_calls: 0,
                connected: false,
                joining: false,
                button_pressed: false,
            })),
            clock,
        }
    }

    /// A configured lamp at home: stored credentials for `home` with `neighbors` around it.
    pub fn at_home(clock: SharedClock, home: &str, neighbors: &[&str]) -> Self {
        let env = Self::new(clock);
        let mut visible = vec![ScanEntry::new(home, -55)];
        visible.extend(
            neighbors
                .iter()
                .enumerate()
                .map(|(i, name)| ScanEntry::new(name, -60 - 5 * i as i32)),
        );
        env.set_visible(visible);
        env.set_stored_ssid(Some(home));
        env
    }

    fn lock(&self) -> MutexGuard<'_, SimState> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    pub fn radio(&self) -> SimulatedRadio {
        SimulatedRadio {
            env: self.clone(),
            observers: Vec::new(),
        }
    }

    pub fn button(&self) -> SimulatedButton {
        SimulatedButton { env: self.clone() }
    }

    pub fn set_visible(&self, visible: Vec<ScanEntry>) {
        self.lock().visible = visible;
    }

    pub fn set_stored_ssid(&self, ssid: Option<&str>) {
        self.lock().stored_ssid = ssid.map(str::to_string);
    }

    pub fn set_credentials_valid(&self, valid: bool) {
        self.lock().credentials_valid = valid;
    }

    pub fn set_router_up(&self, up: bool) {
        let mut state = self.lock();
        state.router_up = up;
        state.router_up_at_ms = None;
    }

    /// Router comes back at an absolute clock time.
    pub fn router_up_at(&self, at_ms: u64) {
        let mut state = self.lock();
        state.router_up = true;
        state.router_up_at_ms = Some(at_ms);
    }

    pub fn set_scan_fails(&self, fails: bool) {
        self.lock().scan_fails = fails;
    }

    /// Force the reason code reported on failed joins.
    pub fn set_failure_reason(&self, code: u8) {
        self.lock().failure_reason = Some(code);
    }

    pub fn set_portal_behavior(&self, behavior: PortalBehavior) {
        self.lock().portal_behavior = behavior;
    }

    pub fn press_button(&self, pressed: bool) {
        self.lock().button_pressed = pressed;
    }

    pub fn portal_log(&self) -> Vec<PortalRecord> {
        self.lock().portal_log.clone()
    }

    pub fn max_concurrent_portals(&self) -> u32 {
        self.lock().max_concurrent_portals
    }

    pub fn begin_calls(&self) -> u32 {
        self.lock().begin_calls
    }

    pub fn reconnect_calls(&self) -> u32 {
        self.lock().reconnect_calls
    }

    pub fn stored_ssid(&self) -> Option<String> {
        self.lock().stored_ssid.clone()
    }

    pub fn is_connected(&self) -> bool {
        self.lock().connected
    }
}

pub struct SimulatedRadio {
    env: SimEnvironment,
    observers: Vec<LinkObserver>,
}

impl SimulatedRadio {
    fn emit(&self, events: &[LinkEvent]) {
        for event in events {
            for observer in &self.observers {
                observer(event.clone());
            }
        }
    }

    fn join(&mut self, is_begin: bool) {
        let now = self.env.clock.now_ms();
        let events = {
            let mut state = self.env.lock();
            if is_begin {
                state.begin_calls += 1;
            } else {
                state.reconnect_calls += 1;
            }
            if state.link_available(now) {
                state.connected = true;
                state.joining = false;
                vec![
                    LinkEvent::Connected,
                    LinkEvent::GotIp(SIMULATED_IP.to_string()),
                ]
            } else {
                state.connected = false;
                state.joining = true;
                vec![LinkEvent::Disconnected {
                    reason: state.failure_code(now),
                }]
            }
        };
        self.emit(&events);
    }
}

impl WifiRadio for SimulatedRadio {
    fn stored_ssid(&self) -> Option<String> {
        self.env.lock().stored_ssid.clone()
    }

    fn begin(&mut self) {
        self.join(true);
    }

    fn reconnect(&mut self) {
        self.join(false);
    }

    fn disconnect(&mut self) {
        let mut state = self.env.lock();
        state.connected = false;
        state.joining = false;
    }

    fn is_connected(&self) -> bool {
        let now = self.env.clock.now_ms();
        let events = {
            let mut state = self.env.lock();
            let available = state.link_available(now);
            if state.connected && !available {
                state.connected = false;
                state.joining = true;
                vec![LinkEvent::Disconnected {
                    reason: state.failure_code(now),
                }]
            } else if !state.connected && state.joining && available {
                state.connected = true;
                state.joining = false;
                vec![
                    LinkEvent::Connected,
                    LinkEvent::GotIp(SIMULATED_IP.to_string()),
                ]
            } else {
                Vec::new()
            }
        };
        self.emit(&events);
        self.env.lock().connected
    }

    fn scan(&mut self) -> Vec<ScanEntry> {
        let now = self.env.clock.now_ms();
        let state = self.env.lock();
        if state.scan_fails {
            return Vec::new();
        }
        let router_available = state.router_available(now);
        state
            .visible
            .iter()
            .filter(|e| router_available || Some(&e.ssid) != state.stored_ssid.as_ref())
            .cloned()
            .collect()
    }

    fn open_portal(&mut self, request: &PortalRequest) -> bool {
        let now = self.env.clock.now_ms();
        let behavior = {
            let mut state = self.env.lock();
            let concurrent = if state.portal_active { 2 } else { 1 };
            state.max_concurrent_portals = state.max_concurrent_portals.max(concurrent);
            state.portal_active = true;
            state.portal_log.push(PortalRecord {
                opened_at_ms: now,
                request: request.clone(),
            });
            state.connected = false;
            state.joining = false;
            state.portal_behavior.clone()
        };

        let joined = match behavior {
            PortalBehavior::Join { ssid } => {
                let mut state = self.env.lock();
                if !state.visible.iter().any(|e| e.ssid == ssid) {
                    state.visible.push(ScanEntry::new(&ssid, -55));
                }
                state.stored_ssid = Some(ssid);
                state.credentials_valid = true;
                state.router_up = true;
                state.router_up_at_ms = None;
                state.connected = true;
                true
            }
            PortalBehavior::TimeOut => {
                if let Some(timeout) = request.timeout {
                    self.env.clock.sleep(timeout);
                }
                false
            }
        };

        self.env.lock().portal_active = false;
        if joined {
            self.emit(&[
                LinkEvent::Connected,
                LinkEvent::GotIp(SIMULATED_IP.to_string()),
            ]);
        }
        joined
    }

    fn reset_settings(&mut self) -> Result<()> {
        let mut state = self.env.lock();
        state.stored_ssid = None;
        state.connected = false;
        state.joining = false;
        Ok(())
    }

    fn current_ssid(&self) -> Option<String> {
        let state = self.env.lock();
        if state.connected {
            state.stored_ssid.clone()
        } else {
            None
        }
    }

    fn subscribe(&mut self, observer: LinkObserver) {
        self.observers.push(observer);
    }
}

pub struct SimulatedButton {
    env: SimEnvironment,
}

impl ResetButton for SimulatedButton {
    fn is_pressed(&mut self) -> bool {
        self.env.lock().button_pressed
    }
}
