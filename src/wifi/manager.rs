//! Scenario-driven connection state machine.
//!
//! The decision logic is the pure [`transition`] function over
//! [`ConnectState`] and [`ConnectEvent`]. [`ConnectivityManager`] performs the
//! effects (radio calls, scans, waits) and feeds their results back in as
//! events, so every policy path can be tested without a radio.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use super::diagnostics::diagnose;
use super::fingerprint::{FingerprintStore, LocationMatch};
use super::health::{HealthAction, HealthMonitor};
use super::link::LinkStatus;
use super::{PortalRequest, WifiRadio};
use crate::clock::{Deadline, SharedClock};
use crate::common::constants::*;
use crate::common::utils::format_duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionScenario {
    /// No stored credentials.
    FirstSetup,
    /// Stored credentials, outage assumed to be a rebooting router.
    RouterReboot,
    /// Stored credentials, generic fixed-count retry policy.
    HasCredentials,
    /// Stored credentials belong to a network that is no longer around.
    NewLocation,
}

impl fmt::Display for ConnectionScenario {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ConnectionScenario::FirstSetup => "first setup",
            ConnectionScenario::RouterReboot => "router reboot",
            ConnectionScenario::HasCredentials => "stored credentials",
            ConnectionScenario::NewLocation => "new location",
        };
        write!(f, "{name}")
    }
}

/// Which retry policy applies when credentials are present.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CredentialsScenario {
    #[default]
    RouterReboot,
    HasCredentials,
}

impl From<CredentialsScenario> for ConnectionScenario {
    fn from(value: CredentialsScenario) -> Self {
        match value {
            CredentialsScenario::RouterReboot => ConnectionScenario::RouterReboot,
            CredentialsScenario::HasCredentials => ConnectionScenario::HasCredentials,
        }
    }
}

/// `min(base * 2^(attempt - 1), cap)`, with attempts counted from 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Backoff {
    pub base: Duration,
    pub cap: Duration,
}

impl Backoff {
    pub fn new(base_secs: u64, cap_secs: u64) -> Self {
        Self {
            base: Duration::from_secs(base_secs),
            cap: Duration::from_secs(cap_secs),
        }
    }

    pub fn delay(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(31);
        self.base
            .checked_mul(1_u32 << exponent)
            .unwrap_or(self.cap)
            .min(self.cap)
    }
}

/// Numeric policy for every scenario.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    pub credentials_scenario: CredentialsScenario,
    pub first_setup_attempt_timeout: Duration,
    pub first_setup_portal_timeout: Duration,
    pub router_reboot_window: Duration,
    pub connect_timeout: Backoff,
    pub retry_delay: Backoff,
    pub has_credentials_max_attempts: u32,
    pub weak_signal_threshold: i32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            credentials_scenario: CredentialsScenario::RouterReboot,
            first_setup_attempt_timeout: Duration::from_secs(DEFAULT_CONNECT_ATTEMPT_TIMEOUT_SECS),
            first_setup_portal_timeout: Duration::from_secs(DEFAULT_FIRST_SETUP_PORTAL_TIMEOUT_SECS),
            router_reboot_window: Duration::from_secs(DEFAULT_ROUTER_REBOOT_WINDOW_SECS),
            connect_timeout: Backoff::new(
                DEFAULT_CONNECT_TIMEOUT_BASE_SECS,
                DEFAULT_CONNECT_TIMEOUT_CAP_SECS,
            ),
            retry_delay: Backoff::new(DEFAULT_RETRY_DELAY_BASE_SECS, DEFAULT_RETRY_DELAY_CAP_SECS),
            has_credentials_max_attempts: DEFAULT_HAS_CREDENTIALS_MAX_ATTEMPTS,
            weak_signal_threshold: DEFAULT_WEAK_SIGNAL_THRESHOLD_DBM,
        }
    }
}

/// Access point name and password of the setup portal.
#[derive(Debug, Clone, PartialEq)]
pub struct PortalSettings {
    pub ssid: String,
    pub password: String,
}

impl Default for PortalSettings {
    fn default() -> Self {
        Self {
            ssid: DEFAULT_PORTAL_SSID.to_string(),
            password: DEFAULT_PORTAL_PASSWORD.to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PortalTimeout {
    Bounded(Duration),
    Indefinite,
}

impl PortalTimeout {
    pub fn as_option(&self) -> Option<Duration> {
        match self {
            PortalTimeout::Bounded(duration) => Some(*duration),
            PortalTimeout::Indefinite => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ConnectState {
    Initial,
    Attempting {
        scenario: ConnectionScenario,
        attempt: u32,
    },
    WaitingRetry {
        scenario: ConnectionScenario,
        /// The attempt that runs after the delay.
        next_attempt: u32,
        delay: Duration,
    },
    Portal {
        scenario: ConnectionScenario,
        timeout: PortalTimeout,
    },
    Connected,
    /// The indefinite portal closed without a connection.
    GaveUp,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ConnectEvent {
    CredentialsChecked { has_credentials: bool },
    AttemptSucceeded,
    /// `elapsed` is measured from the start of the scenario.
    AttemptFailed { relocated: bool, elapsed: Duration },
    RetryDelayElapsed,
    PortalConnected,
    PortalClosed,
}

/// Next state for `event` in `state`. Events that do not apply leave the
/// state unchanged.
pub fn transition(state: &ConnectState, event: &ConnectEvent, policy: &RetryPolicy) -> ConnectState {
    use ConnectEvent as E;
    use ConnectState as S;
    use ConnectionScenario as C;

    match (state, event) {
        (S::Initial, E::CredentialsChecked { has_credentials }) => S::Attempting {
            scenario: if *has_credentials {
                policy.credentials_scenario.into()
            } else {
                C::FirstSetup
            },
            attempt: 1,
        },

        (S::Attempting { .. }, E::AttemptSucceeded) => S::Connected,

        (S::Attempting { scenario: C::FirstSetup, .. }, E::AttemptFailed { .. }) => S::Portal {
            scenario: C::FirstSetup,
            timeout: PortalTimeout::Bounded(policy.first_setup_portal_timeout),
        },

        (S::Attempting { .. }, E::AttemptFailed { relocated: true, .. }) => S::Portal {
            scenario: C::NewLocation,
            timeout: PortalTimeout::Bounded(policy.first_setup_portal_timeout),
        },

        (S::Attempting { scenario: C::RouterReboot, attempt }, E::AttemptFailed { elapsed, .. }) => {
            if *elapsed >= policy.router_reboot_window {
                S::Portal {
                    scenario: C::RouterReboot,
                    timeout: PortalTimeout::Indefinite,
                }
            } else {
                let remaining = policy.router_reboot_window - *elapsed;
                S::WaitingRetry {
                    scenario: C::RouterReboot,
                    next_attempt: attempt + 1,
                    delay: policy.retry_delay.delay(*attempt).min(remaining),
                }
            }
        }

        (S::Attempting { scenario, attempt }, E::AttemptFailed { .. }) => {
            if *attempt >= policy.has_credentials_max_attempts {
                S::Portal {
                    scenario: *scenario,
                    timeout: PortalTimeout::Indefinite,
                }
            } else {
                S::WaitingRetry {
                    scenario: *scenario,
                    next_attempt: attempt + 1,
                    delay: policy.retry_delay.delay(*attempt),
                }
            }
        }

        (
            S::WaitingRetry {
                scenario,
                next_attempt,
                ..
            },
            E::RetryDelayElapsed,
        ) => S::Attempting {
            scenario: *scenario,
            attempt: *next_attempt,
        },

        (S::Portal { .. }, E::PortalConnected) => S::Connected,

        (
            S::Portal {
                scenario,
                timeout: PortalTimeout::Bounded(_),
            },
            E::PortalClosed,
        ) => S::Portal {
            scenario: *scenario,
            timeout: PortalTimeout::Indefinite,
        },

        (
            S::Portal {
                timeout: PortalTimeout::Indefinite,
                ..
            },
            E::PortalClosed,
        ) => S::GaveUp,

        (current, _) => current.clone(),
    }
}

/// Time budget for one attempt. Router-reboot attempts never run past the window.
pub fn attempt_timeout(
    scenario: ConnectionScenario,
    attempt: u32,
    elapsed: Duration,
    policy: &RetryPolicy,
) -> Duration {
    match scenario {
        ConnectionScenario::FirstSetup => policy.first_setup_attempt_timeout,
        ConnectionScenario::RouterReboot => policy
            .connect_timeout
            .delay(attempt)
            .min(policy.router_reboot_window.saturating_sub(elapsed)),
        ConnectionScenario::HasCredentials | ConnectionScenario::NewLocation => {
            policy.connect_timeout.delay(attempt)
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectOutcome {
    Connected,
    /// Every path was exhausted and the final portal closed. The caller restarts.
    PortalOpened,
}

/// Drives the state machine against a real (or simulated) radio.
pub struct ConnectivityManager {
    radio: Box<dyn WifiRadio>,
    fingerprint: FingerprintStore,
    link: Arc<LinkStatus>,
    clock: SharedClock,
    policy: RetryPolicy,
    portal: PortalSettings,
    health: HealthMonitor,
    state: ConnectState,
    scenario: Option<ConnectionScenario>,
    portal_sessions: u32,
}

impl ConnectivityManager {
    pub fn new(
        mut radio: Box<dyn WifiRadio>,
        fingerprint: FingerprintStore,
        clock: SharedClock,
        policy: RetryPolicy,
        portal: PortalSettings,
    ) -> Self {
        let link = LinkStatus::new(clock.clone());
        radio.subscribe(link.observer());
        let health = HealthMonitor::new(
            Duration::from_secs(DEFAULT_HEALTH_RECONNECT_INTERVAL_SECS),
            DEFAULT_HEALTH_MAX_RECONNECTS,
            clock.now_ms(),
        );
        Self {
            radio,
            fingerprint,
            link,
            clock,
            policy,
            portal,
            health,
            state: ConnectState::Initial,
            scenario: None,
            portal_sessions: 0,
        }
    }

    pub fn with_health(mut self, reconnect_interval: Duration, max_reconnects: u32) -> Self {
        self.health = HealthMonitor::new(reconnect_interval, max_reconnects, self.clock.now_ms());
        self
    }

    /// Run the scenario machine until connected or every path is exhausted.
    pub fn connect(&mut self) -> ConnectOutcome {
        self.state = ConnectState::Initial;
        let started = self.clock.now_ms();

        loop {
            let event = match self.state.clone() {
                ConnectState::Initial => {
                    let stored = self.radio.stored_ssid();
                    match &stored {
                        Some(ssid) => log_block_start!("Stored credentials found for '{}'", ssid),
                        None => log_block_start!("No stored credentials"),
                    }
                    ConnectEvent::CredentialsChecked {
                        has_credentials: stored.is_some(),
                    }
                }
                ConnectState::Attempting { scenario, attempt } => {
                    if self.scenario != Some(scenario) {
                        log_decorated!("Connection scenario: {}", scenario);
                        self.scenario = Some(scenario);
                    }
                    let elapsed = self.elapsed_since(started);
                    let timeout = attempt_timeout(scenario, attempt, elapsed, &self.policy);
                    log_decorated!(
                        "Attempt {} (timeout {})",
                        attempt,
                        format_duration(Some(timeout))
                    );

                    if self.run_attempt(attempt, timeout) {
                        ConnectEvent::AttemptSucceeded
                    } else {
                        let relocated = self.diagnose_failure(scenario);
                        ConnectEvent::AttemptFailed {
                            relocated,
                            elapsed: self.elapsed_since(started),
                        }
                    }
                }
                ConnectState::WaitingRetry { delay, .. } => {
                    log_indented!("Retrying in {}", format_duration(Some(delay)));
                    self.clock.sleep(delay);
                    ConnectEvent::RetryDelayElapsed
                }
                ConnectState::Portal { scenario, timeout } => {
                    self.scenario = Some(scenario);
                    if self.run_portal(timeout) {
                        ConnectEvent::PortalConnected
                    } else {
                        ConnectEvent::PortalClosed
                    }
                }
                ConnectState::Connected => {
                    self.on_connected();
                    return ConnectOutcome::Connected;
                }
                ConnectState::GaveUp => {
                    log_error!("Setup portal closed without a connection");
                    return ConnectOutcome::PortalOpened;
                }
            };

            let next = transition(&self.state, &event, &self.policy);
            if let ConnectState::Portal {
                scenario: ConnectionScenario::NewLocation,
                ..
            } = next
                && !matches!(self.state, ConnectState::Portal { .. })
            {
                log_warning!("Relocation detected, skipping remaining retries");
            }
            self.state = next;
        }
    }

    fn elapsed_since(&self, started_ms: u64) -> Duration {
        Duration::from_millis(self.clock.now_ms().saturating_sub(started_ms))
    }

    fn run_attempt(&mut self, attempt: u32, timeout: Duration) -> bool {
        if attempt == 1 {
            self.radio.begin();
        } else {
            self.radio.reconnect();
        }

        let poll = Duration::from_millis(CONNECTION_POLL_MS);
        let deadline = Deadline::after(Some(timeout), self.clock.now_ms());
        loop {
            if self.radio.is_connected() {
                return true;
            }
            let now = self.clock.now_ms();
            if deadline.is_expired(now) {
                return false;
            }
            let wait = deadline.remaining(now).map_or(poll, |r| r.min(poll));
            self.clock.sleep(wait);
        }
    }

    /// Record why the attempt failed, then check for relocation using the same scan.
    /// Returns true when the lamp appears to have moved.
    fn diagnose_failure(&mut self, scenario: ConnectionScenario) -> bool {
        let scan = self.radio.scan();
        let target = self.radio.stored_ssid();
        let error = diagnose(
            &scan,
            target.as_deref(),
            self.link.last_reason(),
            self.policy.weak_signal_threshold,
        );
        log_warning!("{}", error);
        if !error.is_retryable() {
            log_indented!("Retrying will not fix this, the portal will ask for new settings");
        }
        self.link.set_error(error.banner());

        if scenario == ConnectionScenario::FirstSetup {
            return false;
        }
        match self.fingerprint.check(&scan) {
            LocationMatch::Moved => {
                self.link.set_error(crate::error::LinkError::RelocationDetected.banner());
                true
            }
            LocationMatch::ScanFailed => {
                log_debug!("Scan returned nothing, assuming same location");
                false
            }
            LocationMatch::Same | LocationMatch::Unknown => false,
        }
    }

    fn run_portal(&mut self, timeout: PortalTimeout) -> bool {
        let request = PortalRequest {
            ssid: self.portal.ssid.clone(),
            password: self.portal.password.clone(),
            timeout: timeout.as_option(),
            error_banner: self.link.last_error(),
        };
        self.portal_sessions += 1;
        log_block_start!(
            "Opening setup portal '{}' ({})",
            request.ssid,
            format_duration(request.timeout)
        );
        if let Some(banner) = &request.error_banner {
            log_indented!("Banner: {}", banner);
        }
        let connected = self.radio.open_portal(&request);
        if !connected {
            log_decorated!("Portal closed without a connection");
        }
        connected
    }

    fn on_connected(&mut self) {
        self.link.clear_error();
        let ssid = self.radio.current_ssid();
        log_block_start!(
            "Connected to '{}'",
            ssid.as_deref().unwrap_or("unknown network")
        );
        if let Some(ip) = self.link.ip() {
            log_indented!("Address: {}", ip);
        }
        if let Err(e) = self.fingerprint.refresh(self.radio.as_mut(), ssid.as_deref()) {
            log_warning!("Could not save location fingerprint: {}", e);
        }
        self.health.reset(self.clock.now_ms());
    }

    /// Supervise the link between fetches. Issues plain reconnects while down.
    pub fn check_health(&mut self) -> HealthAction {
        let action = self
            .health
            .poll(self.radio.is_connected(), self.clock.now_ms());
        match action {
            HealthAction::Reconnecting { attempt } => {
                log_decorated!("Link down, reconnect attempt {}", attempt);
                self.radio.reconnect();
            }
            HealthAction::JustReconnected => {
                log_decorated!("Link restored");
                self.link.clear_error();
            }
            HealthAction::Exhausted => {
                log_warning!("Reconnects exhausted, restarting connection scenario");
            }
            HealthAction::Healthy | HealthAction::Waiting => {}
        }
        action
    }

    /// Forget credentials and the fingerprint (reset button).
    pub fn wipe_credentials(&mut self) -> Result<()> {
        self.radio.disconnect();
        self.radio.reset_settings()?;
        self.fingerprint.clear()?;
        self.link.clear_error();
        Ok(())
    }

    pub fn is_connected(&self) -> bool {
        self.radio.is_connected()
    }

    pub fn state(&self) -> &ConnectState {
        &self.state
    }

    pub fn scenario(&self) -> Option<ConnectionScenario> {
        self.scenario
    }

    pub fn last_error(&self) -> Option<String> {
        self.link.last_error()
    }

    pub fn portal_sessions(&self) -> u32 {
        self.portal_sessions
    }

    pub fn fingerprint(&self) -> &FingerprintStore {
        &self.fingerprint
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn policy() -> RetryPolicy {
        RetryPolicy::default()
    }

    fn attempting(scenario: ConnectionScenario, attempt: u32) -> ConnectState {
        ConnectState::Attempting { scenario, attempt }
    }

    fn failed(secs: u64) -> ConnectEvent {
        ConnectEvent::AttemptFailed {
            relocated: false,
            elapsed: Duration::from_secs(secs),
        }
    }

    #[test]
    fn test_backoff_values() {
        let backoff = Backoff::new(5, 60);
        let delays: Vec<u64> = (1..=6).map(|n| backoff.delay(n).as_secs()).collect();
        assert_eq!(delays, [5, 10, 20, 40, 60, 60]);
        assert_eq!(backoff.delay(200), Duration::from_secs(60));
    }

    #[test]
    fn test_scenario_detection() {
        let next = transition(
            &ConnectState::Initial,
            &ConnectEvent::CredentialsChecked {
                has_credentials: false,
            },
            &policy(),
        );
        assert_eq!(next, attempting(ConnectionScenario::FirstSetup, 1));

        let next = transition(
            &ConnectState::Initial,
            &ConnectEvent::CredentialsChecked {
                has_credentials: true,
            },
            &policy(),
        );
        assert_eq!(next, attempting(ConnectionScenario::RouterReboot, 1));

        let mut configured = policy();
        configured.credentials_scenario = CredentialsScenario::HasCredentials;
        let next = transition(
            &ConnectState::Initial,
            &ConnectEvent::CredentialsChecked {
                has_credentials: true,
            },
            &configured,
        );
        assert_eq!(next, attempting(ConnectionScenario::HasCredentials, 1));
    }

    #[test]
    fn test_first_setup_failure_opens_bounded_portal() {
        let next = transition(
            &attempting(ConnectionScenario::FirstSetup, 1),
            &failed(10),
            &policy(),
        );
        assert_eq!(
            next,
            ConnectState::Portal {
                scenario: ConnectionScenario::FirstSetup,
                timeout: PortalTimeout::Bounded(Duration::from_secs(1020)),
            }
        );
    }

    #[test]
    fn test_bounded_portal_escalates_then_gives_up() {
        let bounded = ConnectState::Portal {
            scenario: ConnectionScenario::FirstSetup,
            timeout: PortalTimeout::Bounded(Duration::from_secs(1020)),
        };
        let next = transition(&bounded, &ConnectEvent::PortalClosed, &policy());
        assert_eq!(
            next,
            ConnectState::Portal {
                scenario: ConnectionScenario::FirstSetup,
                timeout: PortalTimeout::Indefinite,
            }
        );
        assert_eq!(
            transition(&next, &ConnectEvent::PortalClosed, &policy()),
            ConnectState::GaveUp
        );
        assert_eq!(
            transition(&next, &ConnectEvent::PortalConnected, &policy()),
            ConnectState::Connected
        );
    }

    #[test]
    fn test_router_reboot_waits_within_window() {
        let next = transition(
            &attempting(ConnectionScenario::RouterReboot, 2),
            &failed(60),
            &policy(),
        );
        assert_eq!(
            next,
            ConnectState::WaitingRetry {
                scenario: ConnectionScenario::RouterReboot,
                next_attempt: 3,
                delay: Duration::from_secs(10),
            }
        );
    }

    #[test]
    fn test_router_reboot_delay_clipped_to_window() {
        let next = transition(
            &attempting(ConnectionScenario::RouterReboot, 4),
            &failed(295),
            &policy(),
        );
        assert_eq!(
            next,
            ConnectState::WaitingRetry {
                scenario: ConnectionScenario::RouterReboot,
                next_attempt: 5,
                delay: Duration::from_secs(5),
            }
        );
    }

    #[test]
    fn test_router_reboot_window_exhaustion_opens_indefinite_portal() {
        let next = transition(
            &attempting(ConnectionScenario::RouterReboot, 5),
            &failed(300),
            &policy(),
        );
        assert_eq!(
            next,
            ConnectState::Portal {
                scenario: ConnectionScenario::RouterReboot,
                timeout: PortalTimeout::Indefinite,
            }
        );
    }

    #[test]
    fn test_relocation_short_circuits_retries() {
        let next = transition(
            &attempting(ConnectionScenario::RouterReboot, 1),
            &ConnectEvent::AttemptFailed {
                relocated: true,
                elapsed: Duration::from_secs(20),
            },
            &policy(),
        );
        assert!(matches!(
            next,
            ConnectState::Portal {
                scenario: ConnectionScenario::NewLocation,
                ..
            }
        ));
    }

    #[test]
    fn test_has_credentials_counts_attempts() {
        let mut configured = policy();
        configured.has_credentials_max_attempts = 3;
        let next = transition(
            &attempting(ConnectionScenario::HasCredentials, 2),
            &failed(1000),
            &configured,
        );
        assert!(matches!(
            next,
            ConnectState::WaitingRetry { next_attempt: 3, .. }
        ));
        let next = transition(
            &attempting(ConnectionScenario::HasCredentials, 3),
            &failed(1000),
            &configured,
        );
        assert_eq!(
            next,
            ConnectState::Portal {
                scenario: ConnectionScenario::HasCredentials,
                timeout: PortalTimeout::Indefinite,
            }
        );
    }

    #[test]
    fn test_irrelevant_events_keep_state() {
        let state = ConnectState::Connected;
        assert_eq!(
            transition(&state, &ConnectEvent::RetryDelayElapsed, &policy()),
            state
        );
    }

    #[test]
    fn test_router_reboot_attempt_timeout_respects_window() {
        let p = policy();
        assert_eq!(
            attempt_timeout(ConnectionScenario::RouterReboot, 1, Duration::ZERO, &p),
            Duration::from_secs(20)
        );
        assert_eq!(
            attempt_timeout(ConnectionScenario::RouterReboot, 5, Duration::from_secs(255), &p),
            Duration::from_secs(45)
        );
        assert_eq!(
            attempt_timeout(ConnectionScenario::FirstSetup, 1, Duration::ZERO, &p),
            Duration::from_secs(10)
        );
    }

    proptest! {
        #[test]
        fn prop_backoff_monotonic_and_capped(base in 1u64..120, cap_extra in 0u64..600, n in 1u32..64) {
            let backoff = Backoff::new(base, base + cap_extra);
            let current = backoff.delay(n);
            let next = backoff.delay(n + 1);
            prop_assert!(current <= next);
            prop_assert!(next <= backoff.cap);
            prop_assert!(backoff.delay(1) == backoff.base.min(backoff.cap));
        }
    }
}
