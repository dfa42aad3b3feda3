use lamplink::clock::{Clock, SharedClock, SimulatedClock};
use lamplink::common::constants::test_constants::*;
use lamplink::logger::Log;
use lamplink::storage::{MemoryStore, SharedStore};
use lamplink::wifi::manager::{CredentialsScenario, PortalSettings};
use lamplink::wifi::sim::{PortalBehavior, SimEnvironment};
use lamplink::wifi::{
    ConnectOutcome, ConnectionScenario, ConnectivityManager, FingerprintStore, RetryPolicy,
    ScanEntry,
};
use std::sync::Arc;
use std::time::Duration;

struct Rig {
    clock: Arc<SimulatedClock>,
    env: SimEnvironment,
    store: SharedStore,
}

impl Rig {
    fn at_home() -> Self {
        Log::set_enabled(false);
        let clock = SimulatedClock::shared();
        let env = SimEnvironment::at_home(clock.clone(), TEST_HOME_SSID, &TEST_NEIGHBORS);
        Self {
            clock,
            env,
            store: Arc::new(MemoryStore::new()),
        }
    }

    fn unconfigured() -> Self {
        let rig = Self::at_home();
        rig.env.set_stored_ssid(None);
        rig
    }

    /// Store a fingerprint of the home neighbourhood, as after an earlier connection.
    fn remember_home(&self) {
        let scan: Vec<ScanEntry> = TEST_NEIGHBORS
            .iter()
            .map(|name| ScanEntry::new(name, -70))
            .collect();
        let mut fingerprint = FingerprintStore::load(self.store.clone()).unwrap();
        fingerprint
            .refresh_from_scan(&scan, Some(TEST_HOME_SSID))
            .unwrap();
    }

    fn manager(&self, policy: RetryPolicy) -> ConnectivityManager {
        let clock: SharedClock = self.clock.clone();
        ConnectivityManager::new(
            Box::new(self.env.radio()),
            FingerprintStore::load(self.store.clone()).unwrap(),
            clock,
            policy,
            PortalSettings::default(),
        )
    }
}

#[test]
fn test_first_setup_opens_one_bounded_portal_then_waits_indefinitely() {
    let rig = Rig::unconfigured();
    let policy = RetryPolicy::default();
    let mut manager = rig.manager(policy.clone());

    assert_eq!(manager.connect(), ConnectOutcome::PortalOpened);

    assert_eq!(rig.env.begin_calls(), 1);
    assert_eq!(rig.env.reconnect_calls(), 0);

    let portals = rig.env.portal_log();
    assert_eq!(portals.len(), 2);
    assert_eq!(portals[0].request.timeout, Some(policy.first_setup_portal_timeout));
    assert_eq!(portals[0].opened_at_ms, policy.first_setup_attempt_timeout.as_millis() as u64);
    assert_eq!(portals[1].request.timeout, None);
    assert_eq!(rig.env.max_concurrent_portals(), 1);
}

#[test]
fn test_first_setup_portal_configures_the_lamp() {
    let rig = Rig::unconfigured();
    rig.env.set_portal_behavior(PortalBehavior::Join {
        ssid: TEST_HOME_SSID.to_string(),
    });
    let mut manager = rig.manager(RetryPolicy::default());

    assert_eq!(manager.connect(), ConnectOutcome::Connected);
    assert_eq!(rig.env.portal_log().len(), 1);
    assert_eq!(rig.env.stored_ssid().as_deref(), Some(TEST_HOME_SSID));

    // Connecting captures the neighbourhood, never the target itself.
    let neighbors = manager.fingerprint().fingerprint().neighbors().to_vec();
    assert!(!neighbors.is_empty());
    assert!(!neighbors.iter().any(|n| n == TEST_HOME_SSID));
    assert_eq!(manager.last_error(), None);
}

#[test]
fn test_router_reboot_retries_for_the_whole_window_before_portal() {
    let rig = Rig::at_home();
    rig.remember_home();
    rig.env.set_router_up(false);
    let policy = RetryPolicy::default();
    let mut manager = rig.manager(policy.clone());

    assert_eq!(manager.connect(), ConnectOutcome::PortalOpened);
    assert_eq!(manager.scenario(), Some(ConnectionScenario::RouterReboot));

    // Attempts end at 20s, 65s, 135s, 215s and 300s with growing delays between them.
    assert_eq!(rig.env.begin_calls(), 1);
    assert_eq!(rig.env.reconnect_calls(), 4);

    let portals = rig.env.portal_log();
    assert_eq!(portals.len(), 1);
    assert_eq!(
        portals[0].opened_at_ms,
        policy.router_reboot_window.as_millis() as u64
    );
    assert_eq!(portals[0].request.timeout, None);
    assert!(portals[0].request.error_banner.is_some());
}

#[test]
fn test_router_back_within_window_avoids_portal() {
    let rig = Rig::at_home();
    rig.remember_home();
    rig.env.router_up_at(90_000);
    let mut manager = rig.manager(RetryPolicy::default());

    assert_eq!(manager.connect(), ConnectOutcome::Connected);
    assert!(rig.env.portal_log().is_empty());
    assert!(rig.clock.now_ms() >= 90_000);
    assert!(rig.clock.now_ms() < 300_000);
    assert!(rig.env.is_connected());
}

#[test]
fn test_relocation_skips_retries_and_opens_new_location_portal() {
    let rig = Rig::at_home();
    rig.remember_home();
    rig.env.set_visible(
        TEST_FOREIGN_NETWORKS
            .iter()
            .map(|name| ScanEntry::new(name, -60))
            .collect(),
    );
    rig.env.set_portal_behavior(PortalBehavior::Join {
        ssid: TEST_FOREIGN_NETWORKS[0].to_string(),
    });
    let policy = RetryPolicy::default();
    let mut manager = rig.manager(policy.clone());

    assert_eq!(manager.connect(), ConnectOutcome::Connected);
    assert_eq!(manager.scenario(), Some(ConnectionScenario::NewLocation));
    assert_eq!(rig.env.reconnect_calls(), 0);

    let portals = rig.env.portal_log();
    assert_eq!(portals.len(), 1);
    assert_eq!(portals[0].request.timeout, Some(policy.first_setup_portal_timeout));
    assert_eq!(
        portals[0].opened_at_ms,
        policy.connect_timeout.delay(1).as_millis() as u64
    );

    // The new neighbourhood replaces the old fingerprint.
    let neighbors = manager.fingerprint().fingerprint().neighbors().to_vec();
    assert!(neighbors.iter().all(|n| TEST_FOREIGN_NETWORKS[1..].contains(&n.as_str())));
}

#[test]
fn test_failed_scan_is_not_mistaken_for_relocation() {
    let rig = Rig::at_home();
    rig.remember_home();
    rig.env.set_router_up(false);
    rig.env.set_scan_fails(true);
    let mut manager = rig.manager(RetryPolicy::default());

    assert_eq!(manager.connect(), ConnectOutcome::PortalOpened);
    assert_eq!(manager.scenario(), Some(ConnectionScenario::RouterReboot));
    assert_eq!(rig.env.reconnect_calls(), 4);
}

#[test]
fn test_has_credentials_policy_gives_up_after_max_attempts() {
    let rig = Rig::at_home();
    rig.env.set_credentials_valid(false);
    let policy = RetryPolicy {
        credentials_scenario: CredentialsScenario::HasCredentials,
        has_credentials_max_attempts: 3,
        ..RetryPolicy::default()
    };
    let mut manager = rig.manager(policy);

    assert_eq!(manager.connect(), ConnectOutcome::PortalOpened);
    assert_eq!(manager.scenario(), Some(ConnectionScenario::HasCredentials));
    assert_eq!(rig.env.begin_calls() + rig.env.reconnect_calls(), 3);

    let portals = rig.env.portal_log();
    assert_eq!(portals.len(), 1);
    assert_eq!(portals[0].request.timeout, None);
}

#[test]
fn test_wrong_password_banner_asks_for_action() {
    let rig = Rig::at_home();
    rig.env.set_credentials_valid(false);
    rig.env.set_failure_reason(15);
    let policy = RetryPolicy {
        credentials_scenario: CredentialsScenario::HasCredentials,
        has_credentials_max_attempts: 2,
        ..RetryPolicy::default()
    };
    let mut manager = rig.manager(policy);

    assert_eq!(manager.connect(), ConnectOutcome::PortalOpened);
    let portals = rig.env.portal_log();
    assert_eq!(
        portals[0].request.error_banner.as_deref(),
        Some("Action needed: Wrong WiFi password")
    );
}

#[test]
fn test_router_outage_banner_is_plain() {
    let rig = Rig::at_home();
    rig.remember_home();
    rig.env.set_router_up(false);
    let mut manager = rig.manager(RetryPolicy::default());

    assert_eq!(manager.connect(), ConnectOutcome::PortalOpened);
    let banner = rig.env.portal_log()[0].request.error_banner.clone().unwrap();
    assert!(!banner.starts_with("Action needed"), "{banner}");
}

#[test]
fn test_repeated_scenarios_never_overlap_portals() {
    let rig = Rig::unconfigured();
    let mut manager = rig.manager(RetryPolicy::default());

    for _ in 0..3 {
        assert_eq!(manager.connect(), ConnectOutcome::PortalOpened);
    }
    assert_eq!(rig.env.portal_log().len(), 6);
    assert_eq!(rig.env.max_concurrent_portals(), 1);
    assert_eq!(manager.portal_sessions(), 6);
}

#[test]
fn test_health_reconnects_after_link_drop() {
    let rig = Rig::at_home();
    let mut manager = rig
        .manager(RetryPolicy::default())
        .with_health(Duration::from_secs(10), 3);
    assert_eq!(manager.connect(), ConnectOutcome::Connected);

    rig.env.set_router_up(false);
    // First poll notices the drop, then one reconnect per interval.
    manager.check_health();
    for _ in 0..3 {
        rig.clock.advance(Duration::from_secs(10));
        manager.check_health();
    }
    assert_eq!(rig.env.reconnect_calls(), 3);

    rig.env.set_router_up(true);
    rig.clock.advance(Duration::from_secs(10));
    manager.check_health();
    assert!(manager.is_connected());
}
