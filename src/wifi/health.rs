//! Steady-state link supervision once the initial connection succeeded.

use std::time::Duration;

use crate::clock::Interval;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HealthAction {
    /// Link is up.
    Healthy,
    /// Link is down; next reconnect is not due yet.
    Waiting,
    /// Issue a plain reconnect now. `attempt` counts from 1.
    Reconnecting { attempt: u32 },
    /// Link came back after being lost. Callers settle before fetching.
    JustReconnected,
    /// Reconnects exhausted; run the full connection scenario again.
    Exhausted,
}

pub struct HealthMonitor {
    interval: Interval,
    max_reconnects: u32,
    failures: u32,
    was_connected: bool,
}

impl HealthMonitor {
    pub fn new(reconnect_interval: Duration, max_reconnects: u32, now_ms: u64) -> Self {
        Self {
            interval: Interval::new(reconnect_interval, now_ms),
            max_reconnects,
            failures: 0,
            was_connected: true,
        }
    }

    pub fn poll(&mut self, connected: bool, now_ms: u64) -> HealthAction {
        if connected {
            let recovered = !self.was_connected;
            self.was_connected = true;
            self.failures = 0;
            return if recovered {
                HealthAction::JustReconnected
            } else {
                HealthAction::Healthy
            };
        }

        if self.was_connected {
            self.was_connected = false;
            self.interval.reset(now_ms);
            return HealthAction::Waiting;
        }

        if !self.interval.poll(now_ms) {
            return HealthAction::Waiting;
        }

        self.failures += 1;
        if self.failures > self.max_reconnects {
            self.failures = 0;
            HealthAction::Exhausted
        } else {
            HealthAction::Reconnecting {
                attempt: self.failures,
            }
        }
    }

    /// Forget failures after a full reconnection scenario.
    pub fn reset(&mut self, now_ms: u64) {
        self.failures = 0;
        self.was_connected = true;
        self.interval.reset(now_ms);
    }
}
