use std::sync::{Arc, Mutex};

use super::reason::DisconnectReason;
use super::{LinkEvent, LinkObserver};
use crate::clock::SharedClock;
use crate::common::constants::DISCONNECT_LOG_INTERVAL_MS;

#[derive(Default)]
struct LinkInner {
    connected: bool,
    ip: Option<String>,
    last_reason: Option<DisconnectReason>,
    last_error: Option<String>,
    last_logged: Option<(DisconnectReason, u64)>,
}

/// Link state as reported by the radio's event stream.
///
/// Registered once with the radio as its observer. The manager reads the last
/// reason and error from here when diagnosing a failed attempt and when
/// building the portal banner.
pub struct LinkStatus {
    clock: SharedClock,
    inner: Mutex<LinkInner>,
}

impl LinkStatus {
    pub fn new(clock: SharedClock) -> Arc<Self> {
        Arc::new(Self {
            clock,
            inner: Mutex::new(LinkInner::default()),
        })
    }

    /// Observer closure to hand to `WifiRadio::subscribe`.
    pub fn observer(self: &Arc<Self>) -> LinkObserver {
        let status = Arc::clone(self);
        Box::new(move |event| status.handle(event))
    }

    pub fn handle(&self, event: LinkEvent) {
        let now = self.clock.now_ms();
        let Ok(mut inner) = self.inner.lock() else {
            return;
        };
        match event {
            LinkEvent::Connected => {
                inner.connected = true;
                inner.last_error = None;
                inner.last_logged = None;
                log_decorated!("WiFi link up");
            }
            LinkEvent::GotIp(ip) => {
                log_indented!("Address: {}", ip);
                inner.ip = Some(ip);
            }
            LinkEvent::Disconnected { reason } => {
                let reason = DisconnectReason::from_code(reason);
                inner.connected = false;
                inner.ip = None;
                inner.last_reason = Some(reason);
                inner.last_error = Some(reason.message());

                let should_log = match inner.last_logged {
                    Some((previous, at)) => {
                        previous != reason || now.saturating_sub(at) >= DISCONNECT_LOG_INTERVAL_MS
                    }
                    None => true,
                };
                if should_log {
                    log_warning!("WiFi disconnected: {}", reason);
                    inner.last_logged = Some((reason, now));
                }
            }
        }
    }

    pub fn is_connected(&self) -> bool {
        self.inner.lock().map(|i| i.connected).unwrap_or(false)
    }

    pub fn ip(&self) -> Option<String> {
        self.inner.lock().ok().and_then(|i| i.ip.clone())
    }

    pub fn last_reason(&self) -> Option<DisconnectReason> {
        self.inner.lock().ok().and_then(|i| i.last_reason)
    }

    pub fn last_error(&self) -> Option<String> {
        self.inner.lock().ok().and_then(|i| i.last_error.clone())
    }

    /// Replace the last error with a diagnostic result.
    pub fn set_error(&self, message: String) {
        if let Ok(mut inner) = self.inner.lock() {
            inner.last_error = Some(message);
        }
    }

    pub fn clear_error(&self) {
        if let Ok(mut inner) = self.inner.lock() {
            inner.last_error = None;
            inner.last_reason = None;
        }
    }
}
