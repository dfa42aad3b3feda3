//! Backend address resolution from a small remote document.
//!
//! The address is cached with a TTL measured from the last attempt, success
//! or not, so an unreachable document is not hammered. There is no built-in
//! fallback address: an empty result means "cannot fetch yet".

use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;

use crate::clock::SharedClock;
use crate::common::constants::*;
use crate::error::LinkError;
use crate::http::HttpClient;
use crate::storage::{KeyValueStore, SharedStore, StoredValue};
use crate::wifi::manager::Backoff;

pub(crate) const KEY_SERVER: &str = "server";
pub(crate) const KEY_LAST_ATTEMPT: &str = "last_attempt";

#[derive(Debug, Clone, PartialEq)]
pub struct DiscoverySettings {
    pub urls: Vec<String>,
    pub attempts: u32,
    pub delay: Backoff,
    pub ttl: Duration,
    pub http_timeout: Duration,
}

impl Default for DiscoverySettings {
    fn default() -> Self {
        Self {
            urls: DEFAULT_DISCOVERY_URLS.iter().map(|u| u.to_string()).collect(),
            attempts: DEFAULT_DISCOVERY_ATTEMPTS,
            delay: Backoff::new(DEFAULT_DISCOVERY_DELAY_BASE_SECS, DEFAULT_DISCOVERY_DELAY_CAP_SECS),
            ttl: Duration::from_secs(DEFAULT_DISCOVERY_TTL_HOURS * 3600),
            http_timeout: Duration::from_secs(DISCOVERY_HTTP_TIMEOUT_SECS),
        }
    }
}

pub struct ServerDiscovery {
    http: Arc<dyn HttpClient>,
    store: SharedStore,
    clock: SharedClock,
    settings: DiscoverySettings,
    server: String,
    /// Monotonic time of the last attempt in this process.
    last_attempt_ms: Option<u64>,
    enabled: bool,
}

impl ServerDiscovery {
    /// Loads the persisted address as last-known-good. The persisted attempt
    /// time is not trusted across restarts, so the first online call refreshes.
    pub fn new(
        http: Arc<dyn HttpClient>,
        store: SharedStore,
        clock: SharedClock,
        settings: DiscoverySettings,
    ) -> Self {
        let server = match store.get_string(NS_DISCOVERY, KEY_SERVER) {
            Ok(Some(server)) if normalize_server(&server).is_some() => server,
            Ok(_) => String::new(),
            Err(e) => {
                log_warning!("Could not read discovery cache: {}", e);
                String::new()
            }
        };
        Self {
            http,
            store,
            clock,
            settings,
            server,
            last_attempt_ms: None,
            enabled: true,
        }
    }

    /// Current server address, refreshing first when due and `online`.
    /// May be empty.
    pub fn get_server(&mut self, online: bool) -> String {
        if self.should_discover(online) {
            self.force_discovery();
        }
        self.server.clone()
    }

    pub fn should_discover(&self, online: bool) -> bool {
        if !self.enabled || !online {
            return false;
        }
        if self.server.is_empty() {
            return true;
        }
        match self.last_attempt_ms {
            None => true,
            Some(at) => {
                let since = Duration::from_millis(self.clock.now_ms().saturating_sub(at));
                since > self.settings.ttl
            }
        }
    }

    /// Run discovery now regardless of TTL. Returns true on a fresh address.
    pub fn force_discovery(&mut self) -> bool {
        if !self.enabled {
            log_debug!("Discovery disabled, keeping '{}'", self.server);
            return false;
        }

        log_block_start!("Discovering API server");
        let result = self.discover();
        self.last_attempt_ms = Some(self.clock.now_ms());

        let found = match result {
            Ok(server) => {
                if server != self.server {
                    log_decorated!("API server: {}", server);
                } else {
                    log_decorated!("API server unchanged: {}", server);
                }
                self.server = server;
                true
            }
            Err(e) => {
                log_warning!("{}", e);
                if self.server.is_empty() {
                    log_indented!("No server available yet");
                } else {
                    log_indented!("Keeping last known server {}", self.server);
                }
                false
            }
        };
        self.persist();
        found
    }

    fn discover(&self) -> Result<String, LinkError> {
        let urls = &self.settings.urls;
        if urls.is_empty() {
            return Err(LinkError::DiscoveryExhausted { attempts: 0 });
        }

        for attempt in 1..=self.settings.attempts {
            if attempt > 1 {
                let delay = self.settings.delay.delay(attempt - 1);
                log_indented!("Retrying discovery in {}s", delay.as_secs());
                self.clock.sleep(delay);
            }

            let url = &urls[(attempt as usize - 1) % urls.len()];
            log_debug!("Discovery attempt {} via {}", attempt, url);
            match self.http.get(url, self.settings.http_timeout) {
                Ok(response) if response.is_success() => match parse_discovery_response(&response.body) {
                    Some(server) => return Ok(server),
                    None => log_indented!("Attempt {}: invalid discovery document", attempt),
                },
                Ok(response) => log_indented!("Attempt {}: HTTP {}", attempt, response.status),
                Err(e) => log_indented!("Attempt {}: {}", attempt, e),
            }
        }

        Err(LinkError::DiscoveryExhausted {
            attempts: self.settings.attempts,
        })
    }

    fn persist(&self) {
        let now = chrono::Utc::now().timestamp();
        let result = self
            .store
            .put(NS_DISCOVERY, KEY_SERVER, StoredValue::from(self.server.as_str()))
            .and_then(|_| {
                self.store
                    .put(NS_DISCOVERY, KEY_LAST_ATTEMPT, StoredValue::Integer(now))
            });
        if let Err(e) = result {
            log_warning!("Could not save discovery cache: {}", e);
        }
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Cached address without triggering discovery.
    pub fn cached_server(&self) -> &str {
        &self.server
    }
}

/// Extract the server from a discovery document.
///
/// Accepts `{"api_server": "..."}` or `{"server": "..."}`.
pub fn parse_discovery_response(body: &str) -> Option<String> {
    let value: Value = serde_json::from_str(body).ok()?;
    let raw = value
        .get("api_server")
        .or_else(|| value.get("server"))?
        .as_str()?;
    normalize_server(raw)
}

/// Strip scheme and trailing slashes, then check the host looks plausible.
pub fn normalize_server(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    let host = trimmed
        .strip_prefix("https://")
        .or_else(|| trimmed.strip_prefix("http://"))
        .unwrap_or(trimmed)
        .trim_end_matches('/');

    let plausible = host.len() >= MINIMUM_SERVER_LEN
        && host.find('.').is_some_and(|index| index > 0)
        && !host.contains(char::is_whitespace);
    plausible.then(|| host.to_string())
}
