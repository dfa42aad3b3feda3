//! `lamplink discover`: resolve the API server immediately.

use anyhow::Result;
use std::sync::Arc;

use crate::clock::SystemClock;
use crate::config::Config;
use crate::discovery::ServerDiscovery;
use crate::http::ReqwestClient;

pub fn handle_discover_command(config: &Config) -> Result<()> {
    let Some(_lock) = super::lock_or_report()? else {
        return Ok(());
    };

    let store = super::open_store(config)?;
    let http = Arc::new(ReqwestClient::new()?);
    let mut discovery = ServerDiscovery::new(
        http,
        store,
        SystemClock::shared(),
        config.discovery_settings(),
    );

    let previous = discovery.cached_server().to_string();
    let found = discovery.force_discovery();

    log_pipe!();
    if found {
        if previous.is_empty() || previous == discovery.cached_server() {
            log_info!("API server: {}", discovery.cached_server());
        } else {
            log_info!("API server changed: {} → {}", previous, discovery.cached_server());
        }
    } else if discovery.cached_server().is_empty() {
        log_warning!("Discovery failed and no server is cached");
    } else {
        log_warning!("Discovery failed, keeping {}", discovery.cached_server());
    }
    log_end!();
    Ok(())
}
