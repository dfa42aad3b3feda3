//! Lock-free state shared between the network worker and the render loop.
//!
//! Every field is a scalar atomic with exactly one writer. The writer is fixed
//! by type: only [`NetworkHandle`] can store network-owned fields and only
//! [`RenderHandle`] can store the sunset acknowledgment. Neither handle is
//! `Clone`, and [`SharedState::split`] is the only way to obtain them.
//!
//! Readers may see values up to one network-worker iteration old (about a
//! second). Loads are `Relaxed`: fields are independent and no reader relies
//! on ordering between them.

use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicI32, AtomicI64, AtomicU64, Ordering};

use crate::sunset::in_trigger_window;
use crate::time_sync::LocalTime;

const UNKNOWN: i64 = -1;

pub struct SharedState {
    // Written by the network worker
    utc_seconds: AtomicI64,
    local_day: AtomicI64,
    local_minute: AtomicI32,
    sunset_minute: AtomicI32,
    coordinates_known: AtomicBool,
    last_fetch_ms: AtomicU64,
    network_healthy: AtomicBool,

    // Written by the render loop
    sunset_ack_day: AtomicI64,

    window_minutes: i32,
}

/// Point-in-time copy of every field, for display and status output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SharedSnapshot {
    pub utc: Option<DateTime<Utc>>,
    pub local_day: Option<i64>,
    pub local_minute: Option<i32>,
    pub sunset_minute: Option<i32>,
    pub coordinates_known: bool,
    pub last_fetch_ms: Option<u64>,
    pub network_healthy: bool,
    pub sunset_ack_day: Option<i64>,
}

impl SharedState {
    /// Create the shared state once and hand out the two writer handles.
    pub fn split(window_minutes: i32) -> (NetworkHandle, RenderHandle) {
        let state = Arc::new(SharedState {
            utc_seconds: AtomicI64::new(UNKNOWN),
            local_day: AtomicI64::new(UNKNOWN),
            local_minute: AtomicI32::new(-1),
            sunset_minute: AtomicI32::new(-1),
            coordinates_known: AtomicBool::new(false),
            last_fetch_ms: AtomicU64::new(0),
            network_healthy: AtomicBool::new(false),
            sunset_ack_day: AtomicI64::new(UNKNOWN),
            window_minutes,
        });
        (
            NetworkHandle {
                state: Arc::clone(&state),
            },
            RenderHandle { state },
        )
    }

    fn snapshot(&self) -> SharedSnapshot {
        let utc_seconds = self.utc_seconds.load(Ordering::Relaxed);
        let local_day = self.local_day.load(Ordering::Relaxed);
        let local_minute = self.local_minute.load(Ordering::Relaxed);
        let sunset_minute = self.sunset_minute.load(Ordering::Relaxed);
        let last_fetch_ms = self.last_fetch_ms.load(Ordering::Relaxed);
        let ack = self.sunset_ack_day.load(Ordering::Relaxed);
        SharedSnapshot {
            utc: (utc_seconds >= 0)
                .then(|| DateTime::<Utc>::from_timestamp(utc_seconds, 0))
                .flatten(),
            local_day: (local_day >= 0).then_some(local_day),
            local_minute: (local_minute >= 0).then_some(local_minute),
            sunset_minute: (sunset_minute >= 0).then_some(sunset_minute),
            coordinates_known: self.coordinates_known.load(Ordering::Relaxed),
            last_fetch_ms: (last_fetch_ms > 0).then_some(last_fetch_ms),
            network_healthy: self.network_healthy.load(Ordering::Relaxed),
            sunset_ack_day: (ack >= 0).then_some(ack),
        }
    }

    fn is_sunset_now(&self) -> bool {
        if !self.coordinates_known.load(Ordering::Relaxed) {
            return false;
        }
        let day = self.local_day.load(Ordering::Relaxed);
        let minute = self.local_minute.load(Ordering::Relaxed);
        if day < 0 || minute < 0 {
            return false;
        }
        let played_today = self.sunset_ack_day.load(Ordering::Relaxed) == day;
        in_trigger_window(
            minute,
            self.sunset_minute.load(Ordering::Relaxed),
            self.window_minutes,
            played_today,
        )
    }
}

/// Writer for every network-owned field. Owned by the network worker.
pub struct NetworkHandle {
    state: Arc<SharedState>,
}

impl NetworkHandle {
    /// Publish synchronised time. `None` marks time as unknown.
    pub fn publish_time(&self, utc: Option<DateTime<Utc>>, local: Option<LocalTime>) {
        let s = &self.state;
        s.utc_seconds
            .store(utc.map_or(UNKNOWN, |t| t.timestamp()), Ordering::Relaxed);
        s.local_day
            .store(local.map_or(UNKNOWN, |l| l.day_number), Ordering::Relaxed);
        s.local_minute
            .store(local.map_or(-1, |l| l.minute_of_day), Ordering::Relaxed);
    }

    pub fn publish_sunset(&self, minute_of_day: i32) {
        self.state
            .sunset_minute
            .store(minute_of_day, Ordering::Relaxed);
    }

    pub fn set_coordinates_known(&self, known: bool) {
        self.state
            .coordinates_known
            .store(known, Ordering::Relaxed);
    }

    pub fn record_fetch(&self, now_ms: u64) {
        // Zero is reserved for "never".
        self.state
            .last_fetch_ms
            .store(now_ms.max(1), Ordering::Relaxed);
    }

    pub fn set_network_healthy(&self, healthy: bool) {
        self.state
            .network_healthy
            .store(healthy, Ordering::Relaxed);
    }

    /// Local day the render side last acknowledged a sunset on.
    pub fn acknowledged_day(&self) -> Option<i64> {
        let day = self.state.sunset_ack_day.load(Ordering::Relaxed);
        (day >= 0).then_some(day)
    }

    pub fn snapshot(&self) -> SharedSnapshot {
        self.state.snapshot()
    }
}

/// Reader for the render loop, and writer of the sunset acknowledgment only.
pub struct RenderHandle {
    state: Arc<SharedState>,
}

impl RenderHandle {
    pub fn is_sunset_now(&self) -> bool {
        self.state.is_sunset_now()
    }

    /// Record that today's sunset animation finished.
    pub fn acknowledge_played(&self) {
        let day = self.state.local_day.load(Ordering::Relaxed);
        if day >= 0 {
            self.state.sunset_ack_day.store(day, Ordering::Relaxed);
        }
    }

    pub fn snapshot(&self) -> SharedSnapshot {
        self.state.snapshot()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::time_sync::local_time;
    use chrono::NaiveDate;

    fn local(hour: u32, minute: u32, day: u32) -> (DateTime<Utc>, LocalTime) {
        let utc = NaiveDate::from_ymd_opt(2025, 12, day)
            .unwrap()
            .and_hms_opt(hour, minute, 0)
            .unwrap()
            .and_utc();
        (utc, local_time(utc, 0))
    }

    #[test]
    fn test_nothing_known_means_no_sunset() {
        let (_network, render) = SharedState::split(15);
        assert!(!render.is_sunset_now());
        let snapshot = render.snapshot();
        assert_eq!(snapshot.utc, None);
        assert_eq!(snapshot.sunset_minute, None);
        assert!(!snapshot.network_healthy);
    }

    #[test]
    fn test_acknowledgment_holds_until_local_day_changes() {
        let (network, render) = SharedState::split(15);
        network.set_coordinates_known(true);
        network.publish_sunset(17 * 60);

        let (utc, now) = local(17, 5, 20);
        network.publish_time(Some(utc), Some(now));
        assert!(render.is_sunset_now());

        render.acknowledge_played();
        assert!(!render.is_sunset_now());
        assert_eq!(network.acknowledged_day(), Some(now.day_number));

        let (utc, tomorrow) = local(17, 5, 21);
        network.publish_time(Some(utc), Some(tomorrow));
        assert!(render.is_sunset_now());
    }

    #[test]
    fn test_unknown_coordinates_suppress_trigger() {
        let (network, render) = SharedState::split(15);
        network.publish_sunset(17 * 60);
        let (utc, now) = local(17, 0, 20);
        network.publish_time(Some(utc), Some(now));
        assert!(!render.is_sunset_now());
    }

    #[test]
    fn test_snapshot_reflects_writes() {
        let (network, render) = SharedState::split(15);
        network.record_fetch(42_000);
        network.set_network_healthy(true);
        let (utc, now) = local(9, 30, 20);
        network.publish_time(Some(utc), Some(now));

        let snapshot = render.snapshot();
        assert_eq!(snapshot.last_fetch_ms, Some(42_000));
        assert!(snapshot.network_healthy);
        assert_eq!(snapshot.utc, Some(utc));
        assert_eq!(snapshot.local_minute, Some(9 * 60 + 30));
    }

    #[test]
    fn test_handles_work_across_threads() {
        let (network, render) = SharedState::split(15);
        let writer = std::thread::spawn(move || {
            network.set_network_healthy(true);
            network
        });
        let network = writer.join().unwrap();
        assert!(render.snapshot().network_healthy);
        drop(network);
    }
}
