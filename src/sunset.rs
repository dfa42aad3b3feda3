//! Daily sunset trigger window.
//!
//! The scheduler owns the once-per-day bookkeeping. It recomputes the sunset
//! minute only when time is re-synchronised or the local day changes; the
//! window check itself is a cheap comparison shared with the render side.

use anyhow::Result;
use chrono::{DateTime, Duration as ChronoDuration, NaiveDate, Timelike, Utc};

use crate::common::constants::*;
use crate::storage::{KeyValueStore, SharedStore, StoredValue};
use crate::time_sync::LocalTime;

const KEY_LATITUDE: &str = "latitude";
const KEY_LONGITUDE: &str = "longitude";
const KEY_TZ_OFFSET: &str = "tz_offset";

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Coordinates {
    pub latitude: f64,
    pub longitude: f64,
    pub tz_offset_hours: i8,
}

impl Coordinates {
    /// Zero/zero is what the backend sends for "not configured".
    pub fn is_known(&self) -> bool {
        let in_range = (-90.0..=90.0).contains(&self.latitude)
            && (-180.0..=180.0).contains(&self.longitude);
        in_range && !(self.latitude == 0.0 && self.longitude == 0.0)
    }

    pub fn differs_from(&self, other: &Coordinates) -> bool {
        (self.latitude - other.latitude).abs() > COORDINATE_EPSILON
            || (self.longitude - other.longitude).abs() > COORDINATE_EPSILON
            || self.tz_offset_hours != other.tz_offset_hours
    }
}

/// Astronomical sunset for a date.
pub trait SunsetCalculator: Send {
    /// Sunset instant on `date`, or `None` if the sun does not set that day.
    fn sunset_utc(&self, coordinates: &Coordinates, date: NaiveDate) -> Option<DateTime<Utc>>;
}

/// Sunset from the `sunrise` crate's solar position model.
pub struct SolarCalculator;

impl SunsetCalculator for SolarCalculator {
    fn sunset_utc(&self, coordinates: &Coordinates, date: NaiveDate) -> Option<DateTime<Utc>> {
        use sunrise::{Coordinates as SolarCoordinates, SolarDay, SolarEvent};

        let coord = SolarCoordinates::new(coordinates.latitude, coordinates.longitude)?;
        let sunset = SolarDay::new(coord, date).event_time(SolarEvent::Sunset);
        // Polar day and night produce instants far from the requested date.
        let noon = date.and_hms_opt(12, 0, 0)?.and_utc();
        ((sunset - noon).num_hours().abs() <= 36).then_some(sunset)
    }
}

/// Local minute of day at which the sun sets on `date`.
pub fn sunset_minute_of_day(
    calculator: &dyn SunsetCalculator,
    coordinates: &Coordinates,
    date: NaiveDate,
) -> Option<i32> {
    let utc = calculator.sunset_utc(coordinates, date)?;
    let local = utc.naive_utc() + ChronoDuration::hours(coordinates.tz_offset_hours as i64);
    Some((local.hour() * 60 + local.minute()) as i32)
}

/// Inside `[sunset - window, sunset + window]` and not yet played today.
/// A negative sunset minute means no sunset is known.
pub fn in_trigger_window(
    local_minute: i32,
    sunset_minute: i32,
    window_minutes: i32,
    played_today: bool,
) -> bool {
    !played_today && sunset_minute >= 0 && (local_minute - sunset_minute).abs() <= window_minutes
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SunsetWindow {
    /// `-1` when unknown or when there is no sunset today.
    pub minute_of_day: i32,
    pub played_today: bool,
    /// Local day number the window belongs to.
    pub day: Option<i64>,
}

impl Default for SunsetWindow {
    fn default() -> Self {
        Self {
            minute_of_day: -1,
            played_today: false,
            day: None,
        }
    }
}

pub struct SunsetScheduler {
    calculator: Box<dyn SunsetCalculator>,
    store: SharedStore,
    coordinates: Option<Coordinates>,
    window: SunsetWindow,
    window_minutes: i32,
}

impl SunsetScheduler {
    /// Restores the last known coordinates from the `location` namespace.
    pub fn load(
        store: SharedStore,
        calculator: Box<dyn SunsetCalculator>,
        window_minutes: i32,
    ) -> Result<Self> {
        let latitude = store.get_f64(NS_LOCATION, KEY_LATITUDE)?;
        let longitude = store.get_f64(NS_LOCATION, KEY_LONGITUDE)?;
        let tz_offset = store.get_i64(NS_LOCATION, KEY_TZ_OFFSET)?.unwrap_or(0);

        let coordinates = match (latitude, longitude) {
            (Some(latitude), Some(longitude)) => Some(Coordinates {
                latitude,
                longitude,
                tz_offset_hours: tz_offset.clamp(
                    MINIMUM_TZ_OFFSET_HOURS as i64,
                    MAXIMUM_TZ_OFFSET_HOURS as i64,
                ) as i8,
            }),
            _ => None,
        }
        .filter(Coordinates::is_known);

        if let Some(c) = &coordinates {
            log_decorated!(
                "Loaded location {:.4}, {:.4} (UTC{:+})",
                c.latitude,
                c.longitude,
                c.tz_offset_hours
            );
        }

        Ok(Self {
            calculator,
            store,
            coordinates,
            window: SunsetWindow::default(),
            window_minutes,
        })
    }

    /// Adopt coordinates from the backend. Persists and returns true only
    /// when they actually changed.
    pub fn update_coordinates(&mut self, coordinates: Coordinates) -> Result<bool> {
        if !coordinates.is_known() {
            return Ok(false);
        }
        if let Some(current) = &self.coordinates
            && !coordinates.differs_from(current)
        {
            return Ok(false);
        }

        self.store.put(
            NS_LOCATION,
            KEY_LATITUDE,
            StoredValue::Float(coordinates.latitude),
        )?;
        self.store.put(
            NS_LOCATION,
            KEY_LONGITUDE,
            StoredValue::Float(coordinates.longitude),
        )?;
        self.store.put(
            NS_LOCATION,
            KEY_TZ_OFFSET,
            StoredValue::Integer(coordinates.tz_offset_hours as i64),
        )?;

        log_decorated!(
            "Location updated: {:.4}, {:.4} (UTC{:+})",
            coordinates.latitude,
            coordinates.longitude,
            coordinates.tz_offset_hours
        );
        self.coordinates = Some(coordinates);
        Ok(true)
    }

    pub fn coordinates(&self) -> Option<Coordinates> {
        self.coordinates
    }

    pub fn window(&self) -> SunsetWindow {
        self.window
    }

    /// Track the local day. Clears `played_today` when it changes and returns
    /// true so the caller can recompute for the new date.
    pub fn observe_day(&mut self, now: &LocalTime) -> bool {
        if self.window.day == Some(now.day_number) {
            return false;
        }
        if self.window.day.is_some() {
            log_debug!("New local day {}, sunset flag cleared", now.date);
        }
        self.window.day = Some(now.day_number);
        self.window.played_today = false;
        true
    }

    /// Recompute today's sunset minute. Needs coordinates and synced time.
    pub fn recompute(&mut self, now: Option<LocalTime>) {
        let (Some(coordinates), Some(now)) = (self.coordinates, now) else {
            self.window.minute_of_day = -1;
            return;
        };
        self.observe_day(&now);

        match sunset_minute_of_day(self.calculator.as_ref(), &coordinates, now.date) {
            Some(minute) => {
                if minute != self.window.minute_of_day {
                    log_decorated!(
                        "Sunset today at {:02}:{:02} local",
                        minute / 60,
                        minute % 60
                    );
                }
                self.window.minute_of_day = minute;
            }
            None => {
                log_decorated!("No sunset on {}", now.date);
                self.window.minute_of_day = -1;
            }
        }
    }

    pub fn is_trigger_window(&self, now: Option<LocalTime>) -> bool {
        let Some(now) = now else {
            return false;
        };
        if self.coordinates.is_none() {
            return false;
        }
        let played = self.window.played_today && self.window.day == Some(now.day_number);
        in_trigger_window(
            now.minute_of_day,
            self.window.minute_of_day,
            self.window_minutes,
            played,
        )
    }

    /// Mark today's sunset as shown. Only called after the animation finished.
    pub fn acknowledge_played(&mut self) {
        if !self.window.played_today {
            log_decorated!("Sunset acknowledged for today");
        }
        self.window.played_today = true;
    }

    pub fn window_minutes(&self) -> i32 {
        self.window_minutes
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::constants::test_constants::*;
    use crate::storage::MemoryStore;
    use crate::time_sync::local_time;
    use std::sync::Arc;

    /// Sunset fixed at 18:00 UTC every day.
    struct FixedSunset;

    impl SunsetCalculator for FixedSunset {
        fn sunset_utc(&self, _: &Coordinates, date: NaiveDate) -> Option<DateTime<Utc>> {
            Some(date.and_hms_opt(18, 0, 0)?.and_utc())
        }
    }

    fn tel_aviv() -> Coordinates {
        Coordinates {
            latitude: TEST_LATITUDE,
            longitude: TEST_LONGITUDE,
            tz_offset_hours: TEST_TZ_OFFSET,
        }
    }

    fn at(date: (i32, u32, u32), hour: u32, minute: u32) -> Option<LocalTime> {
        let utc = NaiveDate::from_ymd_opt(date.0, date.1, date.2)?
            .and_hms_opt(hour, minute, 0)?
            .and_utc();
        Some(local_time(utc, TEST_TZ_OFFSET))
    }

    fn scheduler(store: SharedStore) -> SunsetScheduler {
        crate::logger::Log::set_enabled(false);
        SunsetScheduler::load(store, Box::new(FixedSunset), 15).unwrap()
    }

    #[test]
    fn test_window_predicate() {
        assert!(in_trigger_window(1185, 1200, 15, false));
        assert!(in_trigger_window(1215, 1200, 15, false));
        assert!(!in_trigger_window(1184, 1200, 15, false));
        assert!(!in_trigger_window(1216, 1200, 15, false));
        assert!(!in_trigger_window(1200, 1200, 15, true));
        assert!(!in_trigger_window(0, -1, 15, false));
    }

    #[test]
    fn test_no_coordinates_never_triggers() {
        let mut scheduler = scheduler(Arc::new(MemoryStore::new()));
        let now = at((2025, 12, 20), 18, 0);
        scheduler.recompute(now);
        assert!(!scheduler.is_trigger_window(now));
    }

    #[test]
    fn test_trigger_acknowledge_and_day_reset() {
        let mut scheduler = scheduler(Arc::new(MemoryStore::new()));
        assert!(scheduler.update_coordinates(tel_aviv()).unwrap());

        // 18:00 UTC is 20:00 local.
        let before = at((2025, 12, 20), 17, 40);
        scheduler.recompute(before);
        assert_eq!(scheduler.window().minute_of_day, 20 * 60);
        assert!(!scheduler.is_trigger_window(before));

        let inside = at((2025, 12, 20), 17, 50);
        assert!(scheduler.is_trigger_window(inside));
        scheduler.acknowledge_played();
        assert!(!scheduler.is_trigger_window(inside));
        assert!(!scheduler.is_trigger_window(at((2025, 12, 20), 18, 10)));

        let next_day = at((2025, 12, 21), 17, 55);
        assert!(scheduler.observe_day(&next_day.unwrap()));
        assert!(!scheduler.window().played_today);
        assert!(scheduler.is_trigger_window(next_day));
    }

    #[test]
    fn test_day_resets_on_local_not_utc_midnight() {
        let mut scheduler = scheduler(Arc::new(MemoryStore::new()));
        scheduler.update_coordinates(tel_aviv()).unwrap();
        scheduler.recompute(at((2025, 12, 20), 18, 0));
        scheduler.acknowledge_played();

        // 21:30 UTC is 23:30 local, still the same local day.
        assert!(!scheduler.observe_day(&at((2025, 12, 20), 21, 30).unwrap()));
        assert!(scheduler.window().played_today);
        // 22:30 UTC is 00:30 local on the next day.
        assert!(scheduler.observe_day(&at((2025, 12, 20), 22, 30).unwrap()));
        assert!(!scheduler.window().played_today);
    }

    #[test]
    fn test_coordinates_persist_only_on_change() {
        let store: SharedStore = Arc::new(MemoryStore::new());
        let mut scheduler = scheduler(store.clone());
        assert!(scheduler.update_coordinates(tel_aviv()).unwrap());

        let mut nudged = tel_aviv();
        nudged.latitude += 0.00005;
        assert!(!scheduler.update_coordinates(nudged).unwrap());

        let mut moved = tel_aviv();
        moved.tz_offset_hours = 3;
        assert!(scheduler.update_coordinates(moved).unwrap());

        let zero = Coordinates {
            latitude: 0.0,
            longitude: 0.0,
            tz_offset_hours: 0,
        };
        assert!(!scheduler.update_coordinates(zero).unwrap());

        let reloaded = SunsetScheduler::load(store, Box::new(FixedSunset), 15).unwrap();
        assert_eq!(reloaded.coordinates().map(|c| c.tz_offset_hours), Some(3));
    }

    #[test]
    fn test_solar_calculator_tel_aviv_winter() {
        let date = NaiveDate::from_ymd_opt(2025, 12, 20).unwrap();
        let minute = sunset_minute_of_day(&SolarCalculator, &tel_aviv(), date).unwrap();
        // Around 16:40 local in late December.
        assert!((16 * 60 + 20..=17 * 60).contains(&minute), "got {minute}");
    }
}
