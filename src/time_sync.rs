//! Wall-clock time recovered from HTTP `Date` headers.
//!
//! There is no trusted real-time clock. Each successful data fetch carries a
//! `Date` header; the parsed instant is anchored to the monotonic clock so the
//! current time can be derived between fetches.

use chrono::{DateTime, Datelike, Duration as ChronoDuration, NaiveDate, Timelike, Utc};

use crate::error::LinkError;

/// Broken-down UTC time plus the fixed offset it is displayed in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WallClock {
    pub year: i32,
    pub month: u32,
    pub day: u32,
    pub hour: u32,
    pub minute: u32,
    pub second: u32,
    pub tz_offset_hours: i8,
}

impl WallClock {
    pub fn from_utc(utc: DateTime<Utc>, tz_offset_hours: i8) -> Self {
        Self {
            year: utc.year(),
            month: utc.month(),
            day: utc.day(),
            hour: utc.hour(),
            minute: utc.minute(),
            second: utc.second(),
            tz_offset_hours,
        }
    }
}

/// Local calendar position used for day-change detection and the sunset window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LocalTime {
    pub date: NaiveDate,
    /// Days since 0001-01-01 of the local date; changes exactly at local midnight.
    pub day_number: i64,
    pub minute_of_day: i32,
}

pub fn local_time(utc: DateTime<Utc>, tz_offset_hours: i8) -> LocalTime {
    let local = utc.naive_utc() + ChronoDuration::hours(tz_offset_hours as i64);
    LocalTime {
        date: local.date(),
        day_number: local.date().num_days_from_ce() as i64,
        minute_of_day: (local.hour() * 60 + local.minute()) as i32,
    }
}

/// Parse an RFC 7231 date such as `Sat, 20 Dec 2025 22:09:22 GMT`.
pub fn parse_http_date(header: &str) -> Result<DateTime<Utc>, LinkError> {
    let failure = || LinkError::TimeParseFailure {
        header: header.to_string(),
    };
    let trimmed = header.trim();
    let parts: Vec<&str> = trimmed.split_whitespace().collect();
    if parts.len() != 6 || parts[5] != "GMT" || parts[4].split(':').count() != 3 {
        return Err(failure());
    }
    let parsed = DateTime::parse_from_rfc2822(trimmed).map_err(|_| failure())?;
    let utc = parsed.with_timezone(&Utc);
    // Anything before the firmware existed is a broken server clock.
    if utc.year() < 2020 {
        return Err(failure());
    }
    Ok(utc)
}

#[derive(Debug, Default)]
pub struct TimeSynchronizer {
    /// Last parsed instant and the monotonic time it was received at.
    anchor: Option<(DateTime<Utc>, u64)>,
    tz_offset_hours: i8,
}

impl TimeSynchronizer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Update from a `Date` header. On failure nothing changes.
    pub fn parse_and_update(&mut self, header: &str, now_ms: u64) -> bool {
        match parse_http_date(header) {
            Ok(utc) => {
                let first = self.anchor.is_none();
                self.anchor = Some((utc, now_ms));
                if first {
                    log_decorated!("Time synced: {} UTC", utc.format("%Y-%m-%d %H:%M:%S"));
                } else {
                    log_debug!("Time synced: {} UTC", utc.format("%H:%M:%S"));
                }
                true
            }
            Err(e) => {
                log_warning!("{}", e);
                false
            }
        }
    }

    pub fn set_tz_offset(&mut self, hours: i8) {
        self.tz_offset_hours = hours;
    }

    pub fn tz_offset_hours(&self) -> i8 {
        self.tz_offset_hours
    }

    pub fn is_valid(&self) -> bool {
        self.anchor.is_some()
    }

    /// Current UTC time, advanced by monotonic time since the last sync.
    pub fn now_utc(&self, now_ms: u64) -> Option<DateTime<Utc>> {
        let (utc, at_ms) = self.anchor?;
        let elapsed = ChronoDuration::milliseconds(now_ms.saturating_sub(at_ms) as i64);
        Some(utc + elapsed)
    }

    pub fn wall_clock(&self, now_ms: u64) -> Option<WallClock> {
        self.now_utc(now_ms)
            .map(|utc| WallClock::from_utc(utc, self.tz_offset_hours))
    }

    pub fn local_now(&self, now_ms: u64) -> Option<LocalTime> {
        self.now_utc(now_ms)
            .map(|utc| local_time(utc, self.tz_offset_hours))
    }
}
