// src/ingest/timezone.rs
//! Civil wall-clock time in a named zone → absolute UTC instant.
//!
//! Never consults the process timezone. The offset of a zone depends on the
//! instant being computed, so the conversion guesses (treating the components
//! as UTC), reads back the wall clock in the target zone, and shifts by the
//! difference. A second correction pass settles times right after a DST jump,
//! where the offset at the guess differs from the offset at the answer.

use chrono::{DateTime, Duration, NaiveDate, TimeZone, Timelike, Utc};
use chrono_tz::Tz;

use crate::ingest::types::DEFAULT_TIMEZONE;

const MAX_CORRECTIONS: usize = 2;

/// Resolve `(year, month, day, hour, minute)` as read on a wall clock in `zone`.
///
/// Months are 1-based. Returns `None` for an unknown zone name or an invalid
/// calendar date; any valid date yields an instant.
pub fn local_to_instant(
    zone: &str,
    year: i32,
    month: u32,
    day: u32,
    hour: u32,
    minute: u32,
) -> Option<DateTime<Utc>> {
    let tz: Tz = zone.parse().ok()?;
    local_to_instant_in(tz, year, month, day, hour, minute)
}

pub fn local_to_instant_in(
    tz: Tz,
    year: i32,
    month: u32,
    day: u32,
    hour: u32,
    minute: u32,
) -> Option<DateTime<Utc>> {
    let wanted_date = NaiveDate::from_ymd_opt(year, month, day)?;
    if hour > 23 || minute > 59 {
        return None;
    }
    let wanted_minutes = i64::from(hour * 60 + minute);

    let mut instant = Utc
        .with_ymd_and_hms(year, month, day, hour, minute, 0)
        .single()?;

    for _ in 0..MAX_CORRECTIONS {
        let wall = instant.with_timezone(&tz);
        let wall_minutes = i64::from(wall.hour() * 60 + wall.minute());
        // Date subtraction handles month and year wraparound.
        let day_delta = (wanted_date - wall.date_naive()).num_days();
        let delta = (wanted_minutes - wall_minutes) + day_delta * 24 * 60;
        if delta == 0 {
            break;
        }
        instant += Duration::minutes(delta);
    }

    Some(instant)
}

/// Shorthand for the zone every built-in venue lives in.
pub fn pacific(year: i32, month: u32, day: u32, hour: u32, minute: u32) -> Option<DateTime<Utc>> {
    local_to_instant(DEFAULT_TIMEZONE, year, month, day, hour, minute)
}

/// Today's calendar date on a wall clock in `zone`.
pub fn local_date(zone: &str, now: DateTime<Utc>) -> NaiveDate {
    match zone.parse::<Tz>() {
        Ok(tz) => now.with_timezone(&tz).date_naive(),
        Err(_) => now.date_naive(),
    }
}
