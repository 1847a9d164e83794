//! Timezone handling utilities
//!
//! The upstream encodes times-of-day as seconds from midnight in its
//! configured local timezone. Everything the gateway emits is UTC, so these
//! helpers convert between the two. DST transitions are resolved by the tz
//! database, never by manual offset arithmetic.

use chrono::{DateTime, Duration, LocalResult, NaiveDate, NaiveDateTime, Offset, TimeZone, Utc};
use chrono_tz::Tz;

use crate::error::{GatewayError, GatewayResult};

/// Parse an IANA timezone string (e.g., "Europe/Berlin", "Asia/Singapore")
pub fn parse_timezone(tz_str: &str) -> GatewayResult<Tz> {
    tz_str
        .parse::<Tz>()
        .map_err(|_| GatewayError::InvalidTimezone(tz_str.to_string()))
}

/// Resolve a wall-clock time in `tz` to a UTC instant
///
/// Ambiguous wall times (DST fall-back) resolve to the first occurrence;
/// skipped wall times (DST spring-forward) are interpreted with the offset
/// in effect before the jump. Both cases yield a stable, valid instant.
pub fn local_datetime_to_utc(naive: NaiveDateTime, tz: Tz) -> DateTime<Utc> {
    match tz.from_local_datetime(&naive) {
        LocalResult::Single(dt) => dt.with_timezone(&Utc),
        LocalResult::Ambiguous(first, _second) => first.with_timezone(&Utc),
        LocalResult::None => {
            let probe = naive - Duration::hours(3);
            let offset_secs = tz
                .from_local_datetime(&probe)
                .earliest()
                .map(|dt| dt.offset().fix().local_minus_utc())
                .unwrap_or(0);
            Utc.from_utc_datetime(&(naive - Duration::seconds(i64::from(offset_secs))))
        }
    }
}

/// Convert an upstream occurrence time (date + seconds from local midnight)
/// to a UTC instant
pub fn local_seconds_to_utc(date: NaiveDate, seconds_from_midnight: i64, tz: Tz) -> DateTime<Utc> {
    let naive = date.and_time(chrono::NaiveTime::MIN) + Duration::seconds(seconds_from_midnight);
    local_datetime_to_utc(naive, tz)
}

/// Convert a UTC instant to seconds from midnight in `tz`
pub fn utc_to_local_seconds(dt: DateTime<Utc>, tz: Tz) -> i64 {
    use chrono::Timelike;
    let local = dt.with_timezone(&tz);
    i64::from(local.hour()) * 3600 + i64::from(local.minute()) * 60 + i64::from(local.second())
}

/// The calendar date of a UTC instant, viewed in `tz`
pub fn utc_to_local_date(dt: DateTime<Utc>, tz: Tz) -> NaiveDate {
    dt.with_timezone(&tz).date_naive()
}
