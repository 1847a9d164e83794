//! iCalendar <-> upstream event translation
//!
//! Outbound: an upstream record becomes a VCALENDAR with exactly one VEVENT.
//! Serial events get an RRULE synthesized from their series schema, and
//! DTSTART is recomputed as the first instance that actually satisfies the
//! rule (the upstream's seriesStartDate may not). Occurrence times arrive as
//! seconds from midnight in the upstream's local zone and leave as UTC.
//!
//! Inbound: a client-submitted body is reduced to the single VEVENT it must
//! contain and mapped onto the upstream's create/update shape.

use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, Utc};
use chrono_tz::Tz;
use icalendar::{Alarm, Calendar, Component, Event as IcalEvent, EventLike};

use crate::error::{GatewayError, GatewayResult};
use crate::model::{
    EventMode, UpstreamEvent, format_upstream_datetime, parse_upstream_datetime,
};
use crate::recurrence::{first_instance, validate_rrule};
use crate::schema::{RuleParts, rrule_to_schema, schema_to_rrule};
use crate::timezone::{local_seconds_to_utc, utc_to_local_date, utc_to_local_seconds};

/// ETag of a serialized body: lowercase hex MD5
pub fn etag(body: &str) -> String {
    format!("{:x}", md5::compute(body.as_bytes()))
}

/// Seconds-from-midnight fallback when a series has no usable DTEND
const END_OF_DAY_SECONDS: i64 = 86340;

/// Convert a full upstream event record to iCalendar
///
/// Serial events (eventMode=serial with a series schema) become a recurring
/// VEVENT; everything else is delegated to [`occurrence_to_ics`].
pub fn event_to_ics(event: &UpstreamEvent, tz: Tz) -> GatewayResult<String> {
    if event.event_mode != EventMode::Serial || event.occurrence_id.is_some() {
        return occurrence_to_ics(event);
    }

    let key = event_key(event)?;
    let series_start = event.series_start_date.ok_or_else(|| {
        GatewayError::InvalidCalendarData(format!("serial event {key} has no seriesStartDate"))
    })?;

    let mut ical_event = IcalEvent::new();
    ical_event.uid(&key);
    apply_scalars(&mut ical_event, event);

    let mut rrule = event
        .series_schema
        .as_ref()
        .and_then(schema_to_rrule);

    if event.whole_day_event {
        // Whole-day series anchor at UTC midnight of the series start
        let anchor = series_start.and_hms_opt(0, 0, 0).unwrap_or_default().and_utc();
        let first = match &rrule {
            Some(rule) => first_instance(rule, anchor)?.unwrap_or(anchor),
            None => anchor,
        };
        ical_event.starts(first.date_naive());
        ical_event.ends(first.date_naive());
        ical_event.timestamp(first);
    } else {
        let occ_start = event.occurrence_start_time.unwrap_or(0);
        let occ_end = event.occurrence_end_time.unwrap_or(occ_start);
        let start_dt = local_seconds_to_utc(series_start, occ_start, tz);
        let end_dt = local_seconds_to_utc(series_start, occ_end, tz);
        let duration = end_dt - start_dt;

        let first = match &rrule {
            Some(rule) => first_instance(rule, start_dt)?.unwrap_or(start_dt),
            None => start_dt,
        };
        ical_event.starts(first);
        ical_event.ends(first + duration);
        ical_event.timestamp(first);
    }

    if let Some(rule) = rrule.take() {
        let rule = match event.series_end_date {
            Some(end) if !rule.contains("UNTIL=") => {
                format!("{rule};UNTIL={}T235959Z", end.format("%Y%m%d"))
            }
            _ => rule,
        };
        ical_event.add_property("RRULE", &rule);
    }

    Ok(wrap_calendar(ical_event))
}

/// Convert an upstream record to a standalone single-event iCalendar
///
/// Used for single events and for per-occurrence listing records; the
/// concrete startDateTime/endDateTime fields are taken verbatim (already
/// UTC) and no RRULE is emitted. An occurrence's UID is `<key>-<occId>`.
pub fn occurrence_to_ics(event: &UpstreamEvent) -> GatewayResult<String> {
    let key = event_key(event)?;
    let uid = match &event.occurrence_id {
        Some(occ) => format!("{key}-{occ}"),
        None => key.clone(),
    };

    let start_str = event.start_date_time.as_deref().ok_or_else(|| {
        GatewayError::InvalidCalendarData(format!("event {uid} has no startDateTime"))
    })?;
    let start_dt = parse_upstream_datetime(start_str)?;
    let end_dt = match event.end_date_time.as_deref() {
        Some(s) => parse_upstream_datetime(s)?,
        None => start_dt + Duration::hours(1),
    };

    let mut ical_event = IcalEvent::new();
    ical_event.uid(&uid);
    apply_scalars(&mut ical_event, event);

    if event.whole_day_event {
        ical_event.starts(start_dt.date_naive());
        ical_event.ends(end_dt.date_naive());
    } else {
        ical_event.starts(start_dt);
        ical_event.ends(end_dt);
    }
    ical_event.timestamp(start_dt);

    Ok(wrap_calendar(ical_event))
}

fn event_key(event: &UpstreamEvent) -> GatewayResult<String> {
    event
        .key
        .clone()
        .filter(|k| !k.is_empty())
        .ok_or_else(|| GatewayError::InvalidCalendarData("event record without key".into()))
}

/// Scalar properties shared by all outbound shapes
fn apply_scalars(ical_event: &mut IcalEvent, event: &UpstreamEvent) {
    if let Some(subject) = event.subject.as_deref().filter(|s| !s.is_empty()) {
        ical_event.summary(subject);
    }
    if let Some(content) = event.content.as_deref().filter(|s| !s.is_empty()) {
        ical_event.description(content);
    }
    if let Some(location) = event.location.as_deref().filter(|s| !s.is_empty()) {
        ical_event.location(location);
    }
    if let Some(category) = event.event_category.as_deref().filter(|s| !s.is_empty()) {
        ical_event.add_property("CATEGORIES", category);
    }
    ical_event.add_property("CLASS", if event.private { "PRIVATE" } else { "PUBLIC" });

    let remind = event.remind_before_start.unwrap_or(0);
    if event.reminder_enabled && remind > 0 {
        let description = event.subject.as_deref().unwrap_or("Reminder");
        ical_event.alarm(Alarm::display(description, -Duration::seconds(remind)));
    }
}

fn wrap_calendar(ical_event: IcalEvent) -> String {
    let mut calendar = Calendar::new();
    calendar.push(ical_event);
    calendar.to_string()
}

/// The single VEVENT extracted from a client body, mapped onto the upstream
/// model
#[derive(Debug, Clone)]
pub struct InboundEvent {
    pub uid: String,
    pub event: UpstreamEvent,
}

/// A DTSTART/DTEND value: date-only or a UTC instant
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum IcalTime {
    Date(NaiveDate),
    Instant(DateTime<Utc>),
}

/// Parse a client-submitted iCalendar body into an upstream event draft
///
/// Rejects bodies that carry METHOD, contain zero or multiple VEVENTs, mix
/// in other component kinds, or carry conflicting UIDs.
pub fn ics_to_event(ical_str: &str, tz: Tz) -> GatewayResult<InboundEvent> {
    let lines = unfold_lines(ical_str);

    let mut in_vevent = false;
    let mut in_valarm = false;
    let mut vevent_count = 0u32;

    let mut uid: Option<String> = None;
    let mut summary: Option<String> = None;
    let mut description: Option<String> = None;
    let mut location: Option<String> = None;
    let mut category: Option<String> = None;
    let mut private = false;
    let mut dtstart: Option<IcalTime> = None;
    let mut dtend: Option<IcalTime> = None;
    let mut rrule: Option<String> = None;
    let mut reminder_seconds: Option<i64> = None;

    for line in &lines {
        let line = line.trim_end();
        if line.is_empty() {
            continue;
        }

        match line {
            "BEGIN:VEVENT" => {
                vevent_count += 1;
                if vevent_count > 1 {
                    return Err(GatewayError::InvalidCalendarData(
                        "body contains more than one VEVENT".into(),
                    ));
                }
                in_vevent = true;
                continue;
            }
            "END:VEVENT" => {
                in_vevent = false;
                continue;
            }
            "BEGIN:VALARM" => {
                in_valarm = true;
                continue;
            }
            "END:VALARM" => {
                in_valarm = false;
                continue;
            }
            _ => {}
        }

        let Some((key, value)) = line.split_once(':') else {
            continue;
        };
        let (prop_name, params) = match key.split_once(';') {
            Some((name, params_str)) => (name, Some(params_str)),
            None => (key, None),
        };
        let prop_name = prop_name.to_ascii_uppercase();

        if prop_name == "BEGIN"
            && matches!(value, "VTODO" | "VJOURNAL" | "VFREEBUSY")
        {
            return Err(GatewayError::InvalidCalendarData(format!(
                "unsupported component kind: {value}"
            )));
        }

        if !in_vevent {
            // METHOD is only legal in scheduling messages, never in a
            // calendar object resource
            if prop_name == "METHOD" {
                return Err(GatewayError::InvalidCalendarData(
                    "calendar object must not carry METHOD".into(),
                ));
            }
            continue;
        }

        if in_valarm {
            if prop_name == "TRIGGER" && !params.is_some_and(|p| p.contains("VALUE=DATE-TIME")) {
                if let Some(secs) = parse_iso_duration_seconds(value)
                    && secs <= 0
                {
                    reminder_seconds = Some(secs.abs());
                }
            }
            continue;
        }

        match prop_name.as_str() {
            "UID" => {
                if let Some(existing) = &uid
                    && existing != value
                {
                    return Err(GatewayError::InvalidCalendarData(
                        "conflicting UID values".into(),
                    ));
                }
                uid = Some(value.to_string());
            }
            "SUMMARY" => summary = Some(unescape_text(value)),
            "DESCRIPTION" => description = Some(unescape_text(value)),
            "LOCATION" => location = Some(unescape_text(value)),
            "CATEGORIES" => {
                category = value
                    .split(',')
                    .next()
                    .map(unescape_text)
                    .filter(|c| !c.is_empty());
            }
            "CLASS" => private = value.eq_ignore_ascii_case("PRIVATE"),
            "DTSTART" => dtstart = Some(parse_ical_time(value, params)?),
            "DTEND" => dtend = Some(parse_ical_time(value, params)?),
            "RRULE" => rrule = Some(value.to_string()),
            _ => {}
        }
    }

    if vevent_count == 0 {
        return Err(GatewayError::InvalidCalendarData(
            "body contains no VEVENT".into(),
        ));
    }

    let uid = uid.ok_or_else(|| GatewayError::InvalidCalendarData("UID is required".into()))?;
    let dtstart =
        dtstart.ok_or_else(|| GatewayError::InvalidCalendarData("DTSTART is required".into()))?;

    let mut event = UpstreamEvent {
        subject: summary,
        content: description,
        location,
        event_category: category,
        private,
        ..Default::default()
    };

    if let Some(secs) = reminder_seconds {
        event.reminder_enabled = true;
        event.remind_before_start = Some(secs);
    }

    match rrule {
        Some(rule) => map_serial(&mut event, &rule, dtstart, dtend, tz)?,
        None => map_single(&mut event, dtstart, dtend),
    }

    Ok(InboundEvent { uid, event })
}

fn map_single(event: &mut UpstreamEvent, dtstart: IcalTime, dtend: Option<IcalTime>) {
    event.event_mode = EventMode::Single;

    let (start_dt, whole_day) = match dtstart {
        IcalTime::Date(date) => (date.and_hms_opt(0, 0, 0).unwrap_or_default().and_utc(), true),
        IcalTime::Instant(dt) => (dt, false),
    };
    event.whole_day_event = whole_day;
    event.start_date_time = Some(format_upstream_datetime(start_dt));
    event.start_date_time_enabled = Some(true);

    let end_dt = match dtend {
        Some(IcalTime::Date(date)) => date.and_hms_opt(0, 0, 0).unwrap_or_default().and_utc(),
        Some(IcalTime::Instant(dt)) => dt,
        None if whole_day => start_dt,
        None => start_dt + Duration::hours(1),
    };
    event.end_date_time = Some(format_upstream_datetime(end_dt));
    event.end_date_time_enabled = Some(true);
}

fn map_serial(
    event: &mut UpstreamEvent,
    rule: &str,
    dtstart: IcalTime,
    dtend: Option<IcalTime>,
    tz: Tz,
) -> GatewayResult<()> {
    validate_rrule(rule)?;
    event.event_mode = EventMode::Serial;

    let (series_start, start_seconds, whole_day) = match dtstart {
        IcalTime::Date(date) => (date, 0, true),
        IcalTime::Instant(dt) => (utc_to_local_date(dt, tz), utc_to_local_seconds(dt, tz), false),
    };
    event.whole_day_event = whole_day;
    event.series_start_date = Some(series_start);
    event.occurrence_start_time = Some(start_seconds);
    event.occurrence_start_time_enabled = Some(true);

    let end_seconds = match dtend {
        Some(IcalTime::Instant(dt)) => utc_to_local_seconds(dt, tz),
        // Date-only or absent DTEND has no usable time of day
        _ => END_OF_DAY_SECONDS,
    };
    event.occurrence_end_time = Some(end_seconds);
    event.occurrence_end_time_enabled = Some(true);

    event.series_schema = Some(rrule_to_schema(rule, series_start)?);

    if let Some(until) = RuleParts::parse(rule)?.until {
        let date_part: String = until.chars().take(8).collect();
        let end = NaiveDate::parse_from_str(&date_part, "%Y%m%d")
            .map_err(|_| GatewayError::InvalidRecurrenceRule(format!("bad UNTIL: {until}")))?;
        event.series_end_date = Some(end);
    }

    Ok(())
}

/// Unfold RFC 5545 folded lines (continuations begin with space or tab)
fn unfold_lines(ical_str: &str) -> Vec<String> {
    let mut lines: Vec<String> = Vec::new();
    for raw in ical_str.lines() {
        if let Some(rest) = raw.strip_prefix(' ').or_else(|| raw.strip_prefix('\t')) {
            if let Some(last) = lines.last_mut() {
                last.push_str(rest);
                continue;
            }
        }
        lines.push(raw.to_string());
    }
    lines
}

/// Undo RFC 5545 text escaping
fn unescape_text(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut chars = value.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') | Some('N') => out.push('\n'),
            Some(escaped) => out.push(escaped),
            None => out.push('\\'),
        }
    }
    out
}

/// Parse a DTSTART/DTEND value, honoring VALUE=DATE and TZID parameters
fn parse_ical_time(value: &str, params: Option<&str>) -> GatewayResult<IcalTime> {
    let is_date = params.is_some_and(|p| p.contains("VALUE=DATE") && !p.contains("VALUE=DATE-TIME"));
    if is_date || (value.len() == 8 && !value.contains('T')) {
        let date = NaiveDate::parse_from_str(value, "%Y%m%d")
            .map_err(|e| GatewayError::InvalidDateTime(format!("{value}: {e}")))?;
        return Ok(IcalTime::Date(date));
    }

    if let Some(stripped) = value.strip_suffix('Z') {
        let naive = NaiveDateTime::parse_from_str(stripped, "%Y%m%dT%H%M%S")
            .map_err(|e| GatewayError::InvalidDateTime(format!("{value}: {e}")))?;
        return Ok(IcalTime::Instant(naive.and_utc()));
    }

    let naive = NaiveDateTime::parse_from_str(value, "%Y%m%dT%H%M%S")
        .map_err(|e| GatewayError::InvalidDateTime(format!("{value}: {e}")))?;

    // Floating times are localized via TZID when given, else taken as UTC
    match params.and_then(extract_tzid) {
        Some(tzid) => {
            let tz = crate::timezone::parse_timezone(&tzid)?;
            Ok(IcalTime::Instant(crate::timezone::local_datetime_to_utc(
                naive, tz,
            )))
        }
        None => Ok(IcalTime::Instant(naive.and_utc())),
    }
}

fn extract_tzid(params: &str) -> Option<String> {
    for param in params.split(';') {
        if let Some(value) = param.strip_prefix("TZID=") {
            return Some(value.trim_matches('"').to_string());
        }
    }
    None
}

/// Parse an ISO 8601 duration like "-PT15M" into signed seconds
fn parse_iso_duration_seconds(value: &str) -> Option<i64> {
    let (sign, rest) = match value.strip_prefix('-') {
        Some(rest) => (-1i64, rest),
        None => (1i64, value.strip_prefix('+').unwrap_or(value)),
    };
    let rest = rest.strip_prefix('P')?;

    let mut total: i64 = 0;
    let mut number = String::new();
    let mut in_time = false;
    for c in rest.chars() {
        match c {
            'T' => in_time = true,
            '0'..='9' => number.push(c),
            'W' | 'D' | 'H' | 'M' | 'S' => {
                let n: i64 = number.parse().ok()?;
                number.clear();
                total += match (c, in_time) {
                    ('W', _) => n * 7 * 86400,
                    ('D', _) => n * 86400,
                    ('H', true) => n * 3600,
                    ('M', true) => n * 60,
                    ('S', true) => n,
                    _ => return None,
                };
            }
            _ => return None,
        }
    }
    if !number.is_empty() {
        return None;
    }
    Some(sign * total)
}
