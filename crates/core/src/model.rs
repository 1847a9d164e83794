//! Upstream data model
//!
//! These types mirror the upstream's JSON schema exactly (camelCase wire
//! names). The recurrence model is a tagged union over five schema types;
//! `arrhythmic` deliberately has no RRULE representation and callers must
//! handle the absence.

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{GatewayError, GatewayResult};

/// Whether an event is a lone appointment or a recurring series
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventMode {
    #[default]
    Single,
    Serial,
}

/// Weekday as the upstream names it
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Weekday {
    Monday,
    Tuesday,
    Wednesday,
    Thursday,
    Friday,
    Saturday,
    Sunday,
}

impl Weekday {
    /// All weekdays in MO..SU order; BYDAY lists are emitted in this order
    pub const ALL: [Weekday; 7] = [
        Weekday::Monday,
        Weekday::Tuesday,
        Weekday::Wednesday,
        Weekday::Thursday,
        Weekday::Friday,
        Weekday::Saturday,
        Weekday::Sunday,
    ];

    /// The Monday..Friday set used by the allBusinessDays regularity
    pub const BUSINESS_DAYS: [Weekday; 5] = [
        Weekday::Monday,
        Weekday::Tuesday,
        Weekday::Wednesday,
        Weekday::Thursday,
        Weekday::Friday,
    ];

    /// RFC 5545 BYDAY token
    pub fn byday(self) -> &'static str {
        match self {
            Weekday::Monday => "MO",
            Weekday::Tuesday => "TU",
            Weekday::Wednesday => "WE",
            Weekday::Thursday => "TH",
            Weekday::Friday => "FR",
            Weekday::Saturday => "SA",
            Weekday::Sunday => "SU",
        }
    }

    /// Parse an RFC 5545 BYDAY token
    pub fn from_byday(token: &str) -> Option<Self> {
        match token {
            "MO" => Some(Weekday::Monday),
            "TU" => Some(Weekday::Tuesday),
            "WE" => Some(Weekday::Wednesday),
            "TH" => Some(Weekday::Thursday),
            "FR" => Some(Weekday::Friday),
            "SA" => Some(Weekday::Saturday),
            "SU" => Some(Weekday::Sunday),
            _ => None,
        }
    }
}

fn default_interval() -> u32 {
    1
}

/// Daily schema regularity
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "regularity", rename_all = "camelCase")]
pub enum DailyRegularity {
    AllBusinessDays,
    #[serde(rename_all = "camelCase")]
    Interval {
        #[serde(default = "default_interval")]
        days_interval: u32,
    },
}

/// Weekly schema data
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WeeklySchema {
    pub weekdays: Vec<Weekday>,
    #[serde(default = "default_interval")]
    pub weeks_interval: u32,
}

/// Monthly schema regularity
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "regularity", rename_all = "camelCase")]
pub enum MonthlyRegularity {
    #[serde(rename_all = "camelCase")]
    SpecificDate {
        day_of_month: u32,
        #[serde(default = "default_interval")]
        months_interval: u32,
    },
    #[serde(rename_all = "camelCase")]
    SpecificDay {
        weekday: Weekday,
        week_number: u32,
        #[serde(default = "default_interval")]
        months_interval: u32,
    },
}

/// Yearly schema regularity
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "regularity", rename_all = "camelCase")]
pub enum YearlyRegularity {
    #[serde(rename_all = "camelCase")]
    SpecificDate {
        month_of_year: u32,
        day_of_month: u32,
    },
    #[serde(rename_all = "camelCase")]
    SpecificDay {
        month_of_year: u32,
        weekday: Weekday,
        week_number: u32,
    },
}

/// Recurrence pattern of a serial event
///
/// Wire shape: `{"schemaType": "weekly", "weeklySchemaData": {...}}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "schemaType", rename_all = "camelCase")]
pub enum SeriesSchema {
    Daily {
        #[serde(rename = "dailySchemaData")]
        data: DailyRegularity,
    },
    Weekly {
        #[serde(rename = "weeklySchemaData")]
        data: WeeklySchema,
    },
    Monthly {
        #[serde(rename = "monthlySchemaData")]
        data: MonthlyRegularity,
    },
    Yearly {
        #[serde(rename = "yearlySchemaData")]
        data: YearlyRegularity,
    },
    /// Irregular pattern defined by explicit occurrence dates; has no RRULE
    Arrhythmic,
}

/// A calendar event as the upstream models it
///
/// The same shape is returned by the full-event endpoint (carries
/// `seriesSchema`) and by the occurrences listing (carries `occurrenceId`
/// plus concrete start/end datetimes, but no schema).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct UpstreamEvent {
    /// Opaque key, assigned by the upstream on create
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub owner_key: Option<String>,
    pub event_mode: EventMode,
    /// Present only on listing records for instances of a series
    #[serde(skip_serializing_if = "Option::is_none")]
    pub occurrence_id: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub subject: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub event_category: Option<String>,

    /// Concrete instants (single events and listing records), upstream
    /// datetime format
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_date_time: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_date_time: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_date_time_enabled: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_date_time_enabled: Option<bool>,

    /// Series bounds (calendar dates)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub series_start_date: Option<NaiveDate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub series_end_date: Option<NaiveDate>,

    /// Seconds from midnight in the upstream's local timezone
    #[serde(skip_serializing_if = "Option::is_none")]
    pub occurrence_start_time: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub occurrence_end_time: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub occurrence_start_time_enabled: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub occurrence_end_time_enabled: Option<bool>,

    pub whole_day_event: bool,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub series_schema: Option<SeriesSchema>,

    pub reminder_enabled: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remind_before_start: Option<i64>,

    pub private: bool,
}

/// Page of occurrence listing records
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct OccurrencePage {
    pub calendar_events: Vec<UpstreamEvent>,
    pub count: u64,
    pub total_count: u64,
}

/// A company as returned by the companies endpoint
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Company {
    pub company_name: Option<String>,
}

/// Page of companies
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CompanyPage {
    pub companies: Vec<Company>,
}

/// Postal address details nested in an address record
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PostAddress {
    pub line1: Option<String>,
    pub street: Option<String>,
    pub zip_code_and_city: Option<String>,
    pub phone: Option<String>,
    pub mobile: Option<String>,
    pub fax: Option<String>,
    pub email: Option<String>,
    pub website: Option<String>,
}

/// One entry of an address record's postAddresses list
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PostAddressEntry {
    pub post_address: Option<PostAddress>,
}

/// An address-book record as the upstream models it
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AddressRecord {
    pub key: Option<String>,
    pub address_type: Option<String>,
    pub note: Option<String>,
    pub tax_id: Option<String>,
    pub client_number: Option<String>,
    pub post_addresses: Vec<PostAddressEntry>,
}

/// Page of address records
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AddressPage {
    pub addresses: Vec<AddressRecord>,
    pub count: u64,
    pub total_count: u64,
}

/// Format a UTC instant the only way the upstream accepts: no fractional
/// seconds, `Z` suffix (never `+00:00`)
pub fn format_upstream_datetime(dt: DateTime<Utc>) -> String {
    dt.format("%Y-%m-%dT%H:%M:%SZ").to_string()
}

/// Parse an upstream datetime; tolerates RFC 3339 offsets on input even
/// though they are never emitted
pub fn parse_upstream_datetime(s: &str) -> GatewayResult<DateTime<Utc>> {
    if let Ok(naive) = NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%SZ") {
        return Ok(naive.and_utc());
    }
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| GatewayError::InvalidDateTime(format!("{s}: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_series_schema_daily_business_days_roundtrip() {
        let json = r#"{"schemaType":"daily","dailySchemaData":{"regularity":"allBusinessDays"}}"#;
        let schema: SeriesSchema = serde_json::from_str(json).unwrap();
        assert_eq!(
            schema,
            SeriesSchema::Daily {
                data: DailyRegularity::AllBusinessDays
            }
        );

        let back = serde_json::to_string(&schema).unwrap();
        assert!(back.contains("\"schemaType\":\"daily\""));
        assert!(back.contains("\"regularity\":\"allBusinessDays\""));
    }

    #[test]
    fn test_series_schema_daily_interval_defaults_to_one() {
        let json = r#"{"schemaType":"daily","dailySchemaData":{"regularity":"interval"}}"#;
        let schema: SeriesSchema = serde_json::from_str(json).unwrap();
        assert_eq!(
            schema,
            SeriesSchema::Daily {
                data: DailyRegularity::Interval { days_interval: 1 }
            }
        );
    }

    #[test]
    fn test_series_schema_weekly_roundtrip() {
        let json = r#"{"schemaType":"weekly","weeklySchemaData":{"weekdays":["monday","wednesday","friday"],"weeksInterval":2}}"#;
        let schema: SeriesSchema = serde_json::from_str(json).unwrap();
        match &schema {
            SeriesSchema::Weekly { data } => {
                assert_eq!(
                    data.weekdays,
                    vec![Weekday::Monday, Weekday::Wednesday, Weekday::Friday]
                );
                assert_eq!(data.weeks_interval, 2);
            }
            other => panic!("expected weekly schema, got {other:?}"),
        }

        let back = serde_json::to_string(&schema).unwrap();
        assert!(back.contains("\"weekdays\":[\"monday\",\"wednesday\",\"friday\"]"));
    }

    #[test]
    fn test_series_schema_monthly_specific_day() {
        let json = r#"{"schemaType":"monthly","monthlySchemaData":{"regularity":"specificDay","weekday":"friday","weekNumber":3,"monthsInterval":1}}"#;
        let schema: SeriesSchema = serde_json::from_str(json).unwrap();
        assert_eq!(
            schema,
            SeriesSchema::Monthly {
                data: MonthlyRegularity::SpecificDay {
                    weekday: Weekday::Friday,
                    week_number: 3,
                    months_interval: 1,
                }
            }
        );
    }

    #[test]
    fn test_series_schema_arrhythmic() {
        let json = r#"{"schemaType":"arrhythmic"}"#;
        let schema: SeriesSchema = serde_json::from_str(json).unwrap();
        assert_eq!(schema, SeriesSchema::Arrhythmic);
    }

    #[test]
    fn test_upstream_event_listing_record() {
        // Listing records have no seriesSchema and carry concrete instants
        let json = r#"{
            "key": "EV42",
            "occurrenceId": "OCC7",
            "eventMode": "serial",
            "subject": "Standup",
            "startDateTime": "2026-01-13T08:00:00Z",
            "endDateTime": "2026-01-13T08:15:00Z"
        }"#;
        let event: UpstreamEvent = serde_json::from_str(json).unwrap();
        assert_eq!(event.key.as_deref(), Some("EV42"));
        assert_eq!(event.occurrence_id.as_deref(), Some("OCC7"));
        assert_eq!(event.event_mode, EventMode::Serial);
        assert!(event.series_schema.is_none());
        assert!(!event.whole_day_event);
    }

    #[test]
    fn test_upstream_event_serialization_omits_absent_fields() {
        let event = UpstreamEvent {
            subject: Some("Test".into()),
            event_mode: EventMode::Single,
            ..Default::default()
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"subject\":\"Test\""));
        assert!(!json.contains("seriesSchema"));
        assert!(!json.contains("occurrenceId"));
    }

    #[test]
    fn test_format_upstream_datetime_z_suffix_no_fraction() {
        let dt = Utc.with_ymd_and_hms(2026, 1, 13, 14, 30, 0).unwrap();
        assert_eq!(format_upstream_datetime(dt), "2026-01-13T14:30:00Z");
    }

    #[test]
    fn test_parse_upstream_datetime() {
        let dt = parse_upstream_datetime("2026-01-13T14:30:00Z").unwrap();
        assert_eq!(dt, Utc.with_ymd_and_hms(2026, 1, 13, 14, 30, 0).unwrap());

        // offset notation is tolerated on input
        let dt = parse_upstream_datetime("2026-01-13T15:30:00+01:00").unwrap();
        assert_eq!(dt, Utc.with_ymd_and_hms(2026, 1, 13, 14, 30, 0).unwrap());

        assert!(parse_upstream_datetime("13.01.2026 14:30").is_err());
    }

    #[test]
    fn test_weekday_byday_tokens() {
        assert_eq!(Weekday::Monday.byday(), "MO");
        assert_eq!(Weekday::Sunday.byday(), "SU");
        assert_eq!(Weekday::from_byday("TH"), Some(Weekday::Thursday));
        assert_eq!(Weekday::from_byday("XX"), None);
    }
}
