//! REPORT body parsing
//!
//! Supports calendar-query (time-range filter only; other filter types
//! degrade to return-all), calendar-multiget, and their addressbook
//! analogues.

use chrono::{DateTime, Utc};
use quick_xml::events::Event;
use quick_xml::name::ResolveResult;
use quick_xml::reader::NsReader;

use super::propfind::{Ns, PropName};
use crate::error::ApiError;

/// Properties requested for each matching object
#[derive(Debug, Clone, Default)]
pub struct ReportProps {
    pub names: Vec<PropName>,
    /// Whether calendar-data / address-data was requested
    pub include_data: bool,
}

/// Parsed REPORT request
#[derive(Debug, Clone)]
pub enum ReportRequest {
    CalendarQuery {
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
        props: ReportProps,
    },
    CalendarMultiget {
        hrefs: Vec<String>,
        props: ReportProps,
    },
    AddressbookQuery {
        props: ReportProps,
    },
    AddressbookMultiget {
        hrefs: Vec<String>,
        props: ReportProps,
    },
}

/// Parse a REPORT request body
pub fn parse_report(body: &str) -> Result<ReportRequest, ApiError> {
    let mut reader = NsReader::from_str(body);

    let mut root: Option<String> = None;
    let mut in_prop = false;
    let mut prop_child_depth = 0u32;
    let mut in_href = false;
    let mut names: Vec<PropName> = Vec::new();
    let mut hrefs: Vec<String> = Vec::new();
    let mut time_start: Option<DateTime<Utc>> = None;
    let mut time_end: Option<DateTime<Utc>> = None;

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => {
                let (resolved, local) = reader.resolve_element(e.name());
                let local_str = String::from_utf8_lossy(local.as_ref()).to_string();

                if root.is_none() {
                    root = Some(local_str.clone());
                }

                if in_prop {
                    if prop_child_depth == 0 {
                        names.push(PropName {
                            ns: resolve_ns(&resolved),
                            local: local_str.clone(),
                        });
                    }
                    prop_child_depth += 1;
                } else {
                    match local_str.as_str() {
                        "prop" => in_prop = true,
                        "href" => in_href = true,
                        "time-range" => read_time_range(&e, &mut time_start, &mut time_end),
                        _ => {}
                    }
                }
            }
            Ok(Event::Empty(e)) => {
                let (resolved, local) = reader.resolve_element(e.name());
                let local_str = String::from_utf8_lossy(local.as_ref()).to_string();

                if root.is_none() {
                    root = Some(local_str.clone());
                }

                if in_prop {
                    if prop_child_depth == 0 {
                        names.push(PropName {
                            ns: resolve_ns(&resolved),
                            local: local_str,
                        });
                    }
                } else if local_str == "time-range" {
                    read_time_range(&e, &mut time_start, &mut time_end);
                }
            }
            Ok(Event::Text(e)) => {
                if in_href {
                    let text = String::from_utf8_lossy(e.as_ref()).trim().to_string();
                    if !text.is_empty() {
                        hrefs.push(text);
                    }
                }
            }
            Ok(Event::End(e)) => {
                if in_prop {
                    if prop_child_depth > 0 {
                        prop_child_depth -= 1;
                    } else {
                        let (_, local) = reader.resolve_element(e.name());
                        if local.as_ref() == b"prop" {
                            in_prop = false;
                        }
                    }
                } else {
                    let (_, local) = reader.resolve_element(e.name());
                    if local.as_ref() == b"href" {
                        in_href = false;
                    }
                }
            }
            Ok(Event::Eof) => break,
            Ok(Event::DocType(_)) => {
                return Err(ApiError::BadRequest("DTD not allowed".into()));
            }
            Err(e) => {
                return Err(ApiError::BadRequest(format!("malformed REPORT body: {e}")));
            }
            _ => {}
        }
    }

    let include_data = names.iter().any(|n| {
        (n.ns == Ns::CalDav && n.local == "calendar-data")
            || (n.ns == Ns::CardDav && n.local == "address-data")
    });
    let props = ReportProps {
        names,
        include_data,
    };

    match root.as_deref() {
        Some("calendar-query") => Ok(ReportRequest::CalendarQuery {
            start: time_start,
            end: time_end,
            props,
        }),
        Some("calendar-multiget") => Ok(ReportRequest::CalendarMultiget { hrefs, props }),
        Some("addressbook-query") => Ok(ReportRequest::AddressbookQuery { props }),
        Some("addressbook-multiget") => Ok(ReportRequest::AddressbookMultiget { hrefs, props }),
        other => Err(ApiError::BadRequest(format!(
            "unsupported REPORT type: {}",
            other.unwrap_or("<empty>")
        ))),
    }
}

fn resolve_ns(resolved: &ResolveResult) -> Ns {
    match resolved {
        ResolveResult::Bound(ns) => Ns::from_uri(&String::from_utf8_lossy(ns.as_ref())),
        _ => Ns::Other(String::new()),
    }
}

fn read_time_range(
    e: &quick_xml::events::BytesStart<'_>,
    start: &mut Option<DateTime<Utc>>,
    end: &mut Option<DateTime<Utc>>,
) {
    for attr in e.attributes().flatten() {
        let key = String::from_utf8_lossy(attr.key.as_ref()).to_string();
        let value = String::from_utf8_lossy(&attr.value).to_string();
        match key.as_str() {
            "start" => *start = parse_caldav_datetime(&value),
            "end" => *end = parse_caldav_datetime(&value),
            _ => {}
        }
    }
}

/// Parse a CalDAV time-range boundary (ISO 8601 basic format, UTC)
fn parse_caldav_datetime(s: &str) -> Option<DateTime<Utc>> {
    chrono::NaiveDateTime::parse_from_str(s, "%Y%m%dT%H%M%SZ")
        .ok()
        .map(|dt| dt.and_utc())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Datelike;

    #[test]
    fn test_parse_calendar_query_basic() {
        let xml = r#"<?xml version="1.0" encoding="utf-8"?>
            <C:calendar-query xmlns:C="urn:ietf:params:xml:ns:caldav">
                <D:prop xmlns:D="DAV:">
                    <D:getetag/>
                    <C:calendar-data/>
                </D:prop>
            </C:calendar-query>"#;

        match parse_report(xml).unwrap() {
            ReportRequest::CalendarQuery { start, end, props } => {
                assert!(start.is_none());
                assert!(end.is_none());
                assert!(props.include_data);
                assert_eq!(props.names.len(), 2);
            }
            other => panic!("expected CalendarQuery, got {other:?}"),
        }
    }

    #[test]
    fn test_parse_calendar_query_with_time_range() {
        let xml = r#"<?xml version="1.0" encoding="utf-8"?>
            <C:calendar-query xmlns:C="urn:ietf:params:xml:ns:caldav">
                <C:filter>
                    <C:comp-filter name="VCALENDAR">
                        <C:comp-filter name="VEVENT">
                            <C:time-range start="20260101T000000Z" end="20260201T000000Z"/>
                        </C:comp-filter>
                    </C:comp-filter>
                </C:filter>
            </C:calendar-query>"#;

        match parse_report(xml).unwrap() {
            ReportRequest::CalendarQuery { start, end, .. } => {
                let start = start.unwrap();
                let end = end.unwrap();
                assert_eq!(start.year(), 2026);
                assert_eq!(start.month(), 1);
                assert_eq!(end.month(), 2);
            }
            other => panic!("expected CalendarQuery, got {other:?}"),
        }
    }

    #[test]
    fn test_parse_calendar_multiget() {
        let xml = r#"<?xml version="1.0" encoding="utf-8"?>
            <C:calendar-multiget xmlns:C="urn:ietf:params:xml:ns:caldav" xmlns:D="DAV:">
                <D:prop><D:getetag/><C:calendar-data/></D:prop>
                <D:href>/calendars/default/EV1.ics</D:href>
                <D:href>/calendars/default/EV2.ics</D:href>
            </C:calendar-multiget>"#;

        match parse_report(xml).unwrap() {
            ReportRequest::CalendarMultiget { hrefs, props } => {
                assert_eq!(
                    hrefs,
                    vec![
                        "/calendars/default/EV1.ics".to_string(),
                        "/calendars/default/EV2.ics".to_string()
                    ]
                );
                assert!(props.include_data);
            }
            other => panic!("expected CalendarMultiget, got {other:?}"),
        }
    }

    #[test]
    fn test_parse_addressbook_multiget() {
        let xml = r#"<?xml version="1.0" encoding="utf-8"?>
            <R:addressbook-multiget xmlns:R="urn:ietf:params:xml:ns:carddav" xmlns:D="DAV:">
                <D:prop><D:getetag/><R:address-data/></D:prop>
                <D:href>/addressbooks/customer/BACHE.vcf</D:href>
            </R:addressbook-multiget>"#;

        match parse_report(xml).unwrap() {
            ReportRequest::AddressbookMultiget { hrefs, props } => {
                assert_eq!(hrefs.len(), 1);
                assert!(props.include_data);
            }
            other => panic!("expected AddressbookMultiget, got {other:?}"),
        }
    }

    #[test]
    fn test_parse_addressbook_query_degrades_to_all() {
        let xml = r#"<?xml version="1.0" encoding="utf-8"?>
            <R:addressbook-query xmlns:R="urn:ietf:params:xml:ns:carddav" xmlns:D="DAV:">
                <D:prop><D:getetag/></D:prop>
                <R:filter><R:prop-filter name="FN"/></R:filter>
            </R:addressbook-query>"#;

        match parse_report(xml).unwrap() {
            ReportRequest::AddressbookQuery { props } => {
                assert!(!props.include_data);
            }
            other => panic!("expected AddressbookQuery, got {other:?}"),
        }
    }

    #[test]
    fn test_unknown_report_type_is_rejected() {
        let xml = r#"<?xml version="1.0"?><D:sync-collection xmlns:D="DAV:"/>"#;
        assert!(parse_report(xml).is_err());
    }
}
