//! 207 Multistatus response construction
//!
//! Responses follow the RFC 4918 shape: one `response` per resource, with
//! all found properties coalesced into a single 200 propstat and all missing
//! ones into a single 404 propstat. Hrefs are emitted exactly as supplied.

use std::io::Cursor;

use quick_xml::Writer;
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};

use super::propfind::{Ns, PropName};
use crate::error::ApiError;

/// Resource type markers for the `resourcetype` property
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceKind {
    Collection,
    Calendar,
    AddressBook,
    Principal,
}

/// Value of a property in a 200 propstat
#[derive(Debug, Clone)]
pub enum PropValue {
    Text(String),
    /// A path wrapped in a `href` element
    Href(String),
    ResourceType(Vec<ResourceKind>),
    /// supported-calendar-component-set entries
    Components(Vec<String>),
    CalendarData(String),
    AddressData(String),
    /// supported-report-set entries, as qualified tags like
    /// "cal:calendar-query"
    SupportedReports(Vec<String>),
    Empty,
}

/// A property the handler can serve for a resource
pub type Prop = (PropName, PropValue);

/// Streaming writer for a multistatus document
pub struct MultistatusWriter {
    writer: Writer<Cursor<Vec<u8>>>,
}

impl MultistatusWriter {
    pub fn new() -> Result<Self, ApiError> {
        let mut writer = Writer::new_with_indent(Cursor::new(Vec::new()), b' ', 2);

        writer
            .write_event(Event::Decl(BytesDecl::new("1.0", Some("utf-8"), None)))
            .map_err(xml_err)?;

        let mut multistatus = BytesStart::new("d:multistatus");
        multistatus.push_attribute(("xmlns:d", "DAV:"));
        multistatus.push_attribute(("xmlns:cal", "urn:ietf:params:xml:ns:caldav"));
        multistatus.push_attribute(("xmlns:card", "urn:ietf:params:xml:ns:carddav"));
        writer
            .write_event(Event::Start(multistatus))
            .map_err(xml_err)?;

        Ok(MultistatusWriter { writer })
    }

    /// Write one `response` with coalesced 200/404 propstats
    pub fn write_response(
        &mut self,
        href: &str,
        found: &[Prop],
        not_found: &[PropName],
    ) -> Result<(), ApiError> {
        self.start_tag("d:response")?;
        self.string_tag("d:href", href)?;

        if found.is_empty() && not_found.is_empty() {
            // RFC 4918 requires at least one propstat; an empty prop in a
            // 200 propstat is the conventional answer to an empty request
            self.start_tag("d:propstat")?;
            self.empty_tag("d:prop")?;
            self.string_tag("d:status", "HTTP/1.1 200 OK")?;
            self.end_tag("d:propstat")?;
        }

        if !found.is_empty() {
            self.start_tag("d:propstat")?;
            self.start_tag("d:prop")?;
            for (name, value) in found {
                self.write_prop_value(name, value)?;
            }
            self.end_tag("d:prop")?;
            self.string_tag("d:status", "HTTP/1.1 200 OK")?;
            self.end_tag("d:propstat")?;
        }

        if !not_found.is_empty() {
            self.start_tag("d:propstat")?;
            self.start_tag("d:prop")?;
            for name in not_found {
                self.write_empty_prop(name)?;
            }
            self.end_tag("d:prop")?;
            self.string_tag("d:status", "HTTP/1.1 404 Not Found")?;
            self.end_tag("d:propstat")?;
        }

        self.end_tag("d:response")
    }

    /// Write one `response` carrying only a status line (per-item failures
    /// in batch reports)
    pub fn write_status_response(&mut self, href: &str, status: &str) -> Result<(), ApiError> {
        self.start_tag("d:response")?;
        self.string_tag("d:href", href)?;
        self.string_tag("d:status", status)?;
        self.end_tag("d:response")
    }

    /// Write one `response` whose properties are all denied (PROPPATCH on
    /// read-only resources)
    pub fn write_forbidden_response(
        &mut self,
        href: &str,
        names: &[PropName],
    ) -> Result<(), ApiError> {
        self.start_tag("d:response")?;
        self.string_tag("d:href", href)?;
        self.start_tag("d:propstat")?;
        self.start_tag("d:prop")?;
        for name in names {
            self.write_empty_prop(name)?;
        }
        self.end_tag("d:prop")?;
        self.string_tag("d:status", "HTTP/1.1 403 Forbidden")?;
        self.end_tag("d:propstat")?;
        self.end_tag("d:response")
    }

    pub fn finish(self) -> Result<String, ApiError> {
        let mut writer = self.writer;
        writer
            .write_event(Event::End(BytesEnd::new("d:multistatus")))
            .map_err(xml_err)?;
        let bytes = writer.into_inner().into_inner();
        String::from_utf8(bytes).map_err(|e| ApiError::Internal(format!("UTF-8 error: {e}")))
    }

    fn write_prop_value(&mut self, name: &PropName, value: &PropValue) -> Result<(), ApiError> {
        let tag = qualified_tag(name);
        match value {
            PropValue::Text(text) => self.string_tag(&tag, text),
            PropValue::Href(path) => {
                self.start_tag(&tag)?;
                self.string_tag("d:href", path)?;
                self.end_tag(&tag)
            }
            PropValue::ResourceType(kinds) => {
                self.start_tag(&tag)?;
                for kind in kinds {
                    match kind {
                        ResourceKind::Collection => self.empty_tag("d:collection")?,
                        ResourceKind::Calendar => self.empty_tag("cal:calendar")?,
                        ResourceKind::AddressBook => self.empty_tag("card:addressbook")?,
                        ResourceKind::Principal => self.empty_tag("d:principal")?,
                    }
                }
                self.end_tag(&tag)
            }
            PropValue::Components(components) => {
                self.start_tag(&tag)?;
                for component in components {
                    let mut comp = BytesStart::new("cal:comp");
                    comp.push_attribute(("name", component.as_str()));
                    self.writer
                        .write_event(Event::Empty(comp))
                        .map_err(xml_err)?;
                }
                self.end_tag(&tag)
            }
            PropValue::CalendarData(data) | PropValue::AddressData(data) => {
                self.string_tag(&tag, data)
            }
            PropValue::SupportedReports(reports) => {
                self.start_tag(&tag)?;
                for report in reports {
                    self.start_tag("d:supported-report")?;
                    self.start_tag("d:report")?;
                    self.empty_tag(report)?;
                    self.end_tag("d:report")?;
                    self.end_tag("d:supported-report")?;
                }
                self.end_tag(&tag)
            }
            PropValue::Empty => self.empty_tag(&tag),
        }
    }

    fn write_empty_prop(&mut self, name: &PropName) -> Result<(), ApiError> {
        match &name.ns {
            Ns::Other(uri) if !uri.is_empty() => {
                let mut element = BytesStart::new(format!("x:{}", name.local));
                element.push_attribute(("xmlns:x", uri.as_str()));
                self.writer
                    .write_event(Event::Empty(element))
                    .map_err(xml_err)
            }
            _ => self.empty_tag(&qualified_tag(name)),
        }
    }

    fn string_tag(&mut self, tag: &str, text: &str) -> Result<(), ApiError> {
        self.writer
            .write_event(Event::Start(BytesStart::new(tag)))
            .map_err(xml_err)?;
        self.writer
            .write_event(Event::Text(BytesText::new(text)))
            .map_err(xml_err)?;
        self.writer
            .write_event(Event::End(BytesEnd::new(tag)))
            .map_err(xml_err)
    }

    fn start_tag(&mut self, tag: &str) -> Result<(), ApiError> {
        self.writer
            .write_event(Event::Start(BytesStart::new(tag)))
            .map_err(xml_err)
    }

    fn end_tag(&mut self, tag: &str) -> Result<(), ApiError> {
        self.writer
            .write_event(Event::End(BytesEnd::new(tag)))
            .map_err(xml_err)
    }

    fn empty_tag(&mut self, tag: &str) -> Result<(), ApiError> {
        self.writer
            .write_event(Event::Empty(BytesStart::new(tag)))
            .map_err(xml_err)
    }
}

fn qualified_tag(name: &PropName) -> String {
    match &name.ns {
        Ns::Dav => format!("d:{}", name.local),
        Ns::CalDav => format!("cal:{}", name.local),
        Ns::CardDav => format!("card:{}", name.local),
        Ns::Other(_) => format!("d:{}", name.local),
    }
}

fn xml_err<E: std::fmt::Display>(e: E) -> ApiError {
    ApiError::Internal(format!("XML write error: {e}"))
}
