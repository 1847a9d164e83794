//! PROPFIND and PROPPATCH body parsing

use quick_xml::events::Event;
use quick_xml::name::ResolveResult;
use quick_xml::reader::NsReader;

use super::{NS_CALDAV, NS_CARDDAV, NS_DAV};
use crate::error::ApiError;

/// Namespace of a requested property
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Ns {
    Dav,
    CalDav,
    CardDav,
    Other(String),
}

impl Ns {
    pub fn from_uri(uri: &str) -> Ns {
        match uri {
            NS_DAV => Ns::Dav,
            NS_CALDAV => Ns::CalDav,
            NS_CARDDAV => Ns::CardDav,
            other => Ns::Other(other.to_string()),
        }
    }
}

/// A property name qualified by its namespace
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PropName {
    pub ns: Ns,
    pub local: String,
}

impl PropName {
    pub fn dav(local: &str) -> Self {
        PropName {
            ns: Ns::Dav,
            local: local.to_string(),
        }
    }

    pub fn caldav(local: &str) -> Self {
        PropName {
            ns: Ns::CalDav,
            local: local.to_string(),
        }
    }

    pub fn carddav(local: &str) -> Self {
        PropName {
            ns: Ns::CardDav,
            local: local.to_string(),
        }
    }
}

/// Parsed PROPFIND request body
#[derive(Debug, Clone, PartialEq)]
pub enum PropFindRequest {
    AllProp,
    PropName,
    Prop(Vec<PropName>),
}

/// Parse a PROPFIND body; an empty body means allprop (RFC 4918 §9.1)
pub fn parse_propfind(body: &str) -> Result<PropFindRequest, ApiError> {
    if body.trim().is_empty() {
        return Ok(PropFindRequest::AllProp);
    }

    let mut saw_allprop = false;
    let mut saw_propname = false;
    let names = collect_prop_names(body, |top_level| match top_level {
        "allprop" => saw_allprop = true,
        "propname" => saw_propname = true,
        _ => {}
    })?;

    if saw_allprop {
        Ok(PropFindRequest::AllProp)
    } else if saw_propname {
        Ok(PropFindRequest::PropName)
    } else if !names.is_empty() {
        Ok(PropFindRequest::Prop(names))
    } else {
        // A propfind element without any selector behaves like allprop
        Ok(PropFindRequest::AllProp)
    }
}

/// Parse a PROPPATCH body, returning the property names named in any
/// set/remove block
///
/// The gateway's resources carry no writable properties, so callers answer
/// each with a 403 propstat.
pub fn parse_proppatch(body: &str) -> Result<Vec<PropName>, ApiError> {
    if body.trim().is_empty() {
        return Err(ApiError::BadRequest("PROPPATCH requires a body".into()));
    }
    collect_prop_names(body, |_| {})
}

/// Walk the body and collect the direct children of every `prop` element;
/// other top-level elements are reported to `on_top_level`
fn collect_prop_names(
    body: &str,
    mut on_top_level: impl FnMut(&str),
) -> Result<Vec<PropName>, ApiError> {
    let mut reader = NsReader::from_str(body);
    let mut in_prop = false;
    let mut child_depth = 0u32;
    let mut names: Vec<PropName> = Vec::new();

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => {
                let (resolved, local) = reader.resolve_element(e.name());
                let local = String::from_utf8_lossy(local.as_ref()).to_string();
                if in_prop {
                    if child_depth == 0 {
                        names.push(PropName {
                            ns: resolve_ns(&resolved),
                            local,
                        });
                    }
                    child_depth += 1;
                } else if local == "prop" {
                    in_prop = true;
                } else {
                    on_top_level(&local);
                }
            }
            Ok(Event::Empty(e)) => {
                let (resolved, local) = reader.resolve_element(e.name());
                let local = String::from_utf8_lossy(local.as_ref()).to_string();
                if in_prop {
                    if child_depth == 0 {
                        names.push(PropName {
                            ns: resolve_ns(&resolved),
                            local,
                        });
                    }
                } else {
                    on_top_level(&local);
                }
            }
            Ok(Event::End(e)) => {
                if in_prop {
                    if child_depth > 0 {
                        child_depth -= 1;
                    } else {
                        let (_, local) = reader.resolve_element(e.name());
                        if local.as_ref() == b"prop" {
                            in_prop = false;
                        }
                    }
                }
            }
            Ok(Event::Eof) => break,
            Ok(Event::DocType(_)) => {
                return Err(ApiError::BadRequest("DTD not allowed".into()));
            }
            Err(e) => {
                return Err(ApiError::BadRequest(format!("malformed DAV body: {e}")));
            }
            _ => {}
        }
    }

    Ok(names)
}

fn resolve_ns(resolved: &ResolveResult) -> Ns {
    match resolved {
        ResolveResult::Bound(ns) => Ns::from_uri(&String::from_utf8_lossy(ns.as_ref())),
        _ => Ns::Other(String::new()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_body_is_allprop() {
        assert_eq!(parse_propfind("").unwrap(), PropFindRequest::AllProp);
        assert_eq!(parse_propfind("  \n").unwrap(), PropFindRequest::AllProp);
    }

    #[test]
    fn test_explicit_allprop() {
        let body = r#"<?xml version="1.0"?>
            <D:propfind xmlns:D="DAV:"><D:allprop/></D:propfind>"#;
        assert_eq!(parse_propfind(body).unwrap(), PropFindRequest::AllProp);
    }

    #[test]
    fn test_propname() {
        let body = r#"<?xml version="1.0"?>
            <D:propfind xmlns:D="DAV:"><D:propname/></D:propfind>"#;
        assert_eq!(parse_propfind(body).unwrap(), PropFindRequest::PropName);
    }

    #[test]
    fn test_prop_list_with_namespaces() {
        let body = r#"<?xml version="1.0"?>
            <D:propfind xmlns:D="DAV:" xmlns:C="urn:ietf:params:xml:ns:caldav">
                <D:prop>
                    <D:resourcetype/>
                    <D:getetag/>
                    <C:supported-calendar-component-set/>
                </D:prop>
            </D:propfind>"#;

        let parsed = parse_propfind(body).unwrap();
        let PropFindRequest::Prop(names) = parsed else {
            panic!("expected prop list");
        };
        assert_eq!(names.len(), 3);
        assert_eq!(names[0], PropName::dav("resourcetype"));
        assert_eq!(names[1], PropName::dav("getetag"));
        assert_eq!(
            names[2],
            PropName::caldav("supported-calendar-component-set")
        );
    }

    #[test]
    fn test_nested_property_values_are_not_collected() {
        // a client echoing a resourcetype VALUE must not register
        // "collection" as a requested property
        let body = r#"<?xml version="1.0"?>
            <D:propfind xmlns:D="DAV:">
                <D:prop><D:resourcetype><D:collection/></D:resourcetype></D:prop>
            </D:propfind>"#;

        let PropFindRequest::Prop(names) = parse_propfind(body).unwrap() else {
            panic!("expected prop list");
        };
        assert_eq!(names.len(), 1);
        assert_eq!(names[0].local, "resourcetype");
    }

    #[test]
    fn test_unknown_namespace_is_preserved() {
        let body = r#"<?xml version="1.0"?>
            <D:propfind xmlns:D="DAV:" xmlns:X="http://example.com/ns">
                <D:prop><X:custom-prop/></D:prop>
            </D:propfind>"#;

        let PropFindRequest::Prop(names) = parse_propfind(body).unwrap() else {
            panic!("expected prop list");
        };
        assert_eq!(names[0].ns, Ns::Other("http://example.com/ns".into()));
        assert_eq!(names[0].local, "custom-prop");
    }

    #[test]
    fn test_malformed_body_is_rejected() {
        assert!(parse_propfind("<unclosed").is_err());
    }

    #[test]
    fn test_doctype_is_rejected() {
        let body = r#"<?xml version="1.0"?><!DOCTYPE propfind [ ]><propfind/>"#;
        assert!(parse_propfind(body).is_err());
    }

    #[test]
    fn test_proppatch_collects_names() {
        let body = r#"<?xml version="1.0"?>
            <D:propertyupdate xmlns:D="DAV:">
                <D:set><D:prop><D:displayname>New name</D:displayname></D:prop></D:set>
                <D:remove><D:prop><D:getcontenttype/></D:prop></D:remove>
            </D:propertyupdate>"#;

        let names = parse_proppatch(body).unwrap();
        assert_eq!(names.len(), 2);
        assert_eq!(names[0].local, "displayname");
        assert_eq!(names[1].local, "getcontenttype");
    }

    #[test]
    fn test_proppatch_requires_body() {
        assert!(parse_proppatch("").is_err());
    }
}
