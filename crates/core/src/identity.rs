//! Resource identity and path parsing
//!
//! A calendar object path ends in `<stem>.ics` where the stem is either a
//! bare event key or `<key>-<occurrenceId>` for one instance of a series.
//! The split is syntactic and therefore only a *candidate*: client-generated
//! UIDs may contain hyphens too. Writes reject candidates outright
//! (per-occurrence mutation is unsupported), while reads confirm against the
//! upstream by trying the whole stem as a key first.

use crate::error::{GatewayError, GatewayResult};

/// Parsed identity of a calendar object path stem
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectName {
    /// Upstream event key (or client identifier before first contact)
    pub key: String,
    /// Occurrence id candidate, when the stem splits
    pub occurrence: Option<String>,
}

impl ObjectName {
    /// Split a path stem on the last hyphen, iff the part after it matches
    /// the upstream's occurrence-id grammar
    pub fn parse_stem(stem: &str) -> Self {
        if let Some((key, suffix)) = stem.rsplit_once('-')
            && !key.is_empty()
            && is_occurrence_id(suffix)
        {
            return ObjectName {
                key: key.to_string(),
                occurrence: Some(suffix.to_string()),
            };
        }
        ObjectName {
            key: stem.to_string(),
            occurrence: None,
        }
    }

    /// Extract and parse the stem of an `.ics` object path
    pub fn from_ics_path(path: &str) -> GatewayResult<Self> {
        let stem = object_stem(path, ".ics")?;
        Ok(Self::parse_stem(&stem))
    }

    /// The full stem this identity was parsed from
    pub fn stem(&self) -> String {
        match &self.occurrence {
            Some(occ) => format!("{}-{occ}", self.key),
            None => self.key.clone(),
        }
    }

    /// The UID carried by the object's VEVENT (equals the stem)
    pub fn uid(&self) -> String {
        self.stem()
    }

    /// Collapse a rejected occurrence candidate back into a plain key
    pub fn as_whole_key(&self) -> Self {
        ObjectName {
            key: self.stem(),
            occurrence: None,
        }
    }
}

/// Last path segment with `extension` stripped
pub fn object_stem(path: &str, extension: &str) -> GatewayResult<String> {
    let last = path
        .trim_end_matches('/')
        .rsplit('/')
        .next()
        .unwrap_or_default();
    let stem = last.strip_suffix(extension).unwrap_or(last);
    if stem.is_empty() {
        return Err(GatewayError::InvalidObjectPath(path.to_string()));
    }
    Ok(stem.to_string())
}

/// Upstream occurrence-id grammar: opaque alphanumeric, at least two chars
pub fn is_occurrence_id(s: &str) -> bool {
    s.len() >= 2 && s.chars().all(|c| c.is_ascii_alphanumeric())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_plain_key() {
        let name = ObjectName::from_ics_path("/calendars/default/EV42.ics").unwrap();
        assert_eq!(name.key, "EV42");
        assert_eq!(name.occurrence, None);
        assert_eq!(name.uid(), "EV42");
    }

    #[test]
    fn test_parse_occurrence_form() {
        let name = ObjectName::from_ics_path("/calendars/default/EV42-OCC7.ics").unwrap();
        assert_eq!(name.key, "EV42");
        assert_eq!(name.occurrence.as_deref(), Some("OCC7"));
        assert_eq!(name.uid(), "EV42-OCC7");
    }

    #[test]
    fn test_parse_splits_on_last_hyphen_only() {
        let name = ObjectName::parse_stem("A-B-OCC7");
        assert_eq!(name.key, "A-B");
        assert_eq!(name.occurrence.as_deref(), Some("OCC7"));
    }

    #[test]
    fn test_single_char_suffix_is_not_an_occurrence() {
        // Client counters like "cid-1" stay whole
        let name = ObjectName::parse_stem("cid-1");
        assert_eq!(name.key, "cid-1");
        assert_eq!(name.occurrence, None);
    }

    #[test]
    fn test_non_alphanumeric_suffix_is_not_an_occurrence() {
        let name = ObjectName::parse_stem("EV42-occ_7");
        assert_eq!(name.key, "EV42-occ_7");
        assert_eq!(name.occurrence, None);
    }

    #[test]
    fn test_uuid_stem_yields_a_candidate_only() {
        // The last UUID segment matches the grammar; disambiguation against
        // the upstream happens at the store layer.
        let name = ObjectName::parse_stem("C721345B-380C-4E23-A718-F2E4C2949EBA");
        assert_eq!(name.key, "C721345B-380C-4E23-A718");
        assert_eq!(name.occurrence.as_deref(), Some("F2E4C2949EBA"));
        assert_eq!(name.as_whole_key().key, "C721345B-380C-4E23-A718-F2E4C2949EBA");
    }

    #[test]
    fn test_stem_without_extension() {
        let name = ObjectName::from_ics_path("/calendars/default/EV42").unwrap();
        assert_eq!(name.key, "EV42");
    }

    #[test]
    fn test_empty_stem_is_invalid() {
        assert!(ObjectName::from_ics_path("/calendars/default/.ics").is_err());
        assert!(ObjectName::from_ics_path("/").is_err());
    }
}
