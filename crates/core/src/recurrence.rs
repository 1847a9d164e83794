//! Recurrence rule evaluation
//!
//! Thin wrappers over the `rrule` crate. The gateway needs these to validate
//! client-supplied rules and to recompute the first real instance of a
//! synthesized series: the upstream's seriesStartDate may not itself satisfy
//! the rule's BYDAY/BYMONTHDAY constraints, and DTSTART must always be a
//! valid instance.

use chrono::{DateTime, Utc};
use rrule::{RRuleError, RRuleSet};

use crate::error::{GatewayError, GatewayResult};

/// Parse an RRULE value and validate its format
pub fn validate_rrule(rrule_str: &str) -> GatewayResult<()> {
    // The rrule crate requires a DTSTART for strict parsing, so validation
    // runs against a dummy anchor.
    let full_str = format!("DTSTART:20240101T000000Z\nRRULE:{rrule_str}");

    full_str
        .parse::<RRuleSet>()
        .map_err(|e: RRuleError| GatewayError::InvalidRecurrenceRule(e.to_string()))?;

    Ok(())
}

/// First instance of `rrule_str` evaluated from the provisional anchor
///
/// Returns `None` when the rule yields nothing (e.g. an UNTIL before the
/// anchor).
pub fn first_instance(
    rrule_str: &str,
    dtstart: DateTime<Utc>,
) -> GatewayResult<Option<DateTime<Utc>>> {
    let dtstart_str = dtstart.format("%Y%m%dT%H%M%SZ").to_string();
    let full_str = format!("DTSTART:{dtstart_str}\nRRULE:{rrule_str}");

    let rrule_set: RRuleSet = full_str
        .parse()
        .map_err(|e: RRuleError| GatewayError::InvalidRecurrenceRule(e.to_string()))?;

    let first = rrule_set
        .all(1)
        .dates
        .into_iter()
        .next()
        .map(|d| d.with_timezone(&Utc));

    Ok(first)
}
