//! Davgate core - domain logic for the CalDAV/CardDAV gateway
//!
//! This crate contains pure domain logic with no I/O operations: the upstream
//! data model, recurrence-schema mapping, timezone math, the iCalendar
//! translator, and resource identity parsing.

pub mod config;
pub mod error;
pub mod identity;
pub mod model;
pub mod recurrence;
pub mod schema;
pub mod timezone;
pub mod translate;

pub use config::UpstreamConfig;
pub use error::GatewayError;
pub use identity::ObjectName;
pub use model::{EventMode, SeriesSchema, UpstreamEvent, Weekday};
pub use recurrence::first_instance;
pub use schema::{rrule_to_schema, schema_to_rrule};
pub use timezone::{local_seconds_to_utc, parse_timezone, utc_to_local_seconds};
