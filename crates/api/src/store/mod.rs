//! Backend stores
//!
//! The capability seams between the DAV handlers and the upstream: a
//! calendar store (read-write) and an address store (read-only). Both borrow
//! the shared upstream client; all durability lives upstream.

pub mod address;
pub mod calendar;

pub use address::{AddressObject, AddressStore};
pub use calendar::{CalendarObject, CalendarStore, PutOutcome};
