//! Error types for gateway domain logic

use thiserror::Error;

/// Core gateway domain errors
#[derive(Error, Debug)]
pub enum GatewayError {
    #[error("Invalid timezone: {0}")]
    InvalidTimezone(String),

    #[error("Invalid recurrence rule: {0}")]
    InvalidRecurrenceRule(String),

    #[error("Invalid calendar data: {0}")]
    InvalidCalendarData(String),

    #[error("Invalid datetime: {0}")]
    InvalidDateTime(String),

    #[error("Invalid object path: {0}")]
    InvalidObjectPath(String),
}

/// Result type alias for gateway domain operations
pub type GatewayResult<T> = Result<T, GatewayError>;
