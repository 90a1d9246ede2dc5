//! Error types for the acoustic monitor.

use acoustic_core::Reading;
use thiserror::Error;

use crate::classifier::ClassifierError;

/// Errors surfaced to callers of the monitor API.
#[derive(Debug, Error)]
pub enum MonitorError {
    /// Bad registration or request input. Nothing was mutated.
    #[error("validation error: {0}")]
    Validation(String),

    /// Sensor id is not registered.
    #[error("sensor not found: {0}")]
    NotFound(String),

    /// Manual analysis failed; `fallback` is the partial reading shown to the user.
    #[error("classification failed for sensor {sensor_id}: {source}")]
    Classification {
        sensor_id: String,
        source: ClassifierError,
        fallback: Box<Reading>,
    },

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),
}

impl MonitorError {
    pub fn fallback_reading(&self) -> Option<&Reading> {
        match self {
            MonitorError::Classification { fallback, .. } => Some(fallback),
            _ => None,
        }
    }
}

/// Result type for monitor operations.
pub type MonitorResult<T> = Result<T, MonitorError>;
