use thiserror::Error;

/// Failures at the edges of the crate: parsing platform output and user input.
///
/// Sensor conditions (unavailable hardware, denied authorization) are not
/// errors; they show up in `LiveStatus` instead.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SensorError {
    #[error("Sensor output could not be parsed: {0}")]
    Parse(String),

    #[error("Sensor command failed: {0}")]
    Command(String),

    #[error("Unknown field unit: {0}")]
    UnknownUnit(String),

    #[error("Unknown mode: {0}")]
    UnknownMode(String),
}

pub type SensorResult<T> = Result<T, SensorError>;
