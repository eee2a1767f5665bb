pub mod field;
pub mod heading;

pub use field::*;
pub use heading::*;

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::SensorError;

/// Which magnetic-field source feeds the readings.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Mode {
    /// Bias-corrected field from sensor fusion
    Calibrated,
    /// Direct magnetometer output, hard-iron offsets included
    Raw,
}

impl Default for Mode {
    fn default() -> Self {
        Mode::Calibrated
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Mode::Calibrated => write!(f, "Calibrated"),
            Mode::Raw => write!(f, "Raw"),
        }
    }
}

impl FromStr for Mode {
    type Err = SensorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "calibrated" | "cal" => Ok(Mode::Calibrated),
            "raw" => Ok(Mode::Raw),
            other => Err(SensorError::UnknownMode(other.to_string())),
        }
    }
}

/// Lifecycle of the magnetic-field subsystem.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Phase {
    Stopped,
    /// A transition toward the requested mode is inside its guard window
    TransitioningTo(Mode),
    /// Settled; carries the mode actually running (may differ from requested)
    Running(Mode),
}

impl Phase {
    pub fn is_stopped(&self) -> bool {
        matches!(self, Phase::Stopped)
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Phase::Stopped => write!(f, "Stopped"),
            Phase::TransitioningTo(mode) => write!(f, "TransitioningTo({})", mode),
            Phase::Running(mode) => write!(f, "Running({})", mode),
        }
    }
}

/// Confidence of the bias-corrected field. Ordered from worst to best.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum CalibrationQuality {
    Uncalibrated,
    Low,
    Medium,
    High,
}

impl CalibrationQuality {
    /// Map an Android-style accuracy code (0..=3) onto a quality level.
    pub fn from_accuracy_code(code: i64) -> Option<Self> {
        match code {
            0 => Some(CalibrationQuality::Uncalibrated),
            1 => Some(CalibrationQuality::Low),
            2 => Some(CalibrationQuality::Medium),
            3 => Some(CalibrationQuality::High),
            _ => None,
        }
    }
}

impl fmt::Display for CalibrationQuality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            CalibrationQuality::Uncalibrated => "Uncalibrated",
            CalibrationQuality::Low => "Low",
            CalibrationQuality::Medium => "Medium",
            CalibrationQuality::High => "High",
        };
        write!(f, "{}", label)
    }
}

/// Heading authorization as reported by the location platform.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum AuthorizationStatus {
    NotDetermined,
    Restricted,
    Denied,
    Authorized,
}

impl AuthorizationStatus {
    pub fn is_authorized(&self) -> bool {
        matches!(self, AuthorizationStatus::Authorized)
    }

    pub fn is_refused(&self) -> bool {
        matches!(
            self,
            AuthorizationStatus::Denied | AuthorizationStatus::Restricted
        )
    }
}

impl Default for AuthorizationStatus {
    fn default() -> Self {
        AuthorizationStatus::NotDetermined
    }
}

pub fn current_timestamp() -> f64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs_f64()
}
