use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::SensorError;

/// Display unit for field strength. Readings are always stored in µT.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum FieldUnit {
    Microtesla,
    Nanotesla,
    Gauss,
    Milligauss,
}

impl FieldUnit {
    /// How many of this unit make up one microtesla
    fn per_microtesla(self) -> f64 {
        match self {
            FieldUnit::Microtesla => 1.0,
            FieldUnit::Nanotesla => 1000.0,
            FieldUnit::Gauss => 0.01,
            FieldUnit::Milligauss => 10.0,
        }
    }

    pub fn from_microtesla(self, value: f64) -> f64 {
        value * self.per_microtesla()
    }

    pub fn to_microtesla(self, value: f64) -> f64 {
        value / self.per_microtesla()
    }

    pub fn symbol(self) -> &'static str {
        match self {
            FieldUnit::Microtesla => "µT",
            FieldUnit::Nanotesla => "nT",
            FieldUnit::Gauss => "G",
            FieldUnit::Milligauss => "mG",
        }
    }

    /// Decimal places that keep a typical Earth-field value readable.
    pub fn precision(self) -> usize {
        match self {
            FieldUnit::Microtesla => 2,
            FieldUnit::Nanotesla => 0,
            FieldUnit::Gauss => 4,
            FieldUnit::Milligauss => 1,
        }
    }

    pub fn format(self, microtesla: f64) -> String {
        format!(
            "{:.*} {}",
            self.precision(),
            self.from_microtesla(microtesla),
            self.symbol()
        )
    }
}

impl Default for FieldUnit {
    fn default() -> Self {
        FieldUnit::Microtesla
    }
}

impl fmt::Display for FieldUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.symbol())
    }
}

impl FromStr for FieldUnit {
    type Err = SensorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        // Case-insensitive: "MG" reads as milligauss, never megagauss
        match s.trim().to_lowercase().as_str() {
            "ut" | "µt" | "μt" | "microtesla" => Ok(FieldUnit::Microtesla),
            "nt" | "nanotesla" => Ok(FieldUnit::Nanotesla),
            "g" | "gauss" => Ok(FieldUnit::Gauss),
            "mg" | "milligauss" => Ok(FieldUnit::Milligauss),
            other => Err(SensorError::UnknownUnit(other.to_string())),
        }
    }
}
