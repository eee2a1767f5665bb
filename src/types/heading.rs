use serde::{Deserialize, Serialize};

/// Wrap any angle in degrees into [0, 360).
/// Non-finite input maps to 0.
pub fn normalize_degrees(degrees: f64) -> f64 {
    if !degrees.is_finite() {
        return 0.0;
    }
    let wrapped = degrees.rem_euclid(360.0);
    // rem_euclid can round up to exactly 360.0 for tiny negative inputs
    if wrapped >= 360.0 {
        0.0
    } else {
        wrapped
    }
}

/// Compass heading delivered by the location platform.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct HeadingSample {
    pub timestamp: f64,
    /// Degrees from magnetic north, [0, 360)
    pub magnetic: f64,
    /// Degrees from geographic north; `None` without a valid reference
    pub true_heading: Option<f64>,
    /// Degrees, >= 0; 0 means unknown
    pub accuracy: f64,
}

impl HeadingSample {
    pub fn new(magnetic: f64, true_heading: Option<f64>, accuracy: f64, timestamp: f64) -> Self {
        Self {
            timestamp,
            magnetic: normalize_degrees(magnetic),
            true_heading: true_heading.map(normalize_degrees),
            accuracy: if accuracy.is_finite() && accuracy > 0.0 {
                accuracy
            } else {
                0.0
            },
        }
    }

    /// Build from platform conventions, where a negative true heading means
    /// "no geographic reference" and a negative accuracy means "invalid".
    pub fn from_platform(magnetic: f64, true_heading: f64, accuracy: f64, timestamp: f64) -> Self {
        let true_heading = if true_heading.is_finite() && true_heading >= 0.0 {
            Some(true_heading)
        } else {
            None
        };
        Self::new(magnetic, true_heading, accuracy, timestamp)
    }

    /// Accuracy suitable for display, or `None` when unknown.
    pub fn precise_accuracy(&self) -> Option<f64> {
        if self.accuracy > 0.0 {
            Some(self.accuracy)
        } else {
            None
        }
    }

    /// True heading when available, magnetic otherwise.
    pub fn best_heading(&self) -> f64 {
        self.true_heading.unwrap_or(self.magnetic)
    }
}
