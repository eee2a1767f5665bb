use nalgebra::Vector3;
use serde::{Deserialize, Serialize};

use super::CalibrationQuality;

/// One callback's worth of field data from a provider, in microtesla.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FieldSample {
    pub timestamp: f64,
    pub x: f64,
    pub y: f64,
    pub z: f64,
    /// Only the bias-corrected source reports a quality
    pub calibration: Option<CalibrationQuality>,
}

impl FieldSample {
    pub fn new(x: f64, y: f64, z: f64, timestamp: f64) -> Self {
        Self {
            timestamp,
            x,
            y,
            z,
            calibration: None,
        }
    }

    pub fn with_calibration(mut self, quality: CalibrationQuality) -> Self {
        self.calibration = Some(quality);
        self
    }
}

/// Immutable snapshot derived from a sample: components plus magnitude and
/// planar angle. Build it with [`Reading::new`] so the derived values agree.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Reading {
    pub timestamp: f64,
    pub x: f64,
    pub y: f64,
    pub z: f64,
    /// Euclidean norm, µT
    pub magnitude: f64,
    /// atan2(y, x), radians
    pub angle: f64,
}

impl Reading {
    pub fn new(x: f64, y: f64, z: f64, timestamp: f64) -> Self {
        let field = Vector3::new(x, y, z);
        Self {
            timestamp,
            x,
            y,
            z,
            magnitude: field.norm(),
            angle: y.atan2(x),
        }
    }

    pub fn from_sample(sample: &FieldSample) -> Self {
        Self::new(sample.x, sample.y, sample.z, sample.timestamp)
    }

    pub fn angle_degrees(&self) -> f64 {
        self.angle.to_degrees()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_magnitude_and_angle() {
        let reading = Reading::new(30.0, 0.0, 40.0, 0.0);
        assert_relative_eq!(reading.magnitude, 50.0);
        assert_relative_eq!(reading.angle, 0.0);
    }

    #[test]
    fn test_angle_follows_atan2_quadrants() {
        let reading = Reading::new(-10.0, -10.0, 5.0, 0.0);
        assert_relative_eq!(reading.angle, (-10.0f64).atan2(-10.0));
        assert_relative_eq!(reading.angle_degrees(), -135.0, epsilon = 1e-9);
        assert_relative_eq!(
            reading.magnitude,
            (100.0f64 + 100.0 + 25.0).sqrt(),
            epsilon = 1e-12
        );
    }

    #[test]
    fn test_negative_components_keep_sign() {
        let sample = FieldSample::new(-22.5, 4.0, -41.0, 12.5)
            .with_calibration(CalibrationQuality::Medium);
        let reading = Reading::from_sample(&sample);
        assert_eq!(reading.x, -22.5);
        assert_eq!(reading.z, -41.0);
        assert_eq!(reading.timestamp, 12.5);
        assert_relative_eq!(reading.magnitude, (22.5f64 * 22.5 + 16.0 + 41.0 * 41.0).sqrt());
    }
}
