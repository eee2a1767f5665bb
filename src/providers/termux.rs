//! Field provider backed by the Termux:API `termux-sensor` command.
//!
//! Android exposes the bias-corrected field as a plain magnetometer sensor and
//! the raw one as "... Uncalibrated" (six values: raw xyz then estimated bias).

use serde_json::Value;
use std::sync::{Mutex, MutexGuard, PoisonError};
use tokio::process::Command;
use tokio::task::JoinHandle;
use tokio::time::{interval, Duration, MissedTickBehavior};

use super::{deliver, Delivery, FieldProvider, FieldSink};
use crate::error::{SensorError, SensorResult};
use crate::types::{current_timestamp, CalibrationQuality, FieldSample};

pub const CALIBRATED_QUERY: &str = "magnetic field";
pub const RAW_QUERY: &str = "magnetic field uncalibrated";

pub struct TermuxFieldProvider {
    label: String,
    sensor: Option<String>,
    calibrated: bool,
    poll_interval: Duration,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl TermuxFieldProvider {
    /// List the device's sensors once and bind to the first name matching `query`.
    pub async fn detect(query: &str, calibrated: bool, poll_interval: Duration) -> Self {
        let sensor = match list_sensors().await {
            Ok(names) => find_sensor(&names, query),
            Err(e) => {
                log::warn!("[TERMUX] sensor listing failed: {}", e);
                None
            }
        };

        match &sensor {
            Some(name) => log::info!("[TERMUX] '{}' -> {}", query, name),
            None => log::warn!("[TERMUX] no sensor matches '{}'", query),
        }

        TermuxFieldProvider {
            label: if calibrated { "termux-calibrated" } else { "termux-raw" }.to_string(),
            sensor,
            calibrated,
            poll_interval,
            task: Mutex::new(None),
        }
    }

    pub fn sensor(&self) -> Option<&str> {
        self.sensor.as_deref()
    }

    fn task(&self) -> MutexGuard<'_, Option<JoinHandle<()>>> {
        self.task.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl FieldProvider for TermuxFieldProvider {
    fn name(&self) -> &str {
        &self.label
    }

    fn is_available(&self) -> bool {
        self.sensor.is_some()
    }

    fn start(&self, sink: FieldSink) {
        let Some(sensor) = self.sensor.clone() else {
            return;
        };
        let mut task = self.task();
        if task.is_some() {
            return;
        }
        *task = Some(tokio::spawn(poll_loop(
            sink,
            sensor,
            self.calibrated,
            self.poll_interval,
        )));
    }

    fn stop(&self) {
        let Some(task) = self.task().take() else {
            return;
        };
        task.abort();

        // `-c` releases every termux sensor, including one the next provider's
        // poll loop may be reading right now; that read fails or prints `{}`,
        // is skipped, and the following tick succeeds
        if let Err(e) = Command::new("termux-sensor").arg("-c").spawn() {
            log::warn!("[TERMUX] cleanup failed: {}", e);
        }
    }
}

async fn poll_loop(sink: FieldSink, sensor: String, calibrated: bool, period: Duration) {
    let mut ticker = interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut sample_count = 0u64;

    loop {
        ticker.tick().await;

        let sample = match read_sensor(&sensor).await {
            Ok(sample) => sample,
            Err(e) => {
                log::debug!("[TERMUX] {}: {}", sensor, e);
                continue;
            }
        };
        let sample = if calibrated {
            sample
        } else {
            FieldSample {
                calibration: None,
                ..sample
            }
        };

        match deliver(&sink, sample) {
            Delivery::Sent => {
                sample_count += 1;
                if sample_count % 100 == 0 {
                    log::debug!("[TERMUX] {} {} samples", sensor, sample_count);
                }
            }
            Delivery::Busy => {}
            Delivery::Closed => break,
        }
    }
}

async fn list_sensors() -> SensorResult<Vec<String>> {
    let output = Command::new("termux-sensor")
        .arg("-l")
        .output()
        .await
        .map_err(|e| SensorError::Command(e.to_string()))?;
    parse_sensor_list(&String::from_utf8_lossy(&output.stdout))
}

async fn read_sensor(sensor: &str) -> SensorResult<FieldSample> {
    let output = Command::new("termux-sensor")
        .args(["-n", "1", "-s", sensor])
        .output()
        .await
        .map_err(|e| SensorError::Command(e.to_string()))?;
    parse_sensor_output(&String::from_utf8_lossy(&output.stdout), current_timestamp())
}

/// Parse `termux-sensor -l` output: `{"sensors": ["name", ...]}`.
pub fn parse_sensor_list(text: &str) -> SensorResult<Vec<String>> {
    let value: Value =
        serde_json::from_str(text.trim()).map_err(|e| SensorError::Parse(e.to_string()))?;
    let sensors = value
        .get("sensors")
        .and_then(Value::as_array)
        .ok_or_else(|| SensorError::Parse("missing 'sensors' array".to_string()))?;
    Ok(sensors
        .iter()
        .filter_map(|s| s.as_str().map(str::to_string))
        .collect())
}

/// Case-insensitive match; plain queries skip the "uncalibrated" variant.
pub fn find_sensor(names: &[String], query: &str) -> Option<String> {
    let query = query.to_lowercase();
    let wants_uncalibrated = query.contains("uncalibrated");
    names
        .iter()
        .find(|name| {
            let lower = name.to_lowercase();
            lower.contains(&query) && (wants_uncalibrated || !lower.contains("uncalibrated"))
        })
        .cloned()
}

/// Parse one reading. termux-sensor may print an empty `{}` before the data,
/// so every JSON object in `text` is tried in order.
pub fn parse_sensor_output(text: &str, timestamp: f64) -> SensorResult<FieldSample> {
    for value in serde_json::Deserializer::from_str(text).into_iter::<Value>() {
        let value = value.map_err(|e| SensorError::Parse(e.to_string()))?;
        let Some(object) = value.as_object() else {
            continue;
        };

        for event in object.values() {
            let Some(values) = event.get("values").and_then(Value::as_array) else {
                continue;
            };
            let components: Vec<f64> = values.iter().filter_map(Value::as_f64).collect();
            if components.len() < 3 {
                return Err(SensorError::Parse(format!(
                    "expected 3 values, got {}",
                    components.len()
                )));
            }

            let mut sample = FieldSample::new(components[0], components[1], components[2], timestamp);
            sample.calibration = event
                .get("accuracy")
                .and_then(Value::as_i64)
                .and_then(CalibrationQuality::from_accuracy_code);
            return Ok(sample);
        }
    }

    Err(SensorError::Parse("no sensor event in output".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_sensor_list() {
        let text = r#"{"sensors": ["LSM6DSO Accelerometer", "AK09918 Magnetic Field", "AK09918 Magnetic Field Uncalibrated"]}"#;
        let names = parse_sensor_list(text).unwrap();
        assert_eq!(names.len(), 3);

        assert_eq!(
            find_sensor(&names, CALIBRATED_QUERY).as_deref(),
            Some("AK09918 Magnetic Field")
        );
        assert_eq!(
            find_sensor(&names, RAW_QUERY).as_deref(),
            Some("AK09918 Magnetic Field Uncalibrated")
        );
        assert_eq!(find_sensor(&names, "gyroscope"), None);
    }

    #[test]
    fn test_parse_uncalibrated_output_takes_raw_components() {
        let text = r#"{}
{
  "AK09918 Magnetic Field Uncalibrated": {
    "values": [
      41.5,
      -20.25,
      -33.0,
      12.0,
      -3.0,
      7.5
    ]
  }
}"#;
        let sample = parse_sensor_output(text, 10.0).unwrap();
        assert_eq!((sample.x, sample.y, sample.z), (41.5, -20.25, -33.0));
        assert_eq!(sample.calibration, None);
        assert_eq!(sample.timestamp, 10.0);
    }

    #[test]
    fn test_unmatched_sensor_is_unavailable() {
        let provider = TermuxFieldProvider {
            label: "termux-raw".to_string(),
            sensor: None,
            calibrated: false,
            poll_interval: Duration::from_millis(10),
            task: Mutex::new(None),
        };
        assert_eq!(provider.sensor(), None);
        assert!(!provider.is_available());
    }

    #[test]
    fn test_parse_accuracy() {
        let text = r#"{"Mag": {"values": [1.0, 2.0, 3.0], "accuracy": 2}}"#;
        let sample = parse_sensor_output(text, 0.0).unwrap();
        assert_eq!(sample.calibration, Some(CalibrationQuality::Medium));
    }

    #[test]
    fn test_parse_failures() {
        assert!(matches!(parse_sensor_output("{}", 0.0), Err(SensorError::Parse(_))));
        assert!(parse_sensor_output(r#"{"Mag": {"values": [1.0]}}"#, 0.0).is_err());
        assert!(parse_sensor_list("not json").is_err());
    }
}
