use chrono::{DateTime, Utc};
use std::fmt::Write;

use crate::live_status::LiveStatus;
use crate::units::FieldUnit;

pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S UTC";

pub fn format_timestamp(now: DateTime<Utc>) -> String {
    now.format(TIMESTAMP_FORMAT).to_string()
}

/// Plain-text rendering of a snapshot for the clipboard.
pub fn clipboard_text(status: &LiveStatus, unit: FieldUnit, now: DateTime<Utc>) -> String {
    let mut out = String::new();

    // Writing into a String cannot fail
    let _ = writeln!(out, "Magnetometer Reading");
    match &status.reading {
        Some(reading) => {
            let _ = writeln!(out, "X: {}", unit.format(reading.x));
            let _ = writeln!(out, "Y: {}", unit.format(reading.y));
            let _ = writeln!(out, "Z: {}", unit.format(reading.z));
            let _ = writeln!(out, "Magnitude: {}", unit.format(reading.magnitude));
            let _ = writeln!(out, "Angle: {:.1}°", reading.angle_degrees());
        }
        None => {
            let _ = writeln!(out, "Field: no data");
        }
    }

    match &status.heading {
        Some(heading) => {
            let _ = writeln!(out, "Heading: {:.1}° magnetic", heading.magnetic);
            if let Some(true_heading) = heading.true_heading {
                let _ = writeln!(out, "True Heading: {:.1}°", true_heading);
            }
            let _ = match heading.precise_accuracy() {
                Some(accuracy) => writeln!(out, "Heading Accuracy: ±{:.0}°", accuracy),
                None => writeln!(out, "Heading Accuracy: unknown"),
            };
        }
        None => {
            let _ = writeln!(out, "Heading: unavailable");
        }
    }

    if status.is_fallback() {
        let _ = writeln!(
            out,
            "Mode: {} (requested {})",
            status.active_mode, status.requested_mode
        );
    } else {
        let _ = writeln!(out, "Mode: {}", status.active_mode);
    }
    if let Some(quality) = status.calibration {
        let _ = writeln!(out, "Calibration: {}", quality);
    }
    let _ = write!(out, "Time: {}", format_timestamp(now));

    out
}
