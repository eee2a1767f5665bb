//! Magnetometer and compass readings behind a small sensor-mode state machine.
//!
//! [`controller::SensorModeController`] owns exactly one magnetic-field
//! subscription at a time, either the bias-corrected (calibrated) stream or the
//! raw magnetometer, and swaps between them without overlapping callbacks.
//! Observers read [`live_status::LiveStatus`] snapshots through a watch channel.

pub mod config;
pub mod controller;
pub mod error;
pub mod export;
pub mod live_status;
pub mod providers;
pub mod throttle;
pub mod types;
pub mod units;

pub use config::ControllerConfig;
pub use controller::SensorModeController;
pub use error::{SensorError, SensorResult};
pub use live_status::LiveStatus;
pub use providers::{FieldProvider, HeadingProvider, SensorPlatform};
pub use types::{AuthorizationStatus, CalibrationQuality, HeadingSample, Mode, Phase, Reading};
pub use units::FieldUnit;
