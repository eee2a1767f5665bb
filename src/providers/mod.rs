//! Device sensor platform boundary.
//!
//! The controller only sees these traits. A provider pushes samples into the
//! sink it was started with, from whatever task or thread it likes, and must
//! treat `stop()` on an idle provider as a no-op.

pub mod heading;
pub mod simulated;
pub mod termux;

pub use heading::{SimulatedHeadingProvider, UnsupportedHeading};
pub use simulated::SimulatedFieldProvider;
pub use termux::TermuxFieldProvider;

use std::sync::Arc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::mpsc::Sender;

use crate::types::{AuthorizationStatus, FieldSample, HeadingSample};

pub type FieldSink = Sender<FieldSample>;
pub type HeadingSink = Sender<HeadingSample>;

/// A source of magnetic-field samples (bias-corrected or raw).
pub trait FieldProvider: Send + Sync {
    fn name(&self) -> &str;

    /// Whether this hardware can produce the stream at all.
    fn is_available(&self) -> bool;

    /// Begin delivering samples into `sink`. Called only when available.
    fn start(&self, sink: FieldSink);

    fn stop(&self);
}

/// Compass heading source plus the authorization that gates it.
pub trait HeadingProvider: Send + Sync {
    fn heading_available(&self) -> bool;

    fn authorization_status(&self) -> AuthorizationStatus;

    /// Ask the user for permission. Platforms may answer later through
    /// `SensorModeController::authorization_changed`.
    fn request_authorization(&self);

    fn start(&self, sink: HeadingSink);

    fn stop(&self);
}

/// The process-wide sensor handles owned by one controller.
#[derive(Clone)]
pub struct SensorPlatform {
    pub calibrated: Arc<dyn FieldProvider>,
    pub raw: Arc<dyn FieldProvider>,
    pub heading: Arc<dyn HeadingProvider>,
}

impl SensorPlatform {
    pub fn new(
        calibrated: Arc<dyn FieldProvider>,
        raw: Arc<dyn FieldProvider>,
        heading: Arc<dyn HeadingProvider>,
    ) -> Self {
        SensorPlatform {
            calibrated,
            raw,
            heading,
        }
    }
}

/// Outcome of handing one sample to a sink.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Delivery {
    Sent,
    /// Previous callback still in flight; sample dropped
    Busy,
    Closed,
}

/// Non-blocking delivery used by every provider: a full sink drops the sample.
pub fn deliver<T>(sink: &Sender<T>, item: T) -> Delivery {
    match sink.try_send(item) {
        Ok(_) => Delivery::Sent,
        Err(TrySendError::Full(_)) => Delivery::Busy,
        Err(TrySendError::Closed(_)) => Delivery::Closed,
    }
}
