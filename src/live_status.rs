use serde::{Deserialize, Serialize};
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::sync::watch;

use crate::types::{
    current_timestamp, AuthorizationStatus, CalibrationQuality, HeadingSample, Mode, Phase, Reading,
};

/// Everything a presentation layer observes. Only the publisher task writes it.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct LiveStatus {
    pub timestamp: f64,
    pub phase: Phase,
    pub requested_mode: Mode,
    pub active_mode: Mode,
    /// False when no field provider is running; `reading` is then frozen
    pub streaming: bool,
    pub reading: Option<Reading>,
    pub calibration: Option<CalibrationQuality>,
    pub heading: Option<HeadingSample>,
    pub heading_available: bool,
    pub heading_running: bool,
    pub authorization: AuthorizationStatus,
    pub field_publishes: u64,
    pub heading_publishes: u64,
}

impl LiveStatus {
    pub fn new(requested_mode: Mode) -> Self {
        Self {
            timestamp: current_timestamp(),
            phase: Phase::Stopped,
            requested_mode,
            active_mode: requested_mode,
            streaming: false,
            reading: None,
            calibration: None,
            heading: None,
            heading_available: false,
            heading_running: false,
            authorization: AuthorizationStatus::NotDetermined,
            field_publishes: 0,
            heading_publishes: 0,
        }
    }

    /// Calibrated was asked for but the hardware could only run Raw.
    pub fn is_fallback(&self) -> bool {
        self.requested_mode != self.active_mode
    }

    pub fn apply(&mut self, update: Update) {
        match update {
            Update::Field {
                reading,
                calibration,
            } => {
                self.reading = Some(reading);
                self.calibration = if self.active_mode == Mode::Raw {
                    None
                } else {
                    calibration
                };
                self.field_publishes += 1;
            }
            Update::Heading(sample) => {
                self.heading = Some(sample);
                self.heading_publishes += 1;
            }
            Update::Mode {
                requested,
                active,
                streaming,
            } => {
                self.requested_mode = requested;
                self.active_mode = active;
                self.streaming = streaming;
                if active == Mode::Raw {
                    self.calibration = None;
                }
            }
            Update::Phase(phase) => {
                self.phase = phase;
                if phase.is_stopped() {
                    self.streaming = false;
                }
            }
            Update::HeadingSupport {
                available,
                authorization,
                running,
            } => {
                self.heading_available = available;
                self.authorization = authorization;
                self.heading_running = running;
            }
        }
        self.timestamp = current_timestamp();
    }
}

/// Hand-off from worker tasks to the publisher.
#[derive(Clone, Debug)]
pub enum Update {
    Field {
        reading: Reading,
        calibration: Option<CalibrationQuality>,
    },
    Heading(HeadingSample),
    Mode {
        requested: Mode,
        active: Mode,
        streaming: bool,
    },
    Phase(Phase),
    HeadingSupport {
        available: bool,
        authorization: AuthorizationStatus,
        running: bool,
    },
}

/// Owns the published state: applies each update in arrival order and
/// notifies observers. Ends when every update sender is gone.
pub async fn publisher_task(
    mut updates: UnboundedReceiver<Update>,
    observers: watch::Sender<LiveStatus>,
    mut status: LiveStatus,
) {
    while let Some(update) = updates.recv().await {
        status.apply(update);
        observers.send_replace(status.clone());
    }
    log::debug!("[PUBLISH] update channel closed");
}
