use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use tokio::task::JoinHandle;
use tokio::time::{interval, Duration};

use super::{deliver, Delivery, FieldProvider, FieldSink};
use crate::types::{current_timestamp, CalibrationQuality, FieldSample};

/// Horizontal and vertical Earth-field components used by the waveform, µT
const HORIZONTAL_UT: f64 = 22.0;
const VERTICAL_UT: f64 = -42.0;

/// Offset a nearby magnet or steel case adds to an uncorrected magnetometer, µT
const DEFAULT_HARD_IRON: (f64, f64, f64) = (35.0, -12.0, 8.0);

#[derive(Default)]
struct SimState {
    sink: Option<FieldSink>,
    task: Option<JoinHandle<()>>,
    starts: u64,
    teardowns: u64,
}

/// Field provider that produces a slowly rotating Earth field, or nothing at
/// all until [`SimulatedFieldProvider::emit`] is called.
pub struct SimulatedFieldProvider {
    name: String,
    available: AtomicBool,
    calibration: Option<CalibrationQuality>,
    hard_iron: (f64, f64, f64),
    stream_interval: Option<Duration>,
    state: Mutex<SimState>,
}

impl SimulatedFieldProvider {
    pub fn new(name: &str) -> Self {
        SimulatedFieldProvider {
            name: name.to_string(),
            available: AtomicBool::new(true),
            calibration: None,
            hard_iron: (0.0, 0.0, 0.0),
            stream_interval: None,
            state: Mutex::new(SimState::default()),
        }
    }

    /// Bias-corrected source reporting high calibration quality
    pub fn calibrated() -> Self {
        Self::new("calibrated").with_calibration(CalibrationQuality::High)
    }

    /// Uncorrected source carrying a fixed hard-iron offset
    pub fn raw() -> Self {
        Self::new("raw").with_hard_iron(DEFAULT_HARD_IRON)
    }

    pub fn with_calibration(mut self, quality: CalibrationQuality) -> Self {
        self.calibration = Some(quality);
        self
    }

    pub fn with_hard_iron(mut self, offset: (f64, f64, f64)) -> Self {
        self.hard_iron = offset;
        self
    }

    /// Emit waveform samples every `period` while started.
    pub fn with_stream(mut self, period: Duration) -> Self {
        self.stream_interval = Some(period);
        self
    }

    pub fn unavailable(self) -> Self {
        self.available.store(false, Ordering::SeqCst);
        self
    }

    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    pub fn is_running(&self) -> bool {
        self.state().sink.is_some()
    }

    /// Number of times the provider actually started a stream
    pub fn starts(&self) -> u64 {
        self.state().starts
    }

    /// Number of stop calls that tore down a running stream
    pub fn teardowns(&self) -> u64 {
        self.state().teardowns
    }

    /// Push one sample as if the hardware had called back.
    pub fn emit(&self, x: f64, y: f64, z: f64) -> Delivery {
        let sink = match self.state().sink.clone() {
            Some(sink) => sink,
            None => return Delivery::Closed,
        };
        deliver(&sink, self.sample(x, y, z, current_timestamp()))
    }

    fn sample(&self, x: f64, y: f64, z: f64, timestamp: f64) -> FieldSample {
        let sample = FieldSample::new(x, y, z, timestamp);
        match self.calibration {
            Some(quality) => sample.with_calibration(quality),
            None => sample,
        }
    }

    fn state(&self) -> MutexGuard<'_, SimState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl FieldProvider for SimulatedFieldProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn is_available(&self) -> bool {
        self.available.load(Ordering::SeqCst)
    }

    fn start(&self, sink: FieldSink) {
        let mut state = self.state();
        if state.sink.is_some() {
            log::debug!("[SIM] {} already streaming", self.name);
            return;
        }

        state.starts += 1;
        if let Some(period) = self.stream_interval {
            state.task = Some(tokio::spawn(stream_loop(
                sink.clone(),
                period,
                self.hard_iron,
                self.calibration,
                self.name.clone(),
            )));
        }
        state.sink = Some(sink);
        log::debug!("[SIM] {} started", self.name);
    }

    fn stop(&self) {
        let mut state = self.state();
        if state.sink.take().is_none() {
            return;
        }
        if let Some(task) = state.task.take() {
            task.abort();
        }
        state.teardowns += 1;
        log::debug!("[SIM] {} stopped", self.name);
    }
}

/// Field seen by a device turning slowly on a table, plus `hard_iron`.
pub fn waveform(t: f64, hard_iron: (f64, f64, f64)) -> (f64, f64, f64) {
    use std::f64::consts::PI;
    let yaw = t * 0.2;
    (
        HORIZONTAL_UT * yaw.cos() + (t * 2.0 * PI).sin() * 0.15 + hard_iron.0,
        -HORIZONTAL_UT * yaw.sin() + (t * 2.0 * PI).cos() * 0.15 + hard_iron.1,
        VERTICAL_UT + (t * PI).sin() * 0.3 + hard_iron.2,
    )
}

async fn stream_loop(
    sink: FieldSink,
    period: Duration,
    hard_iron: (f64, f64, f64),
    calibration: Option<CalibrationQuality>,
    name: String,
) {
    let mut ticker = interval(period);
    let mut sample_count = 0u64;

    loop {
        ticker.tick().await;

        let t = sample_count as f64 * period.as_secs_f64();
        let (x, y, z) = waveform(t, hard_iron);
        let mut sample = FieldSample::new(x, y, z, current_timestamp());
        sample.calibration = calibration;

        match deliver(&sink, sample) {
            Delivery::Sent | Delivery::Busy => {
                sample_count += 1;
                if sample_count % 500 == 0 {
                    log::trace!("[SIM] {} {} samples", name, sample_count);
                }
            }
            Delivery::Closed => {
                log::debug!("[SIM] {} sink closed after {} samples", name, sample_count);
                break;
            }
        }
    }
}
