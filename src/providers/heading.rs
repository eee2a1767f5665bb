use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use tokio::task::JoinHandle;
use tokio::time::{interval, Duration};

use super::{deliver, Delivery, HeadingProvider, HeadingSink};
use crate::types::{current_timestamp, normalize_degrees, AuthorizationStatus, HeadingSample};

/// Platforms without a compass.
#[derive(Clone, Copy, Debug, Default)]
pub struct UnsupportedHeading;

impl HeadingProvider for UnsupportedHeading {
    fn heading_available(&self) -> bool {
        false
    }

    fn authorization_status(&self) -> AuthorizationStatus {
        AuthorizationStatus::Restricted
    }

    fn request_authorization(&self) {}

    fn start(&self, _sink: HeadingSink) {}

    fn stop(&self) {}
}

struct HeadingState {
    authorization: AuthorizationStatus,
    sink: Option<HeadingSink>,
    task: Option<JoinHandle<()>>,
    starts: u64,
    teardowns: u64,
    authorization_requests: u64,
}

/// Heading source with scriptable capability and authorization.
pub struct SimulatedHeadingProvider {
    available: AtomicBool,
    /// Status the simulated user picks when asked
    grant: AuthorizationStatus,
    declination: Option<f64>,
    accuracy: f64,
    stream_interval: Option<Duration>,
    state: Mutex<HeadingState>,
}

impl SimulatedHeadingProvider {
    pub fn new() -> Self {
        SimulatedHeadingProvider {
            available: AtomicBool::new(true),
            grant: AuthorizationStatus::Authorized,
            declination: None,
            accuracy: 5.0,
            stream_interval: None,
            state: Mutex::new(HeadingState {
                authorization: AuthorizationStatus::Authorized,
                sink: None,
                task: None,
                starts: 0,
                teardowns: 0,
                authorization_requests: 0,
            }),
        }
    }

    pub fn unavailable(self) -> Self {
        self.available.store(false, Ordering::SeqCst);
        self
    }

    /// Start out in `status`; a request resolves to `grant`.
    pub fn with_authorization(self, status: AuthorizationStatus, grant: AuthorizationStatus) -> Self {
        self.state().authorization = status;
        SimulatedHeadingProvider { grant, ..self }
    }

    /// Report true headings offset from magnetic by `degrees` (east positive).
    pub fn with_declination(mut self, degrees: f64) -> Self {
        self.declination = Some(degrees);
        self
    }

    pub fn with_accuracy(mut self, degrees: f64) -> Self {
        self.accuracy = degrees;
        self
    }

    pub fn with_stream(mut self, period: Duration) -> Self {
        self.stream_interval = Some(period);
        self
    }

    /// Change authorization as if the user edited it in system settings.
    pub fn set_authorization(&self, status: AuthorizationStatus) {
        self.state().authorization = status;
    }

    pub fn is_running(&self) -> bool {
        self.state().sink.is_some()
    }

    pub fn starts(&self) -> u64 {
        self.state().starts
    }

    pub fn teardowns(&self) -> u64 {
        self.state().teardowns
    }

    pub fn authorization_requests(&self) -> u64 {
        self.state().authorization_requests
    }

    /// Push one heading; `magnetic` may be any angle, it is normalized.
    pub fn emit(&self, magnetic: f64) -> Delivery {
        let sink = match self.state().sink.clone() {
            Some(sink) => sink,
            None => return Delivery::Closed,
        };
        deliver(&sink, self.sample(magnetic))
    }

    fn sample(&self, magnetic: f64) -> HeadingSample {
        heading_sample(magnetic, self.declination, self.accuracy)
    }

    fn state(&self) -> MutexGuard<'_, HeadingState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for SimulatedHeadingProvider {
    fn default() -> Self {
        Self::new()
    }
}

fn heading_sample(magnetic: f64, declination: Option<f64>, accuracy: f64) -> HeadingSample {
    // Platforms signal a missing geographic reference with a negative value
    let true_heading = declination
        .map(|d| normalize_degrees(magnetic + d))
        .unwrap_or(-1.0);
    HeadingSample::from_platform(magnetic, true_heading, accuracy, current_timestamp())
}

impl HeadingProvider for SimulatedHeadingProvider {
    fn heading_available(&self) -> bool {
        self.available.load(Ordering::SeqCst)
    }

    fn authorization_status(&self) -> AuthorizationStatus {
        self.state().authorization
    }

    fn request_authorization(&self) {
        let mut state = self.state();
        state.authorization_requests += 1;
        if state.authorization == AuthorizationStatus::NotDetermined {
            state.authorization = self.grant;
        }
    }

    fn start(&self, sink: HeadingSink) {
        let mut state = self.state();
        if state.sink.is_some() {
            return;
        }
        state.starts += 1;
        if let Some(period) = self.stream_interval {
            state.task = Some(tokio::spawn(rotate_loop(
                sink.clone(),
                period,
                self.declination,
                self.accuracy,
            )));
        }
        state.sink = Some(sink);
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
    }
}

/// Turn 3° per tick, wrapping through north.
async fn rotate_loop(sink: HeadingSink, period: Duration, declination: Option<f64>, accuracy: f64) {
    let mut ticker = interval(period);
    let mut magnetic = 0.0;

    loop {
        ticker.tick().await;
        if deliver(&sink, heading_sample(magnetic, declination, accuracy)) == Delivery::Closed {
            break;
        }
        magnetic += 3.0;
    }
}
