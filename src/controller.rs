//! Magnetic-field mode controller.
//!
//! Owns one field subscription at a time (calibrated or raw) plus the heading
//! subscription. Three kinds of tasks cooperate:
//!
//! - the transition worker, which alone starts and stops providers and runs
//!   commands strictly in order;
//! - the field callback worker, which drains provider samples one at a time
//!   and throttles what reaches the publisher;
//! - the heading worker, which forwards every heading sample.
//!
//! Phase and mode publishes happen while the control lock is held, so the
//! published sequence follows the order in which control state changed.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::mpsc::{self, UnboundedSender};
use tokio::sync::watch;
use tokio::time::{sleep_until, Instant};

use crate::config::ControllerConfig;
use crate::live_status::{publisher_task, LiveStatus, Update};
use crate::providers::{FieldSink, HeadingSink, SensorPlatform};
use crate::throttle::PublishThrottle;
use crate::types::{AuthorizationStatus, FieldSample, HeadingSample, Mode, Phase, Reading};

#[derive(Debug)]
enum Command {
    Start {
        mode: Mode,
        generation: u64,
        started_at: Instant,
    },
    Apply {
        mode: Mode,
        generation: u64,
        started_at: Instant,
    },
    /// Field already running; only heading still has to come up
    StartHeading,
    Stop,
    AuthorizationChanged(AuthorizationStatus),
}

#[derive(Debug)]
struct ControlState {
    phase: Phase,
    requested: Mode,
    active: Mode,
    streaming: bool,
    /// Set when a transition begins, cleared by its guard timer or by stop()
    transitioning: bool,
    /// Bumped by every transition and every stop; stale work compares against it
    generation: u64,
    /// Last generation whose providers the worker actually switched
    applied: u64,
    /// Set by start(), cleared by stop(); heading runs only while set
    heading_wanted: bool,
}

impl ControlState {
    fn begin_transition(&mut self, mode: Mode) -> (u64, Instant) {
        self.transitioning = true;
        self.generation += 1;
        self.phase = Phase::TransitioningTo(mode);
        (self.generation, Instant::now())
    }
}

struct Shared {
    control: Mutex<ControlState>,
    updates: UnboundedSender<Update>,
    config: ControllerConfig,
}

impl Shared {
    fn control(&self) -> MutexGuard<'_, ControlState> {
        self.control.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn publish(&self, update: Update) {
        // Publisher gone means the controller is shutting down
        let _ = self.updates.send(update);
    }

    /// Guard window elapsed: re-enable transitions and settle the phase.
    fn finish_transition(&self, generation: u64) {
        let mut control = self.control();
        if control.generation != generation || !control.transitioning {
            return;
        }
        control.transitioning = false;

        // If the worker has not switched providers yet it settles the phase itself
        if control.applied == generation {
            control.phase = Phase::Running(control.active);
            self.publish(Update::Phase(control.phase));
            log::debug!("[MODE] settled in {}", control.phase);
        }
    }
}

/// Serializes sensor-mode changes and publishes throttled snapshots.
///
/// Must be created inside a tokio runtime. `start`, `stop`, `request_mode`
/// and `authorization_changed` never block and may be called from any thread.
pub struct SensorModeController {
    shared: Arc<Shared>,
    commands: UnboundedSender<Command>,
    status: watch::Receiver<LiveStatus>,
}

impl SensorModeController {
    pub fn spawn(platform: SensorPlatform, config: ControllerConfig, initial_mode: Mode) -> Self {
        let initial = LiveStatus::new(initial_mode);
        let (updates_tx, updates_rx) = mpsc::unbounded_channel();
        let (status_tx, status_rx) = watch::channel(initial.clone());
        tokio::spawn(publisher_task(updates_rx, status_tx, initial));

        let (field_tx, field_rx) = mpsc::channel(config.field_channel_capacity.max(1));
        tokio::spawn(field_callback_worker(
            field_rx,
            updates_tx.clone(),
            config.publish_interval,
        ));

        let (heading_tx, heading_rx) = mpsc::channel(config.heading_channel_capacity.max(1));
        tokio::spawn(heading_worker(heading_rx, updates_tx.clone()));

        let _ = updates_tx.send(Update::HeadingSupport {
            available: platform.heading.heading_available(),
            authorization: platform.heading.authorization_status(),
            running: false,
        });

        let shared = Arc::new(Shared {
            control: Mutex::new(ControlState {
                phase: Phase::Stopped,
                requested: initial_mode,
                active: initial_mode,
                streaming: false,
                transitioning: false,
                generation: 0,
                applied: 0,
                heading_wanted: false,
            }),
            updates: updates_tx,
            config,
        });

        let (commands_tx, commands_rx) = mpsc::unbounded_channel();
        let worker = TransitionWorker {
            platform,
            shared: shared.clone(),
            field_sink: field_tx,
            heading_sink: heading_tx,
            heading_running: false,
        };
        tokio::spawn(worker.run(commands_rx));

        SensorModeController {
            shared,
            commands: commands_tx,
            status: status_rx,
        }
    }

    /// Begin heading updates and apply the requested mode. Each half is a
    /// no-op when already running, so a field stream started by
    /// `request_mode` still gets its heading here.
    pub fn start(&self) {
        let mut control = self.shared.control();
        let heading_was_wanted = control.heading_wanted;
        control.heading_wanted = true;

        if !control.phase.is_stopped() {
            if heading_was_wanted {
                log::debug!("[MODE] start ignored, already {}", control.phase);
            } else {
                self.send(Command::StartHeading);
            }
            return;
        }

        let mode = control.requested;
        let (generation, started_at) = control.begin_transition(mode);
        self.shared.publish(Update::Phase(control.phase));
        log::info!("[MODE] starting in {}", mode);
        self.send(Command::Start {
            mode,
            generation,
            started_at,
        });
    }

    /// Halt field and heading subscriptions. Safe to call repeatedly.
    pub fn stop(&self) {
        let mut control = self.shared.control();
        if control.phase.is_stopped() && !control.heading_wanted {
            return;
        }

        control.heading_wanted = false;
        control.phase = Phase::Stopped;
        control.streaming = false;
        control.transitioning = false;
        control.generation += 1;
        self.shared.publish(Update::Phase(Phase::Stopped));
        log::info!("[MODE] stopping");
        self.send(Command::Stop);
    }

    /// Switch to `mode`. While a transition is inside its guard window the
    /// request is dropped and nothing changes; returns whether it was taken.
    ///
    /// Dropping rather than queueing means rapid toggles settle on the first
    /// accepted mode, and a picker bound to the requested value can drift
    /// from the running stream until the next accepted request.
    pub fn request_mode(&self, mode: Mode) -> bool {
        let mut control = self.shared.control();
        if control.transitioning {
            log::debug!("[MODE] transition in flight, dropping request for {}", mode);
            return false;
        }

        control.requested = mode;
        let (generation, started_at) = control.begin_transition(mode);
        self.shared.publish(Update::Mode {
            requested: mode,
            active: control.active,
            streaming: control.streaming,
        });
        self.shared.publish(Update::Phase(control.phase));
        log::info!("[MODE] switching to {}", mode);
        self.send(Command::Apply {
            mode,
            generation,
            started_at,
        });
        true
    }

    /// Platform notification that heading authorization changed.
    pub fn authorization_changed(&self, status: AuthorizationStatus) {
        self.send(Command::AuthorizationChanged(status));
    }

    pub fn phase(&self) -> Phase {
        self.shared.control().phase
    }

    pub fn requested_mode(&self) -> Mode {
        self.shared.control().requested
    }

    pub fn active_mode(&self) -> Mode {
        self.shared.control().active
    }

    pub fn is_transitioning(&self) -> bool {
        self.shared.control().transitioning
    }

    /// Latest published state.
    pub fn snapshot(&self) -> LiveStatus {
        self.status.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<LiveStatus> {
        self.status.clone()
    }

    fn send(&self, command: Command) {
        if self.commands.send(command).is_err() {
            log::warn!("[MODE] transition worker has exited");
        }
    }
}

/// Runs on its own task; the only code that touches provider lifecycles.
struct TransitionWorker {
    platform: SensorPlatform,
    shared: Arc<Shared>,
    field_sink: FieldSink,
    heading_sink: HeadingSink,
    heading_running: bool,
}

impl TransitionWorker {
    async fn run(mut self, mut commands: mpsc::UnboundedReceiver<Command>) {
        while let Some(command) = commands.recv().await {
            match command {
                Command::Start {
                    mode,
                    generation,
                    started_at,
                } => {
                    if !self.is_current(generation) {
                        continue;
                    }
                    self.start_heading();
                    self.apply(mode, generation, started_at);
                }
                Command::Apply {
                    mode,
                    generation,
                    started_at,
                } => self.apply(mode, generation, started_at),
                Command::StartHeading => {
                    if self.shared.control().heading_wanted {
                        self.start_heading();
                    }
                }
                Command::Stop => self.teardown(),
                Command::AuthorizationChanged(status) => self.on_authorization(status),
            }
        }

        self.teardown();
        log::debug!("[MODE] transition worker exiting");
    }

    fn is_current(&self, generation: u64) -> bool {
        self.shared.control().generation == generation
    }

    fn apply(&mut self, mode: Mode, generation: u64, started_at: Instant) {
        if !self.is_current(generation) {
            return;
        }
        self.spawn_guard(generation, started_at);

        // Only one is running; stopping an idle provider is a no-op
        self.platform.calibrated.stop();
        self.platform.raw.stop();

        let (active, streaming) = match mode {
            Mode::Calibrated if self.platform.calibrated.is_available() => {
                self.platform.calibrated.start(self.field_sink.clone());
                (Mode::Calibrated, true)
            }
            Mode::Calibrated => {
                log::warn!(
                    "[MODE] {} unavailable, falling back to raw",
                    self.platform.calibrated.name()
                );
                (Mode::Raw, self.start_raw())
            }
            Mode::Raw => (Mode::Raw, self.start_raw()),
        };

        let mut control = self.shared.control();
        if control.generation != generation {
            // A stop overtook us; its queued command tears this down
            return;
        }
        control.active = active;
        control.streaming = streaming;
        control.applied = generation;
        control.phase = if control.transitioning {
            Phase::TransitioningTo(mode)
        } else {
            Phase::Running(active)
        };

        self.shared.publish(Update::Mode {
            requested: control.requested,
            active,
            streaming,
        });
        self.shared.publish(Update::Phase(control.phase));
    }

    fn start_raw(&self) -> bool {
        if self.platform.raw.is_available() {
            self.platform.raw.start(self.field_sink.clone());
            true
        } else {
            log::warn!("[MODE] {} unavailable, no field data", self.platform.raw.name());
            false
        }
    }

    fn spawn_guard(&self, generation: u64, started_at: Instant) {
        let shared = self.shared.clone();
        let deadline = started_at + shared.config.transition_guard;
        tokio::spawn(async move {
            sleep_until(deadline).await;
            shared.finish_transition(generation);
        });
    }

    fn start_heading(&mut self) {
        let heading = &self.platform.heading;
        let available = heading.heading_available();
        let mut authorization = heading.authorization_status();

        if available && authorization == AuthorizationStatus::NotDetermined {
            heading.request_authorization();
            authorization = heading.authorization_status();
        }

        if available && authorization.is_authorized() && !self.heading_running {
            heading.start(self.heading_sink.clone());
            self.heading_running = true;
            log::info!("[HEADING] started");
        } else if !available {
            log::info!("[HEADING] not supported on this device");
        } else if !authorization.is_authorized() {
            log::info!("[HEADING] waiting for authorization ({:?})", authorization);
        }

        self.publish_heading_support(available, authorization);
    }

    fn stop_heading(&mut self) {
        if self.heading_running {
            self.platform.heading.stop();
            self.heading_running = false;
            log::info!("[HEADING] stopped");
        }
    }

    fn on_authorization(&mut self, authorization: AuthorizationStatus) {
        let available = self.platform.heading.heading_available();
        let wanted = self.shared.control().heading_wanted;

        if authorization.is_authorized() && available && wanted && !self.heading_running {
            self.platform.heading.start(self.heading_sink.clone());
            self.heading_running = true;
            log::info!("[HEADING] started after authorization");
        } else if authorization.is_refused() {
            self.stop_heading();
        }

        self.publish_heading_support(available, authorization);
    }

    fn publish_heading_support(&self, available: bool, authorization: AuthorizationStatus) {
        self.shared.publish(Update::HeadingSupport {
            available,
            authorization,
            running: self.heading_running,
        });
    }

    fn teardown(&mut self) {
        self.platform.calibrated.stop();
        self.platform.raw.stop();
        self.stop_heading();
        self.publish_heading_support(
            self.platform.heading.heading_available(),
            self.platform.heading.authorization_status(),
        );
    }
}

/// Drains provider callbacks one at a time. Each sample becomes a reading;
/// only readings the throttle admits reach the publisher.
async fn field_callback_worker(
    mut samples: mpsc::Receiver<FieldSample>,
    updates: UnboundedSender<Update>,
    publish_interval: std::time::Duration,
) {
    let mut throttle = PublishThrottle::new(publish_interval);

    while let Some(sample) = samples.recv().await {
        let reading = Reading::from_sample(&sample);
        if !throttle.admit(Instant::now()) {
            continue;
        }
        let update = Update::Field {
            reading,
            calibration: sample.calibration,
        };
        if updates.send(update).is_err() {
            break;
        }
    }

    log::debug!(
        "[FIELD] callback worker exiting ({} published, {} dropped)",
        throttle.admitted(),
        throttle.dropped()
    );
}

async fn heading_worker(
    mut samples: mpsc::Receiver<HeadingSample>,
    updates: UnboundedSender<Update>,
) {
    while let Some(sample) = samples.recv().await {
        if updates.send(Update::Heading(sample)).is_err() {
            break;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::{Delivery, SimulatedFieldProvider, SimulatedHeadingProvider};
    use crate::types::CalibrationQuality;
    use approx::assert_relative_eq;
    use tokio::time::{sleep, Duration};

    struct Rig {
        controller: SensorModeController,
        calibrated: Arc<SimulatedFieldProvider>,
        raw: Arc<SimulatedFieldProvider>,
        heading: Arc<SimulatedHeadingProvider>,
    }

    fn rig_with(
        calibrated: SimulatedFieldProvider,
        raw: SimulatedFieldProvider,
        heading: SimulatedHeadingProvider,
        mode: Mode,
    ) -> Rig {
        let calibrated = Arc::new(calibrated);
        let raw = Arc::new(raw);
        let heading = Arc::new(heading);
        let platform = SensorPlatform::new(calibrated.clone(), raw.clone(), heading.clone());
        Rig {
            controller: SensorModeController::spawn(platform, ControllerConfig::default(), mode),
            calibrated,
            raw,
            heading,
        }
    }

    fn rig() -> Rig {
        rig_with(
            SimulatedFieldProvider::calibrated(),
            SimulatedFieldProvider::raw(),
            SimulatedHeadingProvider::new(),
            Mode::Calibrated,
        )
    }

    /// Let every ready task run without reaching any guard deadline.
    async fn settle() {
        sleep(Duration::from_millis(1)).await;
    }

    async fn past_guard() {
        sleep(Duration::from_millis(260)).await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_runs_calibrated_then_settles() {
        let rig = rig();
        assert_eq!(rig.controller.phase(), Phase::Stopped);

        rig.controller.start();
        settle().await;
        assert_eq!(rig.controller.phase(), Phase::TransitioningTo(Mode::Calibrated));
        assert!(rig.calibrated.is_running());
        assert!(!rig.raw.is_running());
        assert!(rig.heading.is_running());

        past_guard().await;
        assert_eq!(rig.controller.phase(), Phase::Running(Mode::Calibrated));
        assert!(!rig.controller.is_transitioning());

        let status = rig.controller.snapshot();
        assert_eq!(status.phase, Phase::Running(Mode::Calibrated));
        assert!(status.streaming);
        assert!(status.heading_running);
        assert!(!status.is_fallback());
    }

    #[tokio::test(start_paused = true)]
    async fn test_calibrated_unavailable_falls_back_to_raw() {
        let rig = rig_with(
            SimulatedFieldProvider::calibrated().unavailable(),
            SimulatedFieldProvider::raw(),
            SimulatedHeadingProvider::new(),
            Mode::Calibrated,
        );

        rig.controller.start();
        past_guard().await;

        assert_eq!(rig.controller.requested_mode(), Mode::Calibrated);
        assert_eq!(rig.controller.active_mode(), Mode::Raw);
        assert_eq!(rig.controller.phase(), Phase::Running(Mode::Raw));
        assert!(rig.raw.is_running());
        assert_eq!(rig.calibrated.starts(), 0);

        assert_eq!(rig.raw.emit(57.0, -12.0, -34.0), Delivery::Sent);
        settle().await;

        let status = rig.controller.snapshot();
        assert!(status.is_fallback());
        assert_eq!(status.requested_mode, Mode::Calibrated);
        assert_eq!(status.active_mode, Mode::Raw);
        assert_eq!(status.calibration, None);
        assert_eq!(status.reading.map(|r| r.x), Some(57.0));
    }

    #[tokio::test(start_paused = true)]
    async fn test_request_during_transition_is_dropped() {
        let rig = rig();
        rig.controller.start();
        settle().await;

        assert!(!rig.controller.request_mode(Mode::Raw));
        past_guard().await;

        assert_eq!(rig.controller.phase(), Phase::Running(Mode::Calibrated));
        assert_eq!(rig.controller.requested_mode(), Mode::Calibrated);
        assert_eq!(rig.raw.starts(), 0);
        assert_eq!(rig.controller.snapshot().requested_mode, Mode::Calibrated);

        assert!(rig.controller.request_mode(Mode::Raw));
        past_guard().await;
        assert_eq!(rig.controller.phase(), Phase::Running(Mode::Raw));
        assert_eq!(rig.calibrated.teardowns(), 1);
        assert!(rig.raw.is_running());
        assert!(!rig.calibrated.is_running());
    }

    #[tokio::test(start_paused = true)]
    async fn test_rapid_toggles_settle_on_first_accepted_mode() {
        let rig = rig();
        rig.controller.start();
        past_guard().await;

        assert!(rig.controller.request_mode(Mode::Raw));
        assert!(!rig.controller.request_mode(Mode::Calibrated));
        sleep(Duration::from_millis(100)).await;
        assert!(!rig.controller.request_mode(Mode::Calibrated));
        past_guard().await;

        assert_eq!(rig.controller.phase(), Phase::Running(Mode::Raw));
        assert_eq!(rig.controller.requested_mode(), Mode::Raw);
        assert_eq!(rig.calibrated.starts(), 1);
        assert_eq!(rig.raw.starts(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_double_stop_tears_down_once() {
        let rig = rig();
        rig.controller.start();
        past_guard().await;

        rig.controller.stop();
        rig.controller.stop();
        settle().await;

        assert_eq!(rig.controller.phase(), Phase::Stopped);
        assert_eq!(rig.calibrated.teardowns(), 1);
        assert_eq!(rig.raw.teardowns(), 0);
        assert_eq!(rig.heading.teardowns(), 1);

        let status = rig.controller.snapshot();
        assert_eq!(status.phase, Phase::Stopped);
        assert!(!status.streaming);
        assert!(!status.heading_running);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_before_start_is_noop() {
        let rig = rig();
        rig.controller.stop();
        settle().await;

        assert_eq!(rig.controller.phase(), Phase::Stopped);
        assert_eq!(rig.calibrated.teardowns(), 0);
        assert_eq!(rig.heading.teardowns(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_is_idempotent() {
        let rig = rig();
        rig.controller.start();
        rig.controller.start();
        past_guard().await;
        rig.controller.start();
        settle().await;

        assert_eq!(rig.calibrated.starts(), 1);
        assert_eq!(rig.heading.starts(), 1);
        assert_eq!(rig.controller.phase(), Phase::Running(Mode::Calibrated));
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_inside_guard_window_wins() {
        let rig = rig();
        rig.controller.start();
        settle().await;
        rig.controller.stop();
        past_guard().await;

        // The stale guard timer must not revive the phase
        assert_eq!(rig.controller.phase(), Phase::Stopped);
        assert!(!rig.calibrated.is_running());
        assert_eq!(rig.controller.snapshot().phase, Phase::Stopped);
    }

    #[tokio::test(start_paused = true)]
    async fn test_restart_right_after_stop() {
        let rig = rig();
        rig.controller.start();
        settle().await;
        rig.controller.stop();
        rig.controller.start();
        past_guard().await;

        assert_eq!(rig.controller.phase(), Phase::Running(Mode::Calibrated));
        assert!(rig.calibrated.is_running());
        assert_eq!(rig.calibrated.starts(), 2);
        assert_eq!(rig.calibrated.teardowns(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_request_from_stopped_starts_field_only() {
        let rig = rig();
        assert!(rig.controller.request_mode(Mode::Raw));
        past_guard().await;

        assert_eq!(rig.controller.phase(), Phase::Running(Mode::Raw));
        assert!(rig.raw.is_running());
        assert!(!rig.heading.is_running());
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_after_request_from_stopped_begins_heading() {
        let rig = rig();
        assert!(rig.controller.request_mode(Mode::Raw));
        past_guard().await;
        assert!(!rig.heading.is_running());

        rig.controller.start();
        settle().await;

        assert!(rig.heading.is_running());
        assert_eq!(rig.heading.starts(), 1);
        assert_eq!(rig.raw.starts(), 1);
        assert_eq!(rig.controller.phase(), Phase::Running(Mode::Raw));
        assert!(rig.controller.snapshot().heading_running);

        rig.controller.start();
        settle().await;
        assert_eq!(rig.heading.starts(), 1);

        rig.controller.stop();
        settle().await;
        assert!(!rig.heading.is_running());
        assert!(!rig.raw.is_running());
    }

    #[tokio::test(start_paused = true)]
    async fn test_raw_unavailable_freezes_last_reading() {
        let rig = rig_with(
            SimulatedFieldProvider::calibrated(),
            SimulatedFieldProvider::raw(),
            SimulatedHeadingProvider::new(),
            Mode::Raw,
        );
        rig.controller.start();
        past_guard().await;
        rig.raw.emit(10.0, 20.0, 30.0);
        settle().await;

        rig.raw.set_available(false);
        assert!(rig.controller.request_mode(Mode::Raw));
        past_guard().await;

        assert_eq!(rig.controller.phase(), Phase::Running(Mode::Raw));
        assert!(!rig.raw.is_running());
        let status = rig.controller.snapshot();
        assert!(!status.streaming);
        assert_eq!(status.reading.map(|r| (r.x, r.y, r.z)), Some((10.0, 20.0, 30.0)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_nothing_available_runs_no_stream() {
        let rig = rig_with(
            SimulatedFieldProvider::calibrated().unavailable(),
            SimulatedFieldProvider::raw().unavailable(),
            SimulatedHeadingProvider::new().unavailable(),
            Mode::Calibrated,
        );
        rig.controller.start();
        past_guard().await;

        let status = rig.controller.snapshot();
        assert_eq!(status.phase, Phase::Running(Mode::Raw));
        assert_eq!(status.requested_mode, Mode::Calibrated);
        assert!(!status.streaming);
        assert!(status.reading.is_none());
        assert!(!status.heading_available);
        assert_eq!(rig.heading.starts(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_publishes_are_spaced_by_throttle() {
        let rig = rig();
        rig.controller.start();
        past_guard().await;

        let seen = Arc::new(Mutex::new(Vec::new()));
        let mut rx = rig.controller.subscribe();
        let mut last = rx.borrow_and_update().field_publishes;
        assert_eq!(last, 0);
        let recorder = {
            let seen = seen.clone();
            tokio::spawn(async move {
                while rx.changed().await.is_ok() {
                    let count = rx.borrow_and_update().field_publishes;
                    if count != last {
                        last = count;
                        seen.lock().unwrap().push(Instant::now());
                    }
                }
            })
        };

        // 100 Hz for 600 ms
        for i in 0..60 {
            assert_ne!(rig.calibrated.emit(20.0 + i as f64, 0.0, -40.0), Delivery::Closed);
            sleep(Duration::from_millis(10)).await;
        }
        recorder.abort();

        let seen = seen.lock().unwrap();
        assert!((11..=13).contains(&seen.len()), "published {} times", seen.len());
        for pair in seen.windows(2) {
            assert!(pair[1] - pair[0] >= Duration::from_millis(50));
        }

        let status = rig.controller.snapshot();
        assert_eq!(status.calibration, Some(CalibrationQuality::High));
        assert_eq!(status.field_publishes as usize, seen.len());
    }

    #[tokio::test(start_paused = true)]
    async fn test_heading_is_normalized_and_not_throttled() {
        let rig = rig();
        rig.controller.start();
        settle().await;

        rig.heading.emit(370.0);
        settle().await;
        let heading = rig.controller.snapshot().heading.unwrap();
        assert_relative_eq!(heading.magnetic, 10.0);
        assert_eq!(heading.true_heading, None);

        for angle in [1.0, 2.0, 3.0, 4.0] {
            rig.heading.emit(angle);
            settle().await;
        }
        assert_eq!(rig.controller.snapshot().heading_publishes, 5);
    }

    #[tokio::test(start_paused = true)]
    async fn test_denied_authorization_keeps_heading_idle() {
        let rig = rig_with(
            SimulatedFieldProvider::calibrated(),
            SimulatedFieldProvider::raw(),
            SimulatedHeadingProvider::new().with_authorization(
                AuthorizationStatus::NotDetermined,
                AuthorizationStatus::Denied,
            ),
            Mode::Calibrated,
        );
        rig.controller.start();
        past_guard().await;

        assert_eq!(rig.heading.authorization_requests(), 1);
        assert_eq!(rig.heading.starts(), 0);
        assert!(rig.calibrated.is_running());

        let status = rig.controller.snapshot();
        assert_eq!(status.authorization, AuthorizationStatus::Denied);
        assert!(status.heading_available);
        assert!(!status.heading_running);

        rig.heading.set_authorization(AuthorizationStatus::Authorized);
        rig.controller.authorization_changed(AuthorizationStatus::Authorized);
        settle().await;
        assert!(rig.heading.is_running());
        assert!(rig.controller.snapshot().heading_running);
    }

    #[tokio::test(start_paused = true)]
    async fn test_revoked_authorization_stops_heading() {
        let rig = rig();
        rig.controller.start();
        past_guard().await;

        rig.heading.set_authorization(AuthorizationStatus::Denied);
        rig.controller.authorization_changed(AuthorizationStatus::Denied);
        settle().await;

        assert_eq!(rig.heading.teardowns(), 1);
        assert!(rig.calibrated.is_running());
        assert_eq!(rig.controller.snapshot().authorization, AuthorizationStatus::Denied);
    }

    #[tokio::test(start_paused = true)]
    async fn test_authorization_while_stopped_does_not_start_heading() {
        let rig = rig();
        rig.controller.authorization_changed(AuthorizationStatus::Authorized);
        settle().await;
        assert!(!rig.heading.is_running());
    }

    #[tokio::test(start_paused = true)]
    async fn test_drop_releases_sensors() {
        let rig = rig();
        rig.controller.start();
        past_guard().await;
        assert!(rig.calibrated.is_running());

        let Rig {
            controller,
            calibrated,
            heading,
            ..
        } = rig;
        drop(controller);
        settle().await;

        assert!(!calibrated.is_running());
        assert!(!heading.is_running());
    }
}
