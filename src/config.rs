use std::time::Duration;

/// Timing knobs for [`crate::controller::SensorModeController`].
#[derive(Clone, Debug)]
pub struct ControllerConfig {
    /// Minimum time between the start of one mode transition and the next
    pub transition_guard: Duration,
    /// Minimum spacing of field publishes (20 Hz)
    pub publish_interval: Duration,
    /// In-flight field callbacks; 1 keeps delivery strictly sequential
    pub field_channel_capacity: usize,
    pub heading_channel_capacity: usize,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            transition_guard: Duration::from_millis(250),
            publish_interval: Duration::from_millis(50),
            field_channel_capacity: 1,
            heading_channel_capacity: 1,
        }
    }
}

impl ControllerConfig {
    pub fn with_transition_guard(mut self, guard: Duration) -> Self {
        self.transition_guard = guard;
        self
    }

    pub fn with_publish_interval(mut self, interval: Duration) -> Self {
        self.publish_interval = interval;
        self
    }
}
