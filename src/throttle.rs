use tokio::time::{Duration, Instant};

/// Rate limiter for UI-facing publishes: admits at most one event per
/// `interval`. Rejected events are dropped, never buffered.
#[derive(Clone, Debug)]
pub struct PublishThrottle {
    interval: Duration,
    last_admitted: Option<Instant>,
    admitted: u64,
    dropped: u64,
}

impl PublishThrottle {
    pub fn new(interval: Duration) -> Self {
        PublishThrottle {
            interval,
            last_admitted: None,
            admitted: 0,
            dropped: 0,
        }
    }

    /// Returns true when `now` is at least `interval` past the last admitted event.
    pub fn admit(&mut self, now: Instant) -> bool {
        let ready = match self.last_admitted {
            None => true,
            Some(last) => now.saturating_duration_since(last) >= self.interval,
        };

        if ready {
            self.last_admitted = Some(now);
            self.admitted += 1;
        } else {
            self.dropped += 1;
        }
        ready
    }

    pub fn admitted(&self) -> u64 {
        self.admitted
    }

    pub fn dropped(&self) -> u64 {
        self.dropped
    }
}
