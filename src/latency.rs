// Latency Module
// Artificial delays: the fixed delay before a built-in handler answers and the
// per-chunk pacing of the streaming emulator.

use std::time::Duration;

/// Default spacing between streamed chunks
pub const DEFAULT_CHUNK_INTERVAL_MS: u64 = 20;

/// Timing applied to built-in responses
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LatencyProfile {
    /// Delay before a built-in handler's response is delivered
    pub response_delay: Duration,
    /// Interval between two streamed chunks
    pub chunk_interval: Duration,
}

impl LatencyProfile {
    pub fn new(response_delay_ms: u64, chunk_interval_ms: u64) -> Self {
        Self {
            response_delay: Duration::from_millis(response_delay_ms),
            chunk_interval: Duration::from_millis(chunk_interval_ms),
        }
    }

    /// No delays at all (for fast tests)
    pub fn instant() -> Self {
        Self::new(0, 0)
    }

    /// Sleep for the response delay, if any
    pub async fn delay_response(&self) {
        if !self.response_delay.is_zero() {
            tokio::time::sleep(self.response_delay).await;
        }
    }

    /// A pacer that yields once per chunk interval
    pub fn pacer(&self) -> Pacer {
        Pacer::new(self.chunk_interval)
    }
}

impl Default for LatencyProfile {
    fn default() -> Self {
        Self::new(0, DEFAULT_CHUNK_INTERVAL_MS)
    }
}

/// Fixed-rate ticker for stream emission. A zero interval never waits.
pub struct Pacer {
    interval: Option<tokio::time::Interval>,
}

impl Pacer {
    pub fn new(period: Duration) -> Self {
        let interval = (!period.is_zero()).then(|| {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            interval
        });
        Self { interval }
    }

    /// Wait for the next emission slot
    pub async fn tick(&mut self) {
        match self.interval.as_mut() {
            Some(interval) => {
                interval.tick().await;
            }
            None => tokio::task::yield_now().await,
        }
    }
}
