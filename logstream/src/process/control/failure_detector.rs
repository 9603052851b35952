use super::*;

use tokio::time::Instant;

/// Detects the silence of the leader.
/// The timeout is drawn again on every heartbeat so members don't time out together.
pub struct FailureDetector {
    last_heartbeat: Instant,
    timeout: Duration,
}

impl FailureDetector {
    pub fn new(timeout: Duration) -> Self {
        Self {
            last_heartbeat: Instant::now(),
            timeout,
        }
    }

    pub fn receive_heartbeat(&mut self, next_timeout: Duration) {
        self.last_heartbeat = Instant::now();
        self.timeout = next_timeout;
    }

    pub fn elapsed(&self) -> Duration {
        self.last_heartbeat.elapsed()
    }

    pub fn is_expired(&self) -> bool {
        self.elapsed() >= self.timeout
    }
}
