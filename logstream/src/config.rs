use super::*;

use crate::node::transport::MAX_FRAME_LENGTH;
use rand::Rng;

/// Upper bound of `max_bytes_per_append`. The rest of a frame is left to the
/// per-entry framing of the append request and its header.
pub const MAX_BYTES_PER_APPEND_LIMIT: usize = MAX_FRAME_LENGTH / 2;

/// Timing and sizing knobs of `RaftProcess`.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct RaftConfig {
    /// Interval at which the leader sends (possibly empty) append requests.
    pub heartbeat_interval: Duration,
    /// Lower bound of the randomized election timeout.
    pub election_timeout_min: Duration,
    /// Upper bound of the randomized election timeout.
    pub election_timeout_max: Duration,
    /// Deadline of a single request to another member.
    pub request_timeout: Duration,
    /// How long `append_and_wait` waits for the entry to be committed.
    pub commit_timeout: Duration,
    /// Maximum number of entries in a single append request.
    pub max_entries_per_append: usize,
    /// Maximum total size of the entries in a single append request.
    /// An event larger than this can't be appended.
    pub max_bytes_per_append: usize,
    /// Interval of the background snapshot task.
    pub snapshot_interval: Duration,
}

impl Default for RaftConfig {
    fn default() -> Self {
        Self {
            heartbeat_interval: Duration::from_millis(150),
            election_timeout_min: Duration::from_millis(300),
            election_timeout_max: Duration::from_millis(600),
            request_timeout: Duration::from_secs(1),
            commit_timeout: Duration::from_secs(5),
            max_entries_per_append: 1000,
            max_bytes_per_append: 4 * 1024 * 1024,
            snapshot_interval: Duration::from_secs(60),
        }
    }
}

impl RaftConfig {
    pub fn validate(&self) -> Result<()> {
        ensure!(
            self.election_timeout_min < self.election_timeout_max,
            Error::InvalidArgument(format!(
                "election_timeout_min ({:?}) must be less than election_timeout_max ({:?})",
                self.election_timeout_min, self.election_timeout_max
            ))
        );
        ensure!(
            self.heartbeat_interval < self.election_timeout_min,
            Error::InvalidArgument(format!(
                "heartbeat_interval ({:?}) must be less than election_timeout_min ({:?})",
                self.heartbeat_interval, self.election_timeout_min
            ))
        );
        ensure!(
            self.max_entries_per_append > 0 && self.max_entries_per_append <= u16::MAX as usize,
            Error::InvalidArgument(format!(
                "max_entries_per_append ({}) is out of range",
                self.max_entries_per_append
            ))
        );
        ensure!(
            self.max_bytes_per_append > 0
                && self.max_bytes_per_append <= MAX_BYTES_PER_APPEND_LIMIT,
            Error::InvalidArgument(format!(
                "max_bytes_per_append ({}) must be in 1..={MAX_BYTES_PER_APPEND_LIMIT}",
                self.max_bytes_per_append
            ))
        );
        Ok(())
    }

    /// Draw a fresh election timeout uniformly from [min, max).
    pub fn random_election_timeout(&self) -> Duration {
        let min = self.election_timeout_min.as_millis() as u64;
        let max = self.election_timeout_max.as_millis() as u64;
        let ms = rand::thread_rng().gen_range(min..max.max(min + 1));
        Duration::from_millis(ms)
    }
}
