//! Protocol parameters shared by the client and the server.

use std::time::Duration;

use crate::error::TransferError;
use crate::packet::MAX_PAYLOAD;

/// Default Go-Back-N window (packets in flight).
pub const DEFAULT_WINDOW_SIZE: usize = 4;
/// Default bytes read from the input per DATA packet.
pub const DEFAULT_CHUNK_SIZE: usize = MAX_PAYLOAD;
/// Default retransmission timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(1000);
/// Default retransmissions allowed per packet before the transfer fails.
pub const DEFAULT_MAX_RETRIES: u32 = 16;

/// Adjustable Go-Back-N parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArqConfig {
    /// Maximum number of unacknowledged packets (N).
    pub window_size: usize,
    /// Payload bytes per DATA packet, `1..=MAX_PAYLOAD`.
    pub chunk_size: usize,
    /// Fixed retransmission timeout.
    pub timeout: Duration,
    /// Retransmissions of a single packet tolerated before giving up.
    pub max_retries: u32,
    /// How long the server keeps re-acknowledging after end-of-stream
    /// once the line has gone quiet.
    pub linger: Duration,
}

impl Default for ArqConfig {
    fn default() -> Self {
        Self {
            window_size: DEFAULT_WINDOW_SIZE,
            chunk_size: DEFAULT_CHUNK_SIZE,
            timeout: DEFAULT_TIMEOUT,
            max_retries: DEFAULT_MAX_RETRIES,
            linger: DEFAULT_TIMEOUT * 3,
        }
    }
}

impl ArqConfig {
    /// Set the timeout and scale the linger period with it.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self.linger = timeout * 3;
        self
    }

    pub fn validate(&self) -> Result<(), TransferError> {
        if self.window_size == 0 {
            return Err(TransferError::InvalidConfig(
                "window size must be at least 1".into(),
            ));
        }
        if self.chunk_size == 0 || self.chunk_size > MAX_PAYLOAD {
            return Err(TransferError::InvalidConfig(format!(
                "chunk size {} outside 1..={MAX_PAYLOAD}",
                self.chunk_size
            )));
        }
        if self.timeout.is_zero() {
            return Err(TransferError::InvalidConfig(
                "retransmission timeout must be non-zero".into(),
            ));
        }
        Ok(())
    }
}
