//! Transfer-level error taxonomy.
//!
//! Per-packet anomalies (loss, corruption, reordering, stale ACKs) are
//! absorbed by the state machines and never show up here.  What remains is
//! either a **protocol failure** (the retry ceiling was hit) or an
//! **environment failure** (bind, file, socket I/O, bad configuration),
//! and [`TransferError::is_protocol_failure`] tells them apart.

use thiserror::Error;

use crate::gbn_sender::SenderError;
use crate::socket::SocketError;

#[derive(Debug, Error)]
pub enum TransferError {
    /// File or other local I/O failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Socket bind / send / receive failure.
    #[error(transparent)]
    Socket(#[from] SocketError),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// A packet went unacknowledged through `retries` retransmissions.
    #[error("packet {seq} unacknowledged after {retries} retransmissions")]
    RetriesExhausted { seq: u32, retries: u32 },

    /// The driver asked the sender state machine for something it refused.
    #[error("sender state machine rejected operation: {0}")]
    Sender(SenderError),

    /// Shutdown was requested before the transfer completed.
    #[error("transfer aborted before completion")]
    Aborted,
}

impl TransferError {
    /// `true` for failures of the protocol itself, as opposed to the
    /// environment it runs in.
    pub fn is_protocol_failure(&self) -> bool {
        matches!(self, Self::RetriesExhausted { .. } | Self::Sender(_))
    }
}

impl From<SenderError> for TransferError {
    fn from(e: SenderError) -> Self {
        match e {
            SenderError::RetriesExhausted { seq, retries } => {
                Self::RetriesExhausted { seq, retries }
            }
            other => Self::Sender(other),
        }
    }
}
