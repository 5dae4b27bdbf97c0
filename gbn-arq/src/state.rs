//! Finite-state-machine types for both ends of a transfer.
//!
//! Transitions live in [`crate::gbn_sender`] and [`crate::gbn_receiver`];
//! this module only names the states so drivers, logs and tests can match
//! on them.

/// Lifecycle of the sending side.
///
/// ```text
///            send_next                 on_ack (partial)
///   IDLE ───────────────▶ SENDING ◀──────────────────┐
///    ▲                      │  │                      │
///    │   on_ack (drained)   │  └──────────────────────┘
///    └──────────────────────┘
///                           │ on_ack covering FIN
///                           ▼
///                          DONE
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SenderState {
    /// No unacknowledged packets; retransmission timer stopped.
    #[default]
    Idle,
    /// Between 1 and `window_size` packets in flight; timer running.
    Sending,
    /// The end-of-stream packet has been cumulatively acknowledged.
    Done,
}

/// Lifecycle of the receiving side.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReceiverState {
    /// Accepting only the packet numbered `expect_seq`.
    Waiting { expect_seq: u32 },
    /// End-of-stream received; only re-acknowledgements remain.
    Finished,
}

impl Default for ReceiverState {
    fn default() -> Self {
        Self::Waiting { expect_seq: 0 }
    }
}

impl std::fmt::Display for SenderState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Idle => "IDLE",
            Self::Sending => "SENDING",
            Self::Done => "DONE",
        };
        f.write_str(name)
    }
}

impl std::fmt::Display for ReceiverState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Waiting { expect_seq } => write!(f, "WAITING({expect_seq})"),
            Self::Finished => f.write_str("FINISHED"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        assert_eq!(SenderState::default(), SenderState::Idle);
        assert_eq!(
            ReceiverState::default(),
            ReceiverState::Waiting { expect_seq: 0 }
        );
    }

    #[test]
    fn display_names() {
        assert_eq!(SenderState::Sending.to_string(), "SENDING");
        assert_eq!(
            ReceiverState::Waiting { expect_seq: 3 }.to_string(),
            "WAITING(3)"
        );
    }
}
