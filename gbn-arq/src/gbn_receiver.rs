//! Go-Back-N receive-side state machine.
//!
//! [`GbnReceiver`] implements the receiver side of Go-Back-N:
//!
//! - Only the packet numbered `expect_seq` is accepted.  Its payload is
//!   delivered and acknowledged with `ACK(expect_seq - 1)` after the
//!   increment.
//! - Out-of-order, duplicate and corrupted packets are **discarded**, never
//!   buffered, and the last ACK is re-sent.  The sender treats that ACK as
//!   stale and recovers through its timeout.
//! - Before anything has been accepted there is no ACK to repeat, so
//!   nothing is sent: any value would acknowledge packet 0 falsely.
//!
//! This module only manages state; all socket and file I/O is the caller's
//! responsibility.

use crate::packet::{Packet, PacketError};
use crate::state::ReceiverState;

/// What the caller must do after the receiver processed one datagram.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RecvOutcome {
    /// In-order payload to append to the output sink.
    pub deliver: Option<Vec<u8>>,
    /// Acknowledgement to send back, if any.
    pub ack: Option<Packet>,
    /// `true` exactly once: when the FIN is accepted.
    pub end_of_stream: bool,
}

// ---------------------------------------------------------------------------
// GbnReceiver
// ---------------------------------------------------------------------------

/// Go-Back-N receive-side state for one transfer.
#[derive(Debug, Default)]
pub struct GbnReceiver {
    /// Next in-order sequence number to accept.
    expect_seq: u32,
    /// Sequence number carried by the most recent ACK sent.
    last_ack: Option<u32>,
    finished: bool,
    delivered_packets: u64,
    delivered_bytes: u64,
    discarded: u64,
    corrupted: u64,
}

impl GbnReceiver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn expect_seq(&self) -> u32 {
        self.expect_seq
    }

    pub fn last_ack(&self) -> Option<u32> {
        self.last_ack
    }

    pub fn state(&self) -> ReceiverState {
        if self.finished {
            ReceiverState::Finished
        } else {
            ReceiverState::Waiting {
                expect_seq: self.expect_seq,
            }
        }
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    pub fn delivered_packets(&self) -> u64 {
        self.delivered_packets
    }

    pub fn delivered_bytes(&self) -> u64 {
        self.delivered_bytes
    }

    /// Valid packets dropped for arriving out of order.
    pub fn discarded(&self) -> u64 {
        self.discarded
    }

    /// Datagrams that failed to decode.
    pub fn corrupted(&self) -> u64 {
        self.corrupted
    }

    /// Feed the result of [`Packet::decode`] for one datagram.
    pub fn on_datagram(&mut self, decoded: Result<Packet, PacketError>) -> RecvOutcome {
        match decoded {
            Ok(packet) => self.on_packet(packet),
            Err(e) => {
                log::debug!("[gbn] ← corrupt datagram ({e}); re-ACK {:?}", self.last_ack);
                self.on_corrupt()
            }
        }
    }

    /// Process one validated packet.
    pub fn on_packet(&mut self, packet: Packet) -> RecvOutcome {
        match packet {
            Packet::Ack { seq } => {
                log::trace!("[gbn] stray ACK {seq} at receiver; ignored");
                RecvOutcome::default()
            }
            Packet::Data { seq, payload } if self.accepts(seq) => {
                self.delivered_packets += 1;
                self.delivered_bytes += payload.len() as u64;
                RecvOutcome {
                    deliver: Some(payload),
                    ack: Some(self.advance()),
                    end_of_stream: false,
                }
            }
            Packet::Fin { seq } if self.accepts(seq) => {
                self.finished = true;
                RecvOutcome {
                    deliver: None,
                    ack: Some(self.advance()),
                    end_of_stream: true,
                }
            }
            other => {
                log::trace!(
                    "[gbn] ← out-of-order seq={} (expecting {}); discarded",
                    other.seq(),
                    self.expect_seq
                );
                self.discarded += 1;
                RecvOutcome {
                    ack: self.repeat_ack(),
                    ..RecvOutcome::default()
                }
            }
        }
    }

    /// A datagram failed its integrity check: drop it and repeat the last ACK.
    pub fn on_corrupt(&mut self) -> RecvOutcome {
        self.corrupted += 1;
        RecvOutcome {
            ack: self.repeat_ack(),
            ..RecvOutcome::default()
        }
    }

    // u32::MAX is never accepted: the sequence space ends there.
    fn accepts(&self, seq: u32) -> bool {
        !self.finished && seq == self.expect_seq && seq != u32::MAX
    }

    fn advance(&mut self) -> Packet {
        let acked = self.expect_seq;
        self.expect_seq += 1;
        self.last_ack = Some(acked);
        Packet::ack(acked)
    }

    fn repeat_ack(&self) -> Option<Packet> {
        self.last_ack.map(Packet::ack)
    }
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
