//! Go-Back-N send-side state machine.
//!
//! [`GbnSender`] maintains a sliding window of up to `N` in-flight packets.
//!
//! # Protocol contract
//!
//! - Sequence numbers count **packets**, not bytes, starting at 0.
//! - At most `window_size` packets may be in flight at once
//!   (`next_seq - base <= window_size`).
//! - ACKs are **cumulative**: `ack_seq = K` retires every packet with
//!   `seq <= K`.  ACKs below `base` (stale or duplicate) and ACKs for
//!   packets never sent are ignored.
//! - On timeout **every** buffered packet from `base` to `next_seq - 1` is
//!   resent, in order (the "go back N" step).  There is no selective
//!   retransmission.
//! - The stream ends with a FIN packet; the transfer is complete only once
//!   the FIN is cumulatively acknowledged, not merely sent.
//!
//! This module only manages state; all socket I/O and timer handling is the
//! caller's responsibility.  Each operation returns the packets to put on
//! the wire plus a [`TimerAction`] describing what to do with the
//! retransmission timer.

use std::collections::VecDeque;

use thiserror::Error;

use crate::config::ArqConfig;
use crate::packet::{Packet, MAX_PAYLOAD};
use crate::state::SenderState;
use crate::timer::TimerAction;

/// Reasons the sender refuses an operation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SenderError {
    #[error("window full: {in_flight}/{window_size} packets in flight")]
    WindowFull { in_flight: usize, window_size: usize },
    #[error("end of stream already queued")]
    Finished,
    #[error("payload of {0} bytes exceeds the {max}-byte limit", max = MAX_PAYLOAD)]
    PayloadTooLarge(usize),
    #[error("sequence number space exhausted")]
    SequenceExhausted,
    #[error("packet {seq} unacknowledged after {retries} retransmissions")]
    RetriesExhausted { seq: u32, retries: u32 },
}

// ---------------------------------------------------------------------------
// GbnEntry
// ---------------------------------------------------------------------------

/// A single in-flight packet occupying one slot in the window.
#[derive(Debug, Clone)]
pub struct GbnEntry {
    pub packet: Packet,
    /// Total number of times this packet has been transmitted.
    pub tx_count: u32,
}

/// Result of feeding an ACK to the sender.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AckOutcome {
    /// Packets newly retired from the window.
    pub acked: usize,
    pub timer: TimerAction,
}

// ---------------------------------------------------------------------------
// GbnSender
// ---------------------------------------------------------------------------

/// Go-Back-N send-side state for one transfer.
///
/// # Sequence-number layout
///
/// ```text
///    base              next_seq
///      │                  │
///  ────┼──────────────────┼──────────────────▶ seq space
///  acked│ <── in flight ──▶│ <── sendable ───▶ (up to base + window_size)
/// ```
#[derive(Debug)]
pub struct GbnSender {
    /// Oldest unacknowledged packet (left window edge).
    base: u32,
    /// Sequence number for the next new packet.
    next_seq: u32,
    window_size: usize,
    max_retries: u32,
    /// In-flight packets ordered by sequence number (front = `base`).
    window: VecDeque<GbnEntry>,
    /// Sequence number of the FIN, once queued.
    fin_seq: Option<u32>,
    state: SenderState,
    packets_sent: u64,
    retransmissions: u64,
}

impl GbnSender {
    /// Create a sender whose first packet is numbered 0.
    ///
    /// # Panics
    ///
    /// Panics if `window_size` is zero; [`ArqConfig::validate`] rejects that
    /// before a sender is ever built.
    pub fn new(window_size: usize, max_retries: u32) -> Self {
        assert!(window_size >= 1, "window_size must be at least 1");
        Self {
            base: 0,
            next_seq: 0,
            window_size,
            max_retries,
            window: VecDeque::with_capacity(window_size),
            fin_seq: None,
            state: SenderState::Idle,
            packets_sent: 0,
            retransmissions: 0,
        }
    }

    pub fn from_config(config: &ArqConfig) -> Self {
        Self::new(config.window_size, config.max_retries)
    }

    pub fn base(&self) -> u32 {
        self.base
    }

    pub fn next_seq(&self) -> u32 {
        self.next_seq
    }

    pub fn window_size(&self) -> usize {
        self.window_size
    }

    pub fn state(&self) -> SenderState {
        self.state
    }

    pub fn is_done(&self) -> bool {
        self.state == SenderState::Done
    }

    /// Sequence number of the FIN, if the stream has been closed.
    pub fn fin_seq(&self) -> Option<u32> {
        self.fin_seq
    }

    /// `true` when there is room for at least one more in-flight packet.
    pub fn can_send(&self) -> bool {
        self.window.len() < self.window_size
    }

    /// Number of packets currently awaiting acknowledgement.
    pub fn in_flight(&self) -> usize {
        self.window.len()
    }

    pub fn has_unacked(&self) -> bool {
        !self.window.is_empty()
    }

    /// First transmissions, FIN included.
    pub fn packets_sent(&self) -> u64 {
        self.packets_sent
    }

    /// Packets resent because of timeouts.
    pub fn retransmissions(&self) -> u64 {
        self.retransmissions
    }

    /// Iterate over all in-flight packets from oldest to newest.
    pub fn window_entries(&self) -> impl Iterator<Item = &GbnEntry> {
        self.window.iter()
    }

    /// Number and buffer the next DATA packet.
    ///
    /// Returns the packet to transmit and [`TimerAction::Start`] when it is
    /// the only packet in flight (otherwise the running timer is kept).
    pub fn send_next(&mut self, payload: Vec<u8>) -> Result<(Packet, TimerAction), SenderError> {
        if self.fin_seq.is_some() {
            return Err(SenderError::Finished);
        }
        if payload.len() > MAX_PAYLOAD {
            return Err(SenderError::PayloadTooLarge(payload.len()));
        }
        self.enqueue(Packet::data(self.next_seq, payload))
    }

    /// Number and buffer the end-of-stream packet.
    ///
    /// The FIN is windowed like data, so this fails with
    /// [`SenderError::WindowFull`] until an ACK opens a slot.
    pub fn finish(&mut self) -> Result<(Packet, TimerAction), SenderError> {
        if self.fin_seq.is_some() {
            return Err(SenderError::Finished);
        }
        let seq = self.next_seq;
        let queued = self.enqueue(Packet::fin(seq))?;
        self.fin_seq = Some(seq);
        Ok(queued)
    }

    fn enqueue(&mut self, packet: Packet) -> Result<(Packet, TimerAction), SenderError> {
        if !self.can_send() {
            return Err(SenderError::WindowFull {
                in_flight: self.window.len(),
                window_size: self.window_size,
            });
        }
        if self.next_seq == u32::MAX {
            return Err(SenderError::SequenceExhausted);
        }

        let timer = if self.window.is_empty() {
            TimerAction::Start
        } else {
            TimerAction::Keep
        };
        self.window.push_back(GbnEntry {
            packet: packet.clone(),
            tx_count: 1,
        });
        self.next_seq += 1;
        self.packets_sent += 1;
        self.state = SenderState::Sending;
        Ok((packet, timer))
    }

    /// Process a cumulative ACK.
    ///
    /// For `base <= ack_seq < next_seq`, retires every packet up to and
    /// including `ack_seq`, moves `base` to `ack_seq + 1` and asks for the
    /// timer to be restarted (packets remain) or stopped (window drained).
    /// Anything else is a stale, duplicate or bogus ACK and changes nothing.
    pub fn on_ack(&mut self, ack_seq: u32) -> AckOutcome {
        if ack_seq < self.base || ack_seq >= self.next_seq {
            log::trace!(
                "[gbn] ignoring ACK {ack_seq} outside [{}, {})",
                self.base,
                self.next_seq
            );
            return AckOutcome {
                acked: 0,
                timer: TimerAction::Keep,
            };
        }

        let mut acked = 0usize;
        while self
            .window
            .front()
            .is_some_and(|front| front.packet.seq() <= ack_seq)
        {
            self.window.pop_front();
            acked += 1;
        }
        self.base = ack_seq + 1;

        let timer = if self.fin_seq.is_some_and(|fin| fin <= ack_seq) {
            self.state = SenderState::Done;
            TimerAction::Stop
        } else if self.window.is_empty() {
            self.state = SenderState::Idle;
            TimerAction::Stop
        } else {
            TimerAction::Restart
        };
        AckOutcome { acked, timer }
    }

    /// Handle a retransmission timeout.
    ///
    /// Returns every buffered packet, oldest first, for retransmission and
    /// records the extra transmission on each.  The caller restarts the
    /// timer afterwards.  Fails with [`SenderError::RetriesExhausted`] once
    /// the oldest packet has already been retransmitted `max_retries` times.
    pub fn on_timeout(&mut self) -> Result<Vec<Packet>, SenderError> {
        let Some(front) = self.window.front() else {
            return Ok(Vec::new());
        };
        let retries = front.tx_count - 1;
        if retries >= self.max_retries {
            return Err(SenderError::RetriesExhausted {
                seq: front.packet.seq(),
                retries,
            });
        }

        let mut resend = Vec::with_capacity(self.window.len());
        for entry in self.window.iter_mut() {
            entry.tx_count += 1;
            resend.push(entry.packet.clone());
        }
        self.retransmissions += resend.len() as u64;
        Ok(resend)
    }
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
