//! Wire-format definitions for protocol packets.
//!
//! Every datagram exchanged between the client and the server is a
//! [`Packet`].  This module is responsible for:
//! - Defining the on-wire binary layout (header fields, flags, payload).
//! - Serialising a [`Packet`] into a byte buffer ready for transmission.
//! - Deserialising a raw byte slice back into a [`Packet`], reporting any
//!   truncation, malformation or checksum failure as a [`PacketError`].
//!
//! No I/O happens here — this is pure data transformation.  [`Packet::decode`]
//! is the only way to turn bytes into a [`Packet`], so protocol logic never
//! sees an unvalidated datagram.
//!
//! # Wire format
//!
//! All multi-byte integers are **big-endian**.
//!
//! ```text
//!  0               1               2               3
//!  0 1 2 3 4 5 6 7 0 1 2 3 4 5 6 7 0 1 2 3 4 5 6 7 0 1 2 3 4 5 6 7
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |                        Sequence Number                        |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |     Flags     |                CRC-32 Checksum                |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |    (cont.)    |          Payload (DATA only) ...              |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! ```
//!
//! Total header size: [`HEADER_LEN`] = 9 bytes.
//! seq(4) + flags(1) + checksum(4)
//!
//! The checksum is CRC-32 (IEEE) over every byte of the packet except the
//! checksum field itself.  CRC-32 catches every burst error of up to 32
//! bits, so any single-byte mutation is always detected.

use thiserror::Error;

/// Values of the `flags` header field.
pub mod flags {
    /// Data packet carrying 0..=[`super::MAX_PAYLOAD`] payload bytes.
    pub const DATA: u8 = 0x00;
    /// Cumulative acknowledgement; `seq` is the highest in-order packet.
    pub const ACK: u8 = 0x01;
    /// End of stream. Occupies one sequence number, carries no payload.
    pub const FIN: u8 = 0x02;
}

/// Byte length of the fixed-size header on the wire.
pub const HEADER_LEN: usize = 9;

/// Largest payload a single DATA packet may carry.
pub const MAX_PAYLOAD: usize = 1024;

/// Largest datagram the codec will ever produce.
pub const MAX_PACKET_LEN: usize = HEADER_LEN + MAX_PAYLOAD;

// Byte offsets of each field within the serialised header.
const OFF_SEQ: usize = 0;
const OFF_FLAGS: usize = 4;
const OFF_CHECKSUM: usize = 5;

/// A validated protocol datagram.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Packet {
    /// A chunk of the byte stream.
    Data { seq: u32, payload: Vec<u8> },
    /// End-of-stream marker, sequenced like data.
    Fin { seq: u32 },
    /// Cumulative acknowledgement of every packet up to and including `seq`.
    Ack { seq: u32 },
}

impl Packet {
    pub fn data(seq: u32, payload: impl Into<Vec<u8>>) -> Self {
        Packet::Data {
            seq,
            payload: payload.into(),
        }
    }

    pub fn fin(seq: u32) -> Self {
        Packet::Fin { seq }
    }

    pub fn ack(seq: u32) -> Self {
        Packet::Ack { seq }
    }

    /// Sequence number carried in the header.
    pub fn seq(&self) -> u32 {
        match self {
            Packet::Data { seq, .. } | Packet::Fin { seq } | Packet::Ack { seq } => *seq,
        }
    }

    /// Payload bytes; empty for ACK and FIN.
    pub fn payload(&self) -> &[u8] {
        match self {
            Packet::Data { payload, .. } => payload,
            Packet::Fin { .. } | Packet::Ack { .. } => &[],
        }
    }

    pub fn is_ack(&self) -> bool {
        matches!(self, Packet::Ack { .. })
    }

    fn flags(&self) -> u8 {
        match self {
            Packet::Data { .. } => flags::DATA,
            Packet::Ack { .. } => flags::ACK,
            Packet::Fin { .. } => flags::FIN,
        }
    }

    /// Number of bytes [`encode`](Self::encode) will produce.
    pub fn encoded_len(&self) -> usize {
        HEADER_LEN + self.payload().len()
    }

    /// Serialise this packet into a newly allocated byte vector.
    ///
    /// Callers are expected to keep DATA payloads within [`MAX_PAYLOAD`];
    /// the sender state machine enforces this before a packet is built.
    pub fn encode(&self) -> Vec<u8> {
        let payload = self.payload();
        let mut buf = vec![0u8; HEADER_LEN + payload.len()];

        buf[OFF_SEQ..OFF_SEQ + 4].copy_from_slice(&self.seq().to_be_bytes());
        buf[OFF_FLAGS] = self.flags();
        buf[HEADER_LEN..].copy_from_slice(payload);

        let csum = checksum(&buf);
        buf[OFF_CHECKSUM..OFF_CHECKSUM + 4].copy_from_slice(&csum.to_be_bytes());

        buf
    }

    /// Parse a [`Packet`] from a raw byte slice.
    ///
    /// Never panics.  Every `Err` means the datagram is corrupted or
    /// malformed and must be discarded:
    /// - `buf` is shorter than [`HEADER_LEN`],
    /// - the checksum does not verify,
    /// - the flags byte is not one of [`flags`],
    /// - an ACK or FIN carries payload bytes, or
    /// - a DATA payload exceeds [`MAX_PAYLOAD`].
    pub fn decode(buf: &[u8]) -> Result<Self, PacketError> {
        if buf.len() < HEADER_LEN {
            return Err(PacketError::BufferTooShort(buf.len()));
        }

        let stored = read_u32(buf, OFF_CHECKSUM);
        let computed = checksum(buf);
        if stored != computed {
            return Err(PacketError::ChecksumMismatch {
                expected: stored,
                actual: computed,
            });
        }

        let seq = read_u32(buf, OFF_SEQ);
        let payload = &buf[HEADER_LEN..];

        match buf[OFF_FLAGS] {
            flags::DATA if payload.len() > MAX_PAYLOAD => {
                Err(PacketError::PayloadTooLarge(payload.len()))
            }
            flags::DATA => Ok(Packet::data(seq, payload)),
            flags::ACK | flags::FIN if !payload.is_empty() => {
                Err(PacketError::UnexpectedPayload(payload.len()))
            }
            flags::ACK => Ok(Packet::ack(seq)),
            flags::FIN => Ok(Packet::fin(seq)),
            other => Err(PacketError::UnknownFlags(other)),
        }
    }
}

/// Errors that can arise when parsing a raw datagram.
///
/// All of them are treated as corruption by the protocol engine.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum PacketError {
    #[error("datagram of {0} bytes is shorter than the {len}-byte header", len = HEADER_LEN)]
    BufferTooShort(usize),
    #[error("checksum mismatch: header says {expected:#010x}, computed {actual:#010x}")]
    ChecksumMismatch { expected: u32, actual: u32 },
    #[error("unknown flags byte {0:#04x}")]
    UnknownFlags(u8),
    #[error("control packet carries {0} payload bytes")]
    UnexpectedPayload(usize),
    #[error("payload of {0} bytes exceeds the {max}-byte limit", max = MAX_PAYLOAD)]
    PayloadTooLarge(usize),
}

fn read_u32(buf: &[u8], off: usize) -> u32 {
    u32::from_be_bytes([buf[off], buf[off + 1], buf[off + 2], buf[off + 3]])
}

/// CRC-32 over `buf` with the checksum field skipped.
///
/// `buf` must be at least [`HEADER_LEN`] bytes long.
fn checksum(buf: &[u8]) -> u32 {
    let mut hasher = crc32fast::Hasher::new();
    hasher.update(&buf[..OFF_CHECKSUM]);
    hasher.update(&buf[OFF_CHECKSUM + 4..]);
    hasher.finalize()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn data_roundtrip() {
        let pkt = Packet::data(42, b"hello".to_vec());
        assert_eq!(Packet::decode(&pkt.encode()), Ok(pkt));
    }

    #[test]
    fn ack_and_fin_have_no_payload() {
        let ack = Packet::ack(7).encode();
        let fin = Packet::fin(8).encode();
        assert_eq!(ack.len(), HEADER_LEN);
        assert_eq!(fin.len(), HEADER_LEN);
        assert_eq!(Packet::decode(&ack), Ok(Packet::ack(7)));
        assert_eq!(Packet::decode(&fin), Ok(Packet::fin(8)));
    }

    #[test]
    fn empty_data_payload_is_valid() {
        let pkt = Packet::data(0, Vec::new());
        let decoded = Packet::decode(&pkt.encode()).unwrap();
        assert_eq!(decoded.payload(), b"");
        assert!(!decoded.is_ack());
    }

    #[test]
    fn max_payload_roundtrip() {
        let pkt = Packet::data(3, vec![0xab; MAX_PAYLOAD]);
        let bytes = pkt.encode();
        assert_eq!(bytes.len(), MAX_PACKET_LEN);
        assert_eq!(Packet::decode(&bytes), Ok(pkt));
    }

    #[test]
    fn seq_big_endian_on_wire() {
        let bytes = Packet::ack(0x0102_0304).encode();
        assert_eq!(&bytes[OFF_SEQ..OFF_SEQ + 4], &[0x01, 0x02, 0x03, 0x04]);
        assert_eq!(bytes[OFF_FLAGS], flags::ACK);
    }

    #[test]
    fn encoding_is_deterministic() {
        let pkt = Packet::data(9, b"same bytes".to_vec());
        assert_eq!(pkt.encode(), pkt.encode());
        assert_eq!(pkt.encode().len(), pkt.encoded_len());
    }

    #[test]
    fn decode_empty_buffer_returns_error() {
        assert_eq!(Packet::decode(&[]), Err(PacketError::BufferTooShort(0)));
    }

    #[test]
    fn decode_short_header_returns_error() {
        for len in 0..HEADER_LEN {
            assert_eq!(
                Packet::decode(&vec![0u8; len]),
                Err(PacketError::BufferTooShort(len))
            );
        }
    }

    #[test]
    fn every_single_byte_mutation_is_detected() {
        let bytes = Packet::data(0x00c0_ffee, b"go-back-n payload".to_vec()).encode();
        for idx in 0..bytes.len() {
            for delta in [0x01u8, 0x80, 0xff, 0x5a] {
                let mut mutated = bytes.clone();
                mutated[idx] ^= delta;
                assert!(
                    Packet::decode(&mutated).is_err(),
                    "mutation {delta:#04x} at byte {idx} went undetected"
                );
            }
        }
    }

    #[test]
    fn ack_single_byte_mutation_is_detected() {
        let bytes = Packet::ack(5).encode();
        for idx in 0..bytes.len() {
            let mut mutated = bytes.clone();
            mutated[idx] ^= 0xff;
            assert!(Packet::decode(&mutated).is_err(), "byte {idx}");
        }
    }

    #[test]
    fn checksum_is_order_sensitive() {
        let a = Packet::data(1, b"ab".to_vec()).encode();
        let b = Packet::data(1, b"ba".to_vec()).encode();
        assert_ne!(a[OFF_CHECKSUM..HEADER_LEN], b[OFF_CHECKSUM..HEADER_LEN]);

        let s1 = Packet::data(0x0001_0000, b"x".to_vec()).encode();
        let s2 = Packet::data(0x0000_0001, b"x".to_vec()).encode();
        assert_ne!(s1[OFF_CHECKSUM..HEADER_LEN], s2[OFF_CHECKSUM..HEADER_LEN]);
    }

    #[test]
    fn truncated_payload_fails_checksum() {
        let mut bytes = Packet::data(0, b"data".to_vec()).encode();
        bytes.pop();
        assert!(matches!(
            Packet::decode(&bytes),
            Err(PacketError::ChecksumMismatch { .. })
        ));
    }

    /// Re-stamp the checksum after hand-editing a header.
    fn reseal(buf: &mut [u8]) {
        let csum = checksum(buf);
        buf[OFF_CHECKSUM..OFF_CHECKSUM + 4].copy_from_slice(&csum.to_be_bytes());
    }

    #[test]
    fn unknown_flags_rejected() {
        let mut bytes = Packet::ack(1).encode();
        bytes[OFF_FLAGS] = 0x7f;
        reseal(&mut bytes);
        assert_eq!(Packet::decode(&bytes), Err(PacketError::UnknownFlags(0x7f)));
    }

    #[test]
    fn ack_with_payload_rejected() {
        let mut bytes = Packet::data(1, b"xyz".to_vec()).encode();
        bytes[OFF_FLAGS] = flags::ACK;
        reseal(&mut bytes);
        assert_eq!(
            Packet::decode(&bytes),
            Err(PacketError::UnexpectedPayload(3))
        );
    }

    #[test]
    fn oversized_payload_rejected() {
        let mut bytes = vec![0u8; HEADER_LEN + MAX_PAYLOAD + 1];
        bytes[OFF_FLAGS] = flags::DATA;
        reseal(&mut bytes);
        assert_eq!(
            Packet::decode(&bytes),
            Err(PacketError::PayloadTooLarge(MAX_PAYLOAD + 1))
        );
    }
}
