//! `gbn-arq` — reliable file transfer over UDP using Go-Back-N ARQ.
//!
//! # Architecture
//!
//! ```text
//!  ┌──────────┐   DATA/FIN   ┌───────────┐   DATA/FIN   ┌──────────┐
//!  │  client  │─────────────▶│ simulator │─────────────▶│  server  │
//!  │GbnSender │◀─────────────│ (Relay)   │◀─────────────│GbnReceiver│
//!  └────┬─────┘     ACK      └───────────┘     ACK      └────┬─────┘
//!       │ timer                drop / corrupt / reorder       │ file
//!  ┌────▼──────────────────────────────────────────────────────▼───┐
//!  │  Socket  (thin async wrapper around tokio UdpSocket)           │
//!  └────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Each module has a single responsibility:
//! - [`packet`]        — wire format (serialise / deserialise, CRC-32)
//! - [`gbn_sender`]    — GBN outbound window state machine
//! - [`gbn_receiver`]  — GBN inbound cumulative-ACK state machine
//! - [`timer`]         — single retransmission timer
//! - [`simulator`]     — lossy / corrupting / reordering relay
//! - [`state`]         — finite-state-machine types
//! - [`client`]        — event loop driving the sender from a file
//! - [`server`]        — loop driving the receiver into a file
//! - [`config`]        — protocol parameters
//! - [`error`]         — transfer-level errors
//! - [`socket`]        — async UDP socket abstraction

pub mod client;
pub mod config;
pub mod error;
pub mod gbn_receiver;
pub mod gbn_sender;
pub mod packet;
pub mod server;
pub mod simulator;
pub mod socket;
pub mod state;
pub mod timer;

pub use config::ArqConfig;
pub use error::TransferError;
pub use packet::{Packet, PacketError};
