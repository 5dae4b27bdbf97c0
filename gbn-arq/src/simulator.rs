//! Network impairment simulator.
//!
//! Real networks drop, corrupt and reorder datagrams.  To exercise the
//! recovery paths of the protocol, the simulator sits between client and
//! server as a UDP relay and applies a configurable fault model to every
//! datagram, in both directions alike:
//!
//! | Step | Fault       | Effect                                                  |
//! |------|-------------|---------------------------------------------------------|
//! | 1    | Drop        | with `drop_prob`, silently discard the datagram          |
//! | 2    | Corruption  | else with `corrupt_prob`, flip every bit of one byte     |
//! | 3    | Reordering  | else with `reorder_prob`, hold it and release it right  |
//! |      |             | after the next datagram in the same direction (swap)    |
//!
//! Each step draws fresh randomness, so decisions are independent per
//! datagram.  With a `seed` the decision sequence is reproducible.
//!
//! [`Impairment`] holds all mutable simulator state (RNG, one pending slot
//! per [`Direction`], counters) and is pure: it maps one incoming datagram
//! to the datagrams to forward now.  [`Relay`] owns the sockets and drives
//! an `Impairment` from a `tokio::select!` loop.

use std::future::{pending, Future};
use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr};
use std::time::Duration;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tokio::time::{sleep_until, Instant};

use crate::error::TransferError;
use crate::socket::{Socket, RECV_BUF_LEN};

/// Default time a reordered datagram may wait for a successor.
pub const DEFAULT_REORDER_HOLD: Duration = Duration::from_millis(50);

/// Configuration for the fault-injection model.
///
/// All probabilities are in the range `[0.0, 1.0]`.
#[derive(Debug, Clone, PartialEq)]
pub struct SimulatorConfig {
    pub drop_prob: f64,
    pub corrupt_prob: f64,
    pub reorder_prob: f64,
    /// RNG seed; `None` seeds from OS entropy.
    pub seed: Option<u64>,
    /// Longest a reordered datagram is held when nothing follows it.
    pub reorder_hold: Duration,
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        // No faults by default — the simulator is a transparent pass-through.
        Self {
            drop_prob: 0.0,
            corrupt_prob: 0.0,
            reorder_prob: 0.0,
            seed: None,
            reorder_hold: DEFAULT_REORDER_HOLD,
        }
    }
}

impl SimulatorConfig {
    pub fn validate(&self) -> Result<(), TransferError> {
        for (name, p) in [
            ("drop_prob", self.drop_prob),
            ("corrupt_prob", self.corrupt_prob),
            ("reorder_prob", self.reorder_prob),
        ] {
            if !(0.0..=1.0).contains(&p) {
                return Err(TransferError::InvalidConfig(format!(
                    "{name} = {p} is outside [0.0, 1.0]"
                )));
            }
        }
        Ok(())
    }
}

/// Which way a datagram travels through the relay.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Client → server (DATA, FIN).
    ToServer,
    /// Server → client (ACKs).
    ToClient,
}

impl Direction {
    fn slot(self) -> usize {
        match self {
            Direction::ToServer => 0,
            Direction::ToClient => 1,
        }
    }
}

/// Per-datagram decision of the fault model.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Drop,
    Corrupt,
    Reorder,
    Forward,
}

/// Counters kept by the simulator.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RelayStats {
    pub received: u64,
    pub forwarded: u64,
    pub dropped: u64,
    pub corrupted: u64,
    pub reordered: u64,
}

impl std::fmt::Display for RelayStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "received={} forwarded={} dropped={} corrupted={} reordered={}",
            self.received, self.forwarded, self.dropped, self.corrupted, self.reordered
        )
    }
}

#[derive(Debug)]
struct Held {
    datagram: Vec<u8>,
    since: Instant,
}

// ---------------------------------------------------------------------------
// Impairment
// ---------------------------------------------------------------------------

/// Fault model state for one simulator process.
#[derive(Debug)]
pub struct Impairment {
    config: SimulatorConfig,
    rng: StdRng,
    pending: [Option<Held>; 2],
    stats: RelayStats,
}

impl Impairment {
    pub fn new(config: SimulatorConfig) -> Result<Self, TransferError> {
        config.validate()?;
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };
        Ok(Self {
            config,
            rng,
            pending: [None, None],
            stats: RelayStats::default(),
        })
    }

    pub fn config(&self) -> &SimulatorConfig {
        &self.config
    }

    pub fn stats(&self) -> RelayStats {
        self.stats
    }

    /// `true` when a datagram is waiting in `direction`'s reorder slot.
    pub fn is_holding(&self, direction: Direction) -> bool {
        self.pending[direction.slot()].is_some()
    }

    /// Draw the verdict for the next datagram.
    pub fn decide(&mut self) -> Verdict {
        if self.rng.random_bool(self.config.drop_prob) {
            Verdict::Drop
        } else if self.rng.random_bool(self.config.corrupt_prob) {
            Verdict::Corrupt
        } else if self.rng.random_bool(self.config.reorder_prob) {
            Verdict::Reorder
        } else {
            Verdict::Forward
        }
    }

    /// Run one datagram through the fault model.
    ///
    /// Returns the datagrams to forward right now, in order.  A held
    /// datagram is appended after the next forwarded one in the same
    /// direction.  When a reorder verdict finds the slot already taken,
    /// the new datagram goes out immediately followed by the held one.
    pub fn process(&mut self, direction: Direction, mut datagram: Vec<u8>) -> Vec<Vec<u8>> {
        self.stats.received += 1;
        let verdict = self.decide();
        log::trace!(
            "[sim] {direction:?} {} bytes → {verdict:?}",
            datagram.len()
        );

        match verdict {
            Verdict::Drop => {
                self.stats.dropped += 1;
                Vec::new()
            }
            Verdict::Corrupt => {
                self.corrupt(&mut datagram);
                self.stats.corrupted += 1;
                self.forward(direction, datagram)
            }
            Verdict::Reorder if !self.is_holding(direction) => {
                self.stats.reordered += 1;
                self.pending[direction.slot()] = Some(Held {
                    datagram,
                    since: Instant::now(),
                });
                Vec::new()
            }
            Verdict::Reorder | Verdict::Forward => self.forward(direction, datagram),
        }
    }

    fn forward(&mut self, direction: Direction, datagram: Vec<u8>) -> Vec<Vec<u8>> {
        let mut out = vec![datagram];
        out.extend(self.flush(direction));
        self.stats.forwarded += 1;
        out
    }

    /// Flip all bits of one randomly chosen byte.
    fn corrupt(&mut self, datagram: &mut [u8]) {
        if datagram.is_empty() {
            return;
        }
        let idx = self.rng.random_range(0..datagram.len());
        datagram[idx] ^= 0xff;
    }

    /// Release the datagram held for `direction`, if any.
    pub fn flush(&mut self, direction: Direction) -> Option<Vec<u8>> {
        let held = self.pending[direction.slot()].take()?;
        self.stats.forwarded += 1;
        Some(held.datagram)
    }

    /// Count a datagram the model passed as dropped after all, because the
    /// relay could not send it on.
    pub fn record_undelivered(&mut self) {
        self.stats.forwarded = self.stats.forwarded.saturating_sub(1);
        self.stats.dropped += 1;
    }

    /// Release every held datagram (used on shutdown).
    pub fn flush_all(&mut self) -> Vec<(Direction, Vec<u8>)> {
        [Direction::ToServer, Direction::ToClient]
            .into_iter()
            .filter_map(|d| self.flush(d).map(|dg| (d, dg)))
            .collect()
    }

    /// Earliest instant at which a held datagram times out.
    pub fn next_release(&self) -> Option<Instant> {
        self.pending
            .iter()
            .flatten()
            .map(|h| h.since + self.config.reorder_hold)
            .min()
    }

    /// Release held datagrams that have waited at least `reorder_hold`.
    pub fn release_expired(&mut self, now: Instant) -> Vec<(Direction, Vec<u8>)> {
        let hold = self.config.reorder_hold;
        let due: Vec<Direction> = [Direction::ToServer, Direction::ToClient]
            .into_iter()
            .filter(|d| {
                self.pending[d.slot()]
                    .as_ref()
                    .is_some_and(|h| h.since + hold <= now)
            })
            .collect();
        due.into_iter()
            .filter_map(|d| self.flush(d).map(|dg| (d, dg)))
            .collect()
    }
}

// ---------------------------------------------------------------------------
// Relay
// ---------------------------------------------------------------------------

enum RelayEvent {
    FromClient(std::io::Result<(usize, SocketAddr)>),
    FromServer(std::io::Result<(usize, SocketAddr)>),
    HoldExpired,
    Shutdown,
}

/// UDP relay that impairs traffic between one client and one server.
///
/// The client talks to `listen`; the relay forwards to the server at
/// `forward` from an ephemeral socket and sends the server's replies back
/// to whichever address last sent it a datagram on `listen`.
#[derive(Debug)]
pub struct Relay {
    client_side: Socket,
    server_side: Socket,
    forward: SocketAddr,
    client: Option<SocketAddr>,
    impairment: Impairment,
    client_buf: Vec<u8>,
    server_buf: Vec<u8>,
}

impl Relay {
    pub async fn bind(
        listen: SocketAddr,
        forward: SocketAddr,
        config: SimulatorConfig,
    ) -> Result<Self, TransferError> {
        let impairment = Impairment::new(config)?;
        let client_side = Socket::bind(listen).await?;
        let ephemeral = if forward.is_ipv4() {
            SocketAddr::from((Ipv4Addr::UNSPECIFIED, 0))
        } else {
            SocketAddr::from((Ipv6Addr::UNSPECIFIED, 0))
        };
        let server_side = Socket::bind(ephemeral).await?;
        log::info!(
            "[sim] listening on {}, forwarding to {forward} via {}",
            client_side.local_addr,
            server_side.local_addr
        );
        Ok(Self {
            client_side,
            server_side,
            forward,
            client: None,
            impairment,
            client_buf: vec![0u8; RECV_BUF_LEN],
            server_buf: vec![0u8; RECV_BUF_LEN],
        })
    }

    /// Address clients should send to.
    pub fn local_addr(&self) -> SocketAddr {
        self.client_side.local_addr
    }

    /// Relay datagrams until `shutdown` resolves, then flush any held
    /// datagram and return the counters.
    pub async fn run<F>(mut self, shutdown: F) -> Result<RelayStats, TransferError>
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);

        loop {
            let release_at = self.impairment.next_release();
            let event = tokio::select! {
                biased;
                _ = &mut shutdown => RelayEvent::Shutdown,
                res = self.client_side.recv_raw_into(&mut self.client_buf) => RelayEvent::FromClient(res),
                res = self.server_side.recv_raw_into(&mut self.server_buf) => RelayEvent::FromServer(res),
                _ = sleep_until_opt(release_at) => RelayEvent::HoldExpired,
            };

            match event {
                RelayEvent::FromClient(Ok((n, from))) => {
                    if self.client != Some(from) {
                        log::info!("[sim] client is {from}");
                        self.client = Some(from);
                    }
                    let datagram = self.client_buf[..n].to_vec();
                    self.relay(Direction::ToServer, datagram).await;
                }
                RelayEvent::FromServer(Ok((_, from))) if from != self.forward => {
                    log::debug!("[sim] ignoring datagram from {from}, not the server");
                }
                RelayEvent::FromServer(Ok((n, _))) => {
                    let datagram = self.server_buf[..n].to_vec();
                    self.relay(Direction::ToClient, datagram).await;
                }
                RelayEvent::FromClient(Err(e)) | RelayEvent::FromServer(Err(e)) => {
                    log::warn!("[sim] receive failed: {e}");
                }
                RelayEvent::HoldExpired => {
                    let due = self.impairment.release_expired(Instant::now());
                    self.deliver_all(due).await;
                }
                RelayEvent::Shutdown => {
                    let held = self.impairment.flush_all();
                    self.deliver_all(held).await;
                    let stats = self.impairment.stats();
                    log::info!("[sim] shutting down: {stats}");
                    return Ok(stats);
                }
            }
        }
    }

    async fn relay(&mut self, direction: Direction, datagram: Vec<u8>) {
        let out = self
            .impairment
            .process(direction, datagram)
            .into_iter()
            .map(|d| (direction, d))
            .collect();
        self.deliver_all(out).await;
    }

    async fn deliver_all(&mut self, batch: Vec<(Direction, Vec<u8>)>) {
        for (direction, datagram) in batch {
            if !self.deliver(direction, &datagram).await {
                self.impairment.record_undelivered();
            }
        }
    }

    /// Send one datagram on; `false` if it could not be sent.
    async fn deliver(&self, direction: Direction, datagram: &[u8]) -> bool {
        let result = match direction {
            Direction::ToServer => self.server_side.send_raw(datagram, self.forward).await,
            Direction::ToClient => match self.client {
                Some(client) => self.client_side.send_raw(datagram, client).await,
                None => {
                    log::warn!("[sim] reply from server before any client traffic; dropped");
                    return false;
                }
            },
        };
        match result {
            Ok(()) => true,
            Err(e) => {
                log::warn!("[sim] forwarding {direction:?} failed: {e}");
                false
            }
        }
    }
}

async fn sleep_until_opt(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => sleep_until(deadline).await,
        None => pending().await,
    }
}
