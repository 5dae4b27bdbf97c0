//! Sending side of a transfer.
//!
//! ```text
//!  input ──read_chunks task──▶ mpsc ──┐
//!                                     ▼
//!   socket.recv_from ──────▶  tokio::select! (biased)  ──▶ Event ──▶ match
//!   timer.expired    ──────▶        one loop,                 │
//!   shutdown         ──────▶    owns GbnSender                ▼
//!                                                     socket.send_to / timer
//! ```
//!
//! The loop is the single coordination point: ACK handling, timeouts and new
//! sends all run on it, one event at a time, so advancing `base` and
//! resending the window can never interleave.  Inbound packets are polled
//! before the timer, so an ACK racing a timeout wins and may cancel it.

use std::future::Future;
use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr};
use std::path::Path;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::sync::mpsc;
use tokio::time::Instant;

use crate::config::ArqConfig;
use crate::error::TransferError;
use crate::gbn_sender::GbnSender;
use crate::packet::Packet;
use crate::socket::{self, Socket, SocketError};
use crate::timer::RetransmitTimer;

/// Summary of a completed send.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SendReport {
    /// Payload bytes delivered (FIN excluded).
    pub bytes: u64,
    /// Packets sent for the first time, FIN included.
    pub packets: u64,
    pub retransmissions: u64,
    pub elapsed: Duration,
}

enum Event {
    Inbound(Result<(Packet, SocketAddr), SocketError>),
    TimerFired,
    Chunk(Option<std::io::Result<Vec<u8>>>),
    Shutdown,
}

/// Send the file at `path` to `peer` (the simulator or the server).
pub async fn send_file<F>(
    path: &Path,
    peer: SocketAddr,
    config: &ArqConfig,
    shutdown: F,
) -> Result<SendReport, TransferError>
where
    F: Future<Output = ()>,
{
    config.validate()?;
    let file = tokio::fs::File::open(path).await?;
    let local = if peer.is_ipv4() {
        SocketAddr::from((Ipv4Addr::UNSPECIFIED, 0))
    } else {
        SocketAddr::from((Ipv6Addr::UNSPECIFIED, 0))
    };
    let socket = Socket::bind(local).await?;
    log::info!(
        "sending {} to {peer} from {}",
        path.display(),
        socket.local_addr
    );
    send_stream(&socket, peer, file, config, shutdown).await
}

/// Reliably deliver everything `reader` yields to `peer`.
///
/// Returns only once the FIN has been cumulatively acknowledged.
pub async fn send_stream<R, F>(
    socket: &Socket,
    peer: SocketAddr,
    reader: R,
    config: &ArqConfig,
    shutdown: F,
) -> Result<SendReport, TransferError>
where
    R: AsyncRead + Unpin + Send + 'static,
    F: Future<Output = ()>,
{
    config.validate()?;

    let (chunk_tx, mut chunks) = mpsc::channel(config.window_size);
    let reader_task = tokio::spawn(read_chunks(reader, config.chunk_size, chunk_tx));

    let mut sender = GbnSender::from_config(config);
    let mut timer = RetransmitTimer::new(config.timeout);
    let mut input_done = false;
    let mut bytes = 0u64;
    let started = Instant::now();
    tokio::pin!(shutdown);

    let result = loop {
        if sender.is_done() {
            break Ok(());
        }

        // End of input: close the stream as soon as the window has room.
        if input_done && sender.fin_seq().is_none() && sender.can_send() {
            match sender.finish() {
                Ok((fin, action)) => {
                    if let Err(e) = socket.send_to(&fin, peer).await {
                        break Err(e.into());
                    }
                    timer.apply(action);
                    log::debug!("[gbn] → FIN seq={}", fin.seq());
                }
                Err(e) => break Err(e.into()),
            }
        }

        let event = tokio::select! {
            biased;
            _ = &mut shutdown => Event::Shutdown,
            res = socket.recv_from() => Event::Inbound(res),
            _ = timer.expired() => Event::TimerFired,
            chunk = chunks.recv(), if !input_done && sender.can_send() => Event::Chunk(chunk),
        };

        match event {
            Event::Inbound(Ok((Packet::Ack { seq }, from))) if from == peer => {
                let outcome = sender.on_ack(seq);
                timer.apply(outcome.timer);
                if outcome.acked > 0 {
                    log::debug!(
                        "[gbn] ← ACK {seq} slid={} base={} in_flight={}",
                        outcome.acked,
                        sender.base(),
                        sender.in_flight()
                    );
                } else {
                    log::trace!("[gbn] ← duplicate ACK {seq}");
                }
            }
            Event::Inbound(Ok((pkt, from))) => {
                log::trace!("[gbn] ignoring {pkt:?} from {from}");
            }
            Event::Inbound(Err(SocketError::Packet(e))) => {
                log::debug!("[gbn] ← corrupt datagram discarded: {e}");
            }
            Event::Inbound(Err(SocketError::Io(e))) if socket::is_transient(&e) => {
                log::debug!("[gbn] transient receive error: {e}");
            }
            Event::Inbound(Err(e)) => break Err(e.into()),

            Event::TimerFired => match sender.on_timeout() {
                Ok(resend) => {
                    log::debug!(
                        "[gbn] timeout — retransmitting {} packet(s) from seq {}",
                        resend.len(),
                        sender.base()
                    );
                    if let Err(e) = send_all(socket, &resend, peer).await {
                        break Err(e);
                    }
                    timer.restart();
                }
                Err(e) => {
                    log::warn!("[gbn] giving up: {e}");
                    break Err(e.into());
                }
            },

            Event::Chunk(Some(Ok(payload))) => {
                let len = payload.len() as u64;
                match sender.send_next(payload) {
                    Ok((pkt, action)) => {
                        if let Err(e) = socket.send_to(&pkt, peer).await {
                            break Err(e.into());
                        }
                        timer.apply(action);
                        bytes += len;
                        log::trace!(
                            "[gbn] → DATA seq={} len={len} in_flight={}",
                            pkt.seq(),
                            sender.in_flight()
                        );
                    }
                    Err(e) => break Err(e.into()),
                }
            }
            Event::Chunk(Some(Err(e))) => break Err(e.into()),
            Event::Chunk(None) => input_done = true,

            Event::Shutdown => {
                log::warn!("[gbn] shutdown requested with {} packet(s) in flight", sender.in_flight());
                break Err(TransferError::Aborted);
            }
        }
    };

    reader_task.abort();
    result?;

    let report = SendReport {
        bytes,
        packets: sender.packets_sent(),
        retransmissions: sender.retransmissions(),
        elapsed: started.elapsed(),
    };
    log::info!(
        "send complete: {} bytes in {} packets ({} retransmissions) in {:.2?}",
        report.bytes,
        report.packets,
        report.retransmissions,
        report.elapsed
    );
    Ok(report)
}

async fn send_all(socket: &Socket, packets: &[Packet], peer: SocketAddr) -> Result<(), TransferError> {
    for pkt in packets {
        socket.send_to(pkt, peer).await?;
    }
    Ok(())
}

/// File-reader collaborator: split `reader` into `chunk_size` pieces.
///
/// Every chunk except the last is exactly `chunk_size` bytes.
async fn read_chunks<R>(
    mut reader: R,
    chunk_size: usize,
    tx: mpsc::Sender<std::io::Result<Vec<u8>>>,
) where
    R: AsyncRead + Unpin,
{
    loop {
        let mut buf = vec![0u8; chunk_size];
        let mut filled = 0;
        while filled < chunk_size {
            match reader.read(&mut buf[filled..]).await {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) => {
                    let _ = tx.send(Err(e)).await;
                    return;
                }
            }
        }
        if filled == 0 {
            return;
        }
        buf.truncate(filled);
        if tx.send(Ok(buf)).await.is_err() {
            return;
        }
    }
}
