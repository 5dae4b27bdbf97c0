//! Receiving side of a transfer.
//!
//! Single-threaded by construction: each datagram is decoded, fed to the
//! [`GbnReceiver`], its payload (if any) appended to the output, and the
//! resulting ACK sent, before the next datagram is read.
//!
//! Once the FIN is accepted the output is flushed and "receive complete" is
//! logged.  The server then lingers, re-acknowledging retransmissions,
//! until the client has been quiet for `linger`: if our final ACK was lost
//! the client's FIN retransmission still gets answered.

use std::future::Future;
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

use tokio::io::{AsyncWrite, AsyncWriteExt, BufWriter};
use tokio::time::{sleep_until, Instant};

use crate::config::ArqConfig;
use crate::error::TransferError;
use crate::gbn_receiver::GbnReceiver;
use crate::packet::Packet;
use crate::socket::{self, Socket, SocketError};

/// Summary of a completed receive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReceiveReport {
    pub peer: Option<SocketAddr>,
    /// Payload bytes written to the output.
    pub bytes: u64,
    /// DATA packets accepted in order.
    pub packets: u64,
    /// Valid packets dropped as out-of-order or duplicate.
    pub discarded: u64,
    /// Datagrams that failed the integrity check.
    pub corrupted: u64,
    pub elapsed: Duration,
}

/// Bind `bind`, receive one stream and store it at `path`.
pub async fn receive_file<F>(
    bind: SocketAddr,
    path: &Path,
    config: &ArqConfig,
    shutdown: F,
) -> Result<ReceiveReport, TransferError>
where
    F: Future<Output = ()>,
{
    config.validate()?;
    let socket = Socket::bind(bind).await?;
    let file = tokio::fs::File::create(path).await?;
    log::info!(
        "listening on {}, writing to {}",
        socket.local_addr,
        path.display()
    );
    receive_stream(&socket, BufWriter::new(file), config, shutdown).await
}

/// Receive one stream on `socket`, appending delivered payloads to `writer`.
///
/// The first valid DATA or FIN packet fixes the peer; datagrams from any
/// other address are ignored afterwards.
pub async fn receive_stream<W, F>(
    socket: &Socket,
    writer: W,
    config: &ArqConfig,
    shutdown: F,
) -> Result<ReceiveReport, TransferError>
where
    W: AsyncWrite + Unpin,
    F: Future<Output = ()>,
{
    let mut session = Session {
        socket,
        writer,
        receiver: GbnReceiver::new(),
        peer: None,
    };
    let started = Instant::now();
    tokio::pin!(shutdown);

    // Transfer phase: until the FIN is accepted.
    loop {
        let (datagram, from) = tokio::select! {
            biased;
            _ = &mut shutdown => return Err(TransferError::Aborted),
            res = socket.recv_raw() => match res {
                Ok(v) => v,
                Err(e) if socket::is_transient(&e) => continue,
                Err(e) => return Err(SocketError::Io(e).into()),
            },
        };
        if session.handle(&datagram, from).await? == Handled::EndOfStream {
            break;
        }
    }

    session.writer.flush().await?;
    let report = ReceiveReport {
        peer: session.peer,
        bytes: session.receiver.delivered_bytes(),
        packets: session.receiver.delivered_packets(),
        discarded: session.receiver.discarded(),
        corrupted: session.receiver.corrupted(),
        elapsed: started.elapsed(),
    };
    log::info!(
        "receive complete: {} bytes in {} packets ({} discarded, {} corrupt) in {:.2?}",
        report.bytes,
        report.packets,
        report.discarded,
        report.corrupted,
        report.elapsed
    );

    // Linger phase: answer retransmissions until the peer goes quiet.
    let mut quiet_until = Instant::now() + config.linger;
    loop {
        let (datagram, from) = tokio::select! {
            biased;
            _ = &mut shutdown => break,
            _ = sleep_until(quiet_until) => break,
            res = socket.recv_raw() => match res {
                Ok(v) => v,
                Err(e) if socket::is_transient(&e) => continue,
                Err(e) => return Err(SocketError::Io(e).into()),
            },
        };
        if session.handle(&datagram, from).await? != Handled::Ignored {
            log::debug!("[gbn] re-acknowledged late retransmission from {from}");
            quiet_until = Instant::now() + config.linger;
        }
    }

    Ok(report)
}

#[derive(Debug, PartialEq, Eq)]
enum Handled {
    /// Not from our peer (or not attributable to one).
    Ignored,
    Processed,
    EndOfStream,
}

struct Session<'a, W> {
    socket: &'a Socket,
    writer: W,
    receiver: GbnReceiver,
    peer: Option<SocketAddr>,
}

impl<W: AsyncWrite + Unpin> Session<'_, W> {
    async fn handle(&mut self, datagram: &[u8], from: SocketAddr) -> Result<Handled, TransferError> {
        let decoded = Packet::decode(datagram);

        match self.peer {
            Some(peer) if peer != from => {
                log::trace!("[gbn] ignoring datagram from stranger {from}");
                return Ok(Handled::Ignored);
            }
            Some(_) => {}
            None => match &decoded {
                Ok(pkt) if !pkt.is_ack() => {
                    log::info!("client connected from {from}");
                    self.peer = Some(from);
                }
                _ => return Ok(Handled::Ignored),
            },
        }

        let outcome = self.receiver.on_datagram(decoded);
        if let Some(payload) = &outcome.deliver {
            self.writer.write_all(payload).await?;
        }
        if let Some(ack) = &outcome.ack {
            self.socket.send_to(ack, from).await?;
            log::trace!("[gbn] → ACK {}", ack.seq());
        }

        Ok(if outcome.end_of_stream {
            Handled::EndOfStream
        } else {
            Handled::Processed
        })
    }
}
