//! Integration tests for the Go-Back-N transfer.
//!
//! The first group drives a `GbnSender` and a `GbnReceiver` against each
//! other in-process, with the test playing the network.  The second group
//! runs the real client, simulator and server over the loopback interface,
//! each as its own tokio task.

use std::net::SocketAddr;
use std::time::Duration;

use gbn_arq::client;
use gbn_arq::config::ArqConfig;
use gbn_arq::gbn_receiver::GbnReceiver;
use gbn_arq::gbn_sender::GbnSender;
use gbn_arq::packet::Packet;
use gbn_arq::server;
use gbn_arq::simulator::{Relay, RelayStats, SimulatorConfig};
use gbn_arq::socket::Socket;
use gbn_arq::state::SenderState;
use gbn_arq::timer::TimerAction;
use gbn_arq::TransferError;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

fn deliver(receiver: &mut GbnReceiver, pkt: Packet, out: &mut Vec<u8>) -> Option<u32> {
    let outcome = receiver.on_packet(pkt);
    if let Some(payload) = outcome.deliver {
        out.extend(payload);
    }
    outcome.ack.map(|ack| ack.seq())
}

// ---------------------------------------------------------------------------
// In-process scenarios
// ---------------------------------------------------------------------------

#[test]
fn lockstep_transfer_over_lossless_link() {
    let mut sender = GbnSender::new(2, 4);
    let mut receiver = GbnReceiver::new();
    let mut out = Vec::new();

    let (a, action) = sender.send_next(b"A".to_vec()).unwrap();
    assert_eq!(action, TimerAction::Start);
    let (b, action) = sender.send_next(b"B".to_vec()).unwrap();
    assert_eq!(action, TimerAction::Keep);
    assert!(!sender.can_send(), "window of 2 is full");

    assert_eq!(deliver(&mut receiver, a, &mut out), Some(0));
    assert_eq!(deliver(&mut receiver, b, &mut out), Some(1));

    assert_eq!(sender.on_ack(0).timer, TimerAction::Restart);
    assert_eq!(sender.on_ack(1).timer, TimerAction::Stop);
    assert_eq!(sender.base(), 2);

    let (c, _) = sender.send_next(b"C".to_vec()).unwrap();
    assert_eq!(deliver(&mut receiver, c, &mut out), Some(2));
    assert_eq!(sender.on_ack(2).acked, 1);

    let (fin, _) = sender.finish().unwrap();
    assert_eq!(fin, Packet::fin(3));
    let outcome = receiver.on_packet(fin);
    assert!(outcome.end_of_stream);
    assert_eq!(outcome.ack, Some(Packet::ack(3)));

    let outcome = sender.on_ack(3);
    assert_eq!(outcome.timer, TimerAction::Stop);
    assert_eq!(sender.state(), SenderState::Done);
    assert_eq!(out, b"ABC");
    assert_eq!(sender.retransmissions(), 0);
}

#[test]
fn lost_packet_recovered_by_go_back_n() {
    let mut sender = GbnSender::new(2, 4);
    let mut receiver = GbnReceiver::new();
    let mut out = Vec::new();

    let (p0, _) = sender.send_next(b"0".to_vec()).unwrap();
    let (_lost, _) = sender.send_next(b"1".to_vec()).unwrap();
    assert!(!sender.can_send());

    // seq 1 is dropped in transit.
    let ack = deliver(&mut receiver, p0, &mut out).unwrap();
    assert_eq!(ack, 0);
    assert_eq!(sender.on_ack(ack).timer, TimerAction::Restart);
    assert!(sender.can_send(), "ACK 0 slides the window");

    let (p2, _) = sender.send_next(b"2".to_vec()).unwrap();
    assert_eq!(p2.seq(), 2);
    // Out of order: discarded and answered with a repeat of ACK 0.
    assert_eq!(deliver(&mut receiver, p2, &mut out), Some(0));
    assert_eq!(receiver.discarded(), 1);
    assert_eq!(sender.on_ack(0).acked, 0);

    let resend = sender.on_timeout().unwrap();
    assert_eq!(resend.iter().map(Packet::seq).collect::<Vec<_>>(), vec![1, 2]);
    for pkt in resend {
        let ack = deliver(&mut receiver, pkt, &mut out).unwrap();
        sender.on_ack(ack);
    }
    assert_eq!(sender.base(), 3);
    assert!(!sender.has_unacked());

    let (fin, _) = sender.finish().unwrap();
    let outcome = receiver.on_packet(fin);
    assert!(outcome.end_of_stream);
    let ack = outcome.ack.unwrap().seq();
    assert_eq!(sender.on_ack(ack).timer, TimerAction::Stop);

    assert!(sender.is_done());
    assert_eq!(out, b"012");
    assert_eq!(sender.retransmissions(), 2);
}

#[test]
fn corrupted_packet_triggers_repeat_ack() {
    let mut sender = GbnSender::new(4, 4);
    let mut receiver = GbnReceiver::new();
    let mut out = Vec::new();

    let (p0, _) = sender.send_next(b"first".to_vec()).unwrap();
    let (p1, _) = sender.send_next(b"second".to_vec()).unwrap();

    assert_eq!(deliver(&mut receiver, p0, &mut out), Some(0));
    let mut bytes = p1.encode();
    bytes[10] ^= 0xFF;
    let outcome = receiver.on_datagram(Packet::decode(&bytes));
    assert_eq!(outcome.ack, Some(Packet::ack(0)));
    assert_eq!(receiver.corrupted(), 1);

    sender.on_ack(0);
    assert_eq!(sender.base(), 1);
    assert_eq!(sender.in_flight(), 1);
}

// ---------------------------------------------------------------------------
// End-to-end over loopback
// ---------------------------------------------------------------------------

fn sample_data(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i * 31 % 251) as u8).collect()
}

async fn start_server(
    config: ArqConfig,
) -> (SocketAddr, JoinHandle<Result<(server::ReceiveReport, Vec<u8>), TransferError>>) {
    let socket = Socket::bind("127.0.0.1:0".parse().unwrap()).await.unwrap();
    let addr = socket.local_addr;
    let task = tokio::spawn(async move {
        let mut out = Vec::new();
        let report =
            server::receive_stream(&socket, &mut out, &config, std::future::pending()).await?;
        Ok((report, out))
    });
    (addr, task)
}

async fn start_relay(
    forward: SocketAddr,
    config: SimulatorConfig,
) -> (SocketAddr, oneshot::Sender<()>, JoinHandle<Result<RelayStats, TransferError>>) {
    let relay = Relay::bind("127.0.0.1:0".parse().unwrap(), forward, config)
        .await
        .unwrap();
    let addr = relay.local_addr();
    let (stop_tx, stop_rx) = oneshot::channel::<()>();
    let task = tokio::spawn(relay.run(async move {
        let _ = stop_rx.await;
    }));
    (addr, stop_tx, task)
}

async fn client_socket() -> Socket {
    Socket::bind("127.0.0.1:0".parse().unwrap()).await.unwrap()
}

#[tokio::test]
async fn transfer_through_transparent_simulator() {
    let config = ArqConfig {
        chunk_size: 512,
        ..ArqConfig::default().with_timeout(Duration::from_millis(100))
    };
    let (server_addr, server_task) = start_server(config.clone()).await;
    let (relay_addr, stop_relay, relay_task) =
        start_relay(server_addr, SimulatorConfig::default()).await;

    let data = sample_data(10_000);
    let socket = client_socket().await;
    let report = client::send_stream(
        &socket,
        relay_addr,
        std::io::Cursor::new(data.clone()),
        &config,
        std::future::pending(),
    )
    .await
    .unwrap();

    assert_eq!(report.bytes, 10_000);
    // 20 DATA packets plus the FIN.
    assert_eq!(report.packets, 21);

    let (received, out) = server_task.await.unwrap().unwrap();
    assert_eq!(out, data);
    assert_eq!(received.packets, 20);

    stop_relay.send(()).unwrap();
    let stats = relay_task.await.unwrap().unwrap();
    assert_eq!(stats.dropped + stats.corrupted + stats.reordered, 0);
    assert_eq!(stats.forwarded, stats.received);
}

#[tokio::test]
async fn transfer_survives_lossy_corrupting_reordering_link() {
    let client_config = ArqConfig {
        chunk_size: 256,
        ..ArqConfig::default().with_timeout(Duration::from_millis(30))
    };
    let server_config = ArqConfig {
        linger: Duration::from_secs(2),
        ..client_config.clone()
    };
    let (server_addr, server_task) = start_server(server_config).await;
    let (relay_addr, stop_relay, relay_task) = start_relay(
        server_addr,
        SimulatorConfig {
            drop_prob: 0.1,
            corrupt_prob: 0.1,
            reorder_prob: 0.1,
            seed: Some(7),
            reorder_hold: Duration::from_millis(10),
        },
    )
    .await;

    let data = sample_data(16_000);
    let socket = client_socket().await;
    let report = client::send_stream(
        &socket,
        relay_addr,
        std::io::Cursor::new(data.clone()),
        &client_config,
        std::future::pending(),
    )
    .await
    .unwrap();
    assert_eq!(report.bytes, 16_000);

    let (_, out) = server_task.await.unwrap().unwrap();
    assert_eq!(out.len(), data.len());
    assert!(out == data, "received stream differs from the input");

    stop_relay.send(()).unwrap();
    let stats = relay_task.await.unwrap().unwrap();
    assert!(stats.dropped + stats.corrupted + stats.reordered > 0);
}

#[tokio::test]
async fn black_hole_link_exhausts_retries() {
    let config = ArqConfig {
        max_retries: 2,
        ..ArqConfig::default().with_timeout(Duration::from_millis(20))
    };
    let (server_addr, _server_task) = start_server(config.clone()).await;
    let (relay_addr, stop_relay, relay_task) = start_relay(
        server_addr,
        SimulatorConfig {
            drop_prob: 1.0,
            seed: Some(1),
            ..SimulatorConfig::default()
        },
    )
    .await;

    let socket = client_socket().await;
    let err = client::send_stream(
        &socket,
        relay_addr,
        &b"never arrives"[..],
        &config,
        std::future::pending(),
    )
    .await
    .unwrap_err();
    assert!(
        matches!(err, TransferError::RetriesExhausted { seq: 0, retries: 2 }),
        "{err:?}"
    );

    stop_relay.send(()).unwrap();
    let stats = relay_task.await.unwrap().unwrap();
    assert_eq!(stats.forwarded, 0);
    assert_eq!(stats.dropped, stats.received);
}

#[tokio::test]
async fn file_round_trip_on_disk() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("input.bin");
    let output = dir.path().join("output.bin");
    let data = sample_data(5_000);
    std::fs::write(&input, &data).unwrap();

    // Bind the server ourselves so its port is known before the client starts.
    let probe = std::net::UdpSocket::bind("127.0.0.1:0").unwrap();
    let server_addr = probe.local_addr().unwrap();
    drop(probe);

    let config = ArqConfig::default().with_timeout(Duration::from_millis(100));
    let server_config = config.clone();
    let server_output = output.clone();
    let server_task = tokio::spawn(async move {
        server::receive_file(server_addr, &server_output, &server_config, std::future::pending())
            .await
    });
    tokio::time::sleep(Duration::from_millis(50)).await;

    let sent = client::send_file(&input, server_addr, &config, std::future::pending())
        .await
        .unwrap();
    let received = server_task.await.unwrap().unwrap();

    assert_eq!(sent.bytes, 5_000);
    assert_eq!(received.bytes, 5_000);
    assert_eq!(std::fs::read(&output).unwrap(), data);
}

#[tokio::test]
async fn empty_input_sends_only_fin() {
    let config = ArqConfig::default().with_timeout(Duration::from_millis(50));
    let (server_addr, server_task) = start_server(config.clone()).await;

    let socket = client_socket().await;
    let report = client::send_stream(
        &socket,
        server_addr,
        &b""[..],
        &config,
        std::future::pending(),
    )
    .await
    .unwrap();
    assert_eq!(report.bytes, 0);
    assert_eq!(report.packets, 1);

    let (received, out) = server_task.await.unwrap().unwrap();
    assert!(out.is_empty());
    assert_eq!(received.packets, 0);
}
