//! Entry point for `gbn-arq`.
//!
//! Parses CLI arguments and dispatches into **server**, **client** or
//! **simulator** mode.  All protocol work is delegated to library modules;
//! `main.rs` owns only process setup (logging, signal handling, argument
//! parsing).
//!
//! Typical intermediated topology:
//!
//! ```text
//! gbn-arq server    --port 9000 --output out.bin
//! gbn-arq simulator --listen 127.0.0.1:8000 --forward 127.0.0.1:9000 --drop-prob 0.1
//! gbn-arq client    --target 127.0.0.1:8000 --input in.bin
//! ```

use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, Subcommand};

use gbn_arq::config::{
    ArqConfig, DEFAULT_CHUNK_SIZE, DEFAULT_MAX_RETRIES, DEFAULT_WINDOW_SIZE,
};
use gbn_arq::simulator::{Relay, SimulatorConfig};
use gbn_arq::{client, server};

/// Reliable file transfer over UDP with Go-Back-N.
#[derive(Parser)]
#[command(author, version, about)]
struct Cli {
    #[command(subcommand)]
    mode: Mode,
}

#[derive(Subcommand)]
enum Mode {
    /// Receive one file and write it to disk.
    Server {
        /// UDP port to listen on.
        #[arg(short, long, default_value_t = 9000)]
        port: u16,
        /// Local address to bind.
        #[arg(long, default_value = "0.0.0.0")]
        bind_ip: IpAddr,
        /// Where to save the incoming file.
        #[arg(short, long, default_value = "received_file.dat")]
        output: PathBuf,
        /// Retransmission timeout the client uses; sets the default linger.
        #[arg(long, default_value_t = 1000)]
        timeout_ms: u64,
        /// Quiet period after end of stream before exiting.
        #[arg(long)]
        linger_ms: Option<u64>,
    },
    /// Send one file to the server (usually via the simulator).
    Client {
        /// Address of the simulator, or of the server when run direct.
        #[arg(short, long, default_value = "127.0.0.1:8000")]
        target: SocketAddr,
        /// File to send.
        #[arg(short, long)]
        input: PathBuf,
        /// Go-Back-N window size in packets.
        #[arg(short, long, default_value_t = DEFAULT_WINDOW_SIZE)]
        window: usize,
        /// Payload bytes per packet.
        #[arg(long, default_value_t = DEFAULT_CHUNK_SIZE)]
        chunk_size: usize,
        /// Retransmission timeout.
        #[arg(long, default_value_t = 1000)]
        timeout_ms: u64,
        /// Retransmissions of one packet before giving up.
        #[arg(long, default_value_t = DEFAULT_MAX_RETRIES)]
        max_retries: u32,
    },
    /// Relay datagrams between client and server, impairing them.
    Simulator {
        /// Client-facing address.
        #[arg(long, default_value = "127.0.0.1:8000")]
        listen: SocketAddr,
        /// Server address.
        #[arg(long, default_value = "127.0.0.1:9000")]
        forward: SocketAddr,
        #[arg(long, default_value_t = 0.0)]
        drop_prob: f64,
        #[arg(long, default_value_t = 0.0)]
        corrupt_prob: f64,
        #[arg(long, default_value_t = 0.0)]
        reorder_prob: f64,
        /// Seed for reproducible impairment decisions.
        #[arg(long)]
        seed: Option<u64>,
        /// Longest a reordered datagram waits for a successor.
        #[arg(long, default_value_t = 50)]
        reorder_hold_ms: u64,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // RUST_LOG controls verbosity; completion lines are logged at info.
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    match cli.mode {
        Mode::Server {
            port,
            bind_ip,
            output,
            timeout_ms,
            linger_ms,
        } => {
            let mut config = ArqConfig::default().with_timeout(Duration::from_millis(timeout_ms));
            if let Some(ms) = linger_ms {
                config.linger = Duration::from_millis(ms);
            }
            let bind = SocketAddr::new(bind_ip, port);
            server::receive_file(bind, &output, &config, shutdown_signal())
                .await
                .with_context(|| format!("receiving into {}", output.display()))?;
        }
        Mode::Client {
            target,
            input,
            window,
            chunk_size,
            timeout_ms,
            max_retries,
        } => {
            let config = ArqConfig {
                window_size: window,
                chunk_size,
                max_retries,
                ..ArqConfig::default().with_timeout(Duration::from_millis(timeout_ms))
            };
            client::send_file(&input, target, &config, shutdown_signal())
                .await
                .with_context(|| format!("sending {} to {target}", input.display()))?;
        }
        Mode::Simulator {
            listen,
            forward,
            drop_prob,
            corrupt_prob,
            reorder_prob,
            seed,
            reorder_hold_ms,
        } => {
            let config = SimulatorConfig {
                drop_prob,
                corrupt_prob,
                reorder_prob,
                seed,
                reorder_hold: Duration::from_millis(reorder_hold_ms),
            };
            let relay = Relay::bind(listen, forward, config)
                .await
                .context("starting simulator")?;
            relay.run(shutdown_signal()).await?;
        }
    }

    Ok(())
}

/// Resolves on Ctrl-C.  If the handler cannot be installed, never resolves.
async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        log::warn!("cannot listen for Ctrl-C: {e}");
        std::future::pending::<()>().await;
    }
    log::info!("shutdown requested");
}
