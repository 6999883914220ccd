//! Standalone dedicated server.
//!
//! ```text
//! hullnet-server --config server.json --tick-rate 30
//! hullnet-server --relay --port 27016 --owner-key 1234
//! ```
//!
//! Logging follows `RUST_LOG` (default `info`).

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use hullnet::UpnpForwarder;
use hullnet::prelude::*;
use tokio::time::{Duration, Instant, MissedTickBehavior, interval};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// JSON settings file. Defaults apply when omitted.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Port to listen on, overriding the settings file.
    #[arg(short, long)]
    port: Option<u16>,

    /// Serve relay clients over a loopback owner link instead of direct
    /// connections.
    #[arg(long)]
    relay: bool,

    /// Owner key, overriding the settings file. Required with `--relay`.
    #[arg(long)]
    owner_key: Option<i32>,

    /// Updates per second.
    #[arg(short, long, default_value = "30")]
    tick_rate: u32,
}

#[tokio::main]
async fn main() -> Result<(), PeerError> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();

    let mut settings = match &args.config {
        Some(path) => ServerSettings::from_json_file(path)?,
        None => ServerSettings::default(),
    };
    if let Some(port) = args.port {
        settings.port = port;
    }
    if args.owner_key.is_some() {
        settings.owner_key = args.owner_key;
    }
    let settings = settings.validated();

    let authenticator = Arc::new(TrustingAuthenticator);
    let bans: Arc<dyn BanList> = Arc::new(MemoryBanList::new());

    tracing::info!(name = %settings.name, relay = args.relay, "starting server");

    if args.relay {
        let transport = UdpTransport::bind(("127.0.0.1", settings.port)).await?;
        let (peer, events) = RelayServerPeer::new(transport, &settings, authenticator, bans);
        run(peer, events, args.tick_rate).await
    } else {
        let transport = UdpTransport::bind(("0.0.0.0", settings.port)).await?;
        let (peer, events) = DirectServerPeer::new(transport, &settings, authenticator, bans);
        let peer = peer.with_port_forwarder(UpnpForwarder::new(settings.name.clone()));
        run(peer, events, args.tick_rate).await
    }
}

/// Ticks the peer until it shuts down or the process is interrupted.
async fn run<P: ServerPeer>(
    mut peer: P,
    mut events: hullnet::PeerEvents,
    tick_rate: u32,
) -> Result<(), PeerError> {
    peer.start()?;

    let mut ticker = interval(Duration::from_secs_f32(1.0 / tick_rate.max(1) as f32));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);
    let mut last_tick = Instant::now();

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let now = Instant::now();
                peer.update(now - last_tick);
                last_tick = now;

                while let Ok(event) = events.try_recv() {
                    match event {
                        PeerEvent::InitializationComplete(connection) => {
                            tracing::info!(%connection, players = peer.connections().len(), "player joined");
                        }
                        PeerEvent::OwnerDetermined(connection) => {
                            tracing::info!(%connection, "owner joined");
                        }
                        PeerEvent::Disconnected { connection, packet } => {
                            tracing::info!(%connection, reason = %packet, "player left");
                        }
                        PeerEvent::MessageReceived { connection, data } => {
                            tracing::debug!(%connection, len = data.len(), "gameplay message");
                        }
                        PeerEvent::Shutdown => {
                            tracing::info!("server peer shut down");
                            return Ok(());
                        }
                    }
                }
            }
            _ = &mut shutdown => {
                tracing::info!("interrupted, shutting down");
                peer.close(DisconnectReason::ServerShutdown.into());
                return Ok(());
            }
        }
    }
}
