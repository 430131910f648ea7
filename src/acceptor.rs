//! The Acceptor: the long-running accept loop bound to the listening socket.
//!
//! Adapted from the teacher's `Server::serve_while` accept loop
//! (`examples/boltlabs-inc-zeekoe/src/transport/server.rs`): a `tokio::select!`
//! between `listener.accept()` and the shutdown signal, with each accepted
//! connection handed off to a detached per-connection task so a single slow
//! connection can never stall the loop.

use std::net::SocketAddr;
use std::time::Duration;

use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tracing::{error, info, warn};

use crate::initializer::{self, InitializerContext};

pub async fn run(
    listener: TcpListener,
    allow_list: Vec<std::net::IpAddr>,
    ctx: InitializerContext,
    mut shutdown: broadcast::Receiver<()>,
) {
    info!(addr = ?listener.local_addr().ok(), "accepting connections");

    loop {
        let accept_result = tokio::select! {
            result = listener.accept() => result,
            _ = shutdown.recv() => {
                info!("acceptor received shutdown signal");
                break;
            }
        };

        let (tcp_stream, peer_addr) = match accept_result {
            Ok(pair) => pair,
            Err(error) => {
                error!(%error, "accept failed");
                continue;
            }
        };

        if let Err(error) = tcp_stream.set_linger(Some(Duration::from_secs(0))) {
            warn!(%peer_addr, %error, "failed to disable linger");
        }

        if !allow_list.is_empty() && !allow_list.contains(&peer_addr.ip()) {
            warn!(%peer_addr, "rejecting connection: IP not in allow-list");
            continue;
        }

        let ctx = ctx.clone();
        tokio::spawn(async move {
            initializer::initialize(ctx, tcp_stream, peer_addr).await;
        });
    }
}

pub fn local_addr(ip: Option<std::net::IpAddr>, port: u16) -> SocketAddr {
    SocketAddr::new(
        ip.unwrap_or_else(|| std::net::IpAddr::V4(std::net::Ipv4Addr::UNSPECIFIED)),
        port,
    )
}
