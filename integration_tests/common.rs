//! Shared test harness: spin up a real server on a loopback ephemeral port and
//! funnel its callbacks through channels so assertions can `.await` on them.
//!
//! Follows the teacher's `integration_tests/common.rs` convention of a
//! `tracing_subscriber::fmt()`-based logging init shared by every scenario.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::Duration;

use relaylink::{config::Config, ClientId, Server};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tracing_futures::Instrument;

pub fn init_logging() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

/// Grab an OS-assigned loopback port, then immediately release it. There is an
/// unavoidable race between releasing it here and the server binding it, but in
/// practice no other process claims a just-freed ephemeral port during a test run.
pub fn ephemeral_port() -> u16 {
    std::net::TcpListener::bind((Ipv4Addr::LOCALHOST, 0))
        .expect("failed to bind an ephemeral port")
        .local_addr()
        .expect("bound listener has a local address")
        .port()
}

pub fn loopback_config(port: u16) -> Config {
    Config {
        listen_ip: Some(IpAddr::V4(Ipv4Addr::LOCALHOST)),
        listen_port: port,
        ..Config::default()
    }
}

pub struct Events {
    pub connected: mpsc::UnboundedReceiver<ClientId>,
    pub disconnected: mpsc::UnboundedReceiver<ClientId>,
    pub messages: mpsc::UnboundedReceiver<(ClientId, Vec<u8>)>,
}

/// Build a server wired to capture every callback into a channel, start it, and
/// return both the server and the receiving ends of those channels.
pub async fn start_server(config: Config) -> (Server, SocketAddr, Events) {
    init_logging();

    let (connected_tx, connected_rx) = mpsc::unbounded_channel();
    let (disconnected_tx, disconnected_rx) = mpsc::unbounded_channel();
    let (messages_tx, messages_rx) = mpsc::unbounded_channel();

    let server = Server::builder(config)
        .on_connected(move |id| {
            let tx = connected_tx.clone();
            async move {
                let _ = tx.send(id);
            }
            .instrument(tracing::info_span!("on_connected"))
        })
        .on_disconnected(move |id| {
            let tx = disconnected_tx.clone();
            async move {
                let _ = tx.send(id);
            }
            .instrument(tracing::info_span!("on_disconnected"))
        })
        .on_message(move |id, payload| {
            let tx = messages_tx.clone();
            async move {
                let _ = tx.send((id, payload));
            }
            .instrument(tracing::info_span!("on_message"))
        })
        .build()
        .expect("valid test configuration");

    let addr = server.start().await.expect("server failed to start");

    (
        server,
        addr,
        Events {
            connected: connected_rx,
            disconnected: disconnected_rx,
            messages: messages_rx,
        },
    )
}

pub async fn connect(addr: SocketAddr) -> TcpStream {
    TcpStream::connect(addr)
        .await
        .expect("failed to connect to test server")
}

pub const RECV_TIMEOUT: Duration = Duration::from_secs(2);

pub async fn recv_timeout<T>(rx: &mut mpsc::UnboundedReceiver<T>) -> Option<T> {
    tokio::time::timeout(RECV_TIMEOUT, rx.recv())
        .await
        .unwrap_or(None)
}

/// A short wait with no expectation of a channel firing — used to assert a
/// callback does *not* run within a bounded window.
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(200)).await;
}

