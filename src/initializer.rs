//! The Connection Initializer: the one-shot per-connection setup sequence between
//! socket accept and the Reader loop starting.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use tokio::net::TcpStream;
use tracing::{info, warn};

use crate::callbacks::Callbacks;
use crate::client::ClientRecord;
use crate::config::TlsPolicy;
use crate::identity::ClientId;
use crate::io_stream::IoStream;
use crate::message::{Message, Status};
use crate::reader::Reader;
use crate::registry::Registry;
use crate::tls;
use crate::writer::Writer;

/// What the Acceptor needs to hand an accepted socket to the Initializer.
#[derive(Clone)]
pub struct InitializerContext {
    pub tls_acceptor: Option<Arc<tokio_native_tls::TlsAcceptor>>,
    pub tls_policy: TlsPolicy,
    pub shared_secret: Option<String>,
    pub registry: Arc<Registry>,
    pub writer: Writer,
    pub callbacks: Callbacks,
}

pub async fn initialize(ctx: InitializerContext, tcp_stream: TcpStream, peer_addr: SocketAddr) {
    let id = ClientId::from(peer_addr);

    let stream: IoStream = match ctx.tls_acceptor {
        None => IoStream::from(tcp_stream),
        Some(acceptor) => match tls::accept(&acceptor, tcp_stream, &ctx.tls_policy).await {
            Ok(tls_stream) => IoStream::from(tls_stream),
            Err(error) => {
                if error.is_routine() {
                    info!(identity = %id, %error, "TLS handshake did not complete");
                } else {
                    warn!(identity = %id, %error, "TLS handshake failed");
                }
                return;
            }
        },
    };

    let (record, read_handle) = ClientRecord::new(id.clone(), stream);
    ctx.registry.insert(id.clone(), record.clone()).await;

    if ctx.shared_secret.is_some() {
        ctx.registry.mark_unauthenticated(id.clone(), Instant::now());
        let prompt = Message::status(Status::AuthRequired, b"Authentication required".to_vec());
        ctx.writer.send_message(id.as_str(), prompt).await;
    }

    ctx.callbacks.fire_connected(id.clone());

    let registry = ctx.registry.clone();
    let handle = Reader::spawn(
        id,
        record,
        read_handle.read_half,
        read_handle.disconnect,
        ctx.registry,
        ctx.writer,
        ctx.callbacks,
        ctx.shared_secret,
    );
    registry.track_reader(handle).await;
}
