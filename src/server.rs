//! The public `Server` type: ties the Registry, Acceptor, Writer, and caller
//! callbacks together behind the operations in the base spec's §4.5.
//!
//! Shaped after the teacher's `Server<Protocol>` builder
//! (`examples/boltlabs-inc-zeekoe/src/transport/server.rs`) and the
//! broadcast-channel shutdown signal used in its binary entry points
//! (`examples/boltlabs-inc-zeekoe/src/bin/customer/run.rs`).

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::net::TcpListener;
use tokio::sync::{broadcast, Mutex};
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::acceptor;
use crate::callbacks::Callbacks;
use crate::config::Config;
use crate::error::ServerError;
use crate::identity::ClientId;
use crate::initializer::InitializerContext;
use crate::message::Message;
use crate::registry::Registry;
use crate::tls;
use crate::writer::Writer;

pub struct ServerBuilder {
    config: Config,
    callbacks: Callbacks,
}

impl ServerBuilder {
    pub fn new(config: Config) -> Self {
        ServerBuilder {
            config,
            callbacks: Callbacks::default(),
        }
    }

    pub fn on_connected<F, Fut>(mut self, callback: F) -> Self
    where
        F: Fn(ClientId) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.callbacks.on_connected = Some(Arc::new(move |id| Box::pin(callback(id))));
        self
    }

    pub fn on_disconnected<F, Fut>(mut self, callback: F) -> Self
    where
        F: Fn(ClientId) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.callbacks.on_disconnected = Some(Arc::new(move |id| Box::pin(callback(id))));
        self
    }

    pub fn on_message<F, Fut>(mut self, callback: F) -> Self
    where
        F: Fn(ClientId, Vec<u8>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.callbacks.on_message = Some(Arc::new(move |id, payload| {
            Box::pin(callback(id, payload)) as Pin<Box<dyn Future<Output = ()> + Send>>
        }));
        self
    }

    pub fn build(self) -> Result<Server, ServerError> {
        self.config.validate()?;
        let registry = Arc::new(Registry::new());
        let writer = Writer::new(registry.clone());
        Ok(Server {
            config: self.config,
            registry,
            writer,
            callbacks: self.callbacks,
            shutdown: broadcast::channel(1).0,
            tasks: Mutex::new(Vec::new()),
            shut_down: AtomicBool::new(false),
        })
    }
}

/// A running (or not-yet-started) framed message server.
pub struct Server {
    config: Config,
    registry: Arc<Registry>,
    /// One `Writer`, holding the single process-wide send mutex, shared by every
    /// send operation and by the Initializer's auth prompts. Never re-created —
    /// a fresh `Writer` would mean a fresh, uncontended mutex, defeating the
    /// cross-client serialization guarantee.
    writer: Writer,
    callbacks: Callbacks,
    shutdown: broadcast::Sender<()>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
    shut_down: AtomicBool,
}

impl Server {
    pub fn builder(config: Config) -> ServerBuilder {
        ServerBuilder::new(config)
    }

    /// Bind the listener, optionally build the TLS acceptor, and spawn the
    /// Acceptor (and, if configured, the unauthenticated-grace-period reaper).
    /// Returns the bound address, which matters when `listen_port` is `0` (bind to
    /// an OS-assigned ephemeral port).
    pub async fn start(&self) -> Result<std::net::SocketAddr, ServerError> {
        let addr = acceptor::local_addr(self.config.listen_ip, self.config.listen_port);
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|source| ServerError::Bind { addr, source })?;
        let bound_addr = listener.local_addr().unwrap_or(addr);

        let tls_acceptor = match self.config.mode {
            crate::config::Mode::Plain => None,
            crate::config::Mode::Tls => {
                let path = self
                    .config
                    .tls_identity_path
                    .as_ref()
                    .expect("validated at construction");
                let password = self
                    .config
                    .tls_identity_password
                    .as_deref()
                    .unwrap_or_default();
                let identity = tls::load_identity(path, password)?;
                let acceptor = tls::build_acceptor(identity).map_err(ServerError::Acceptor)?;
                Some(Arc::new(acceptor))
            }
        };

        let ctx = InitializerContext {
            tls_acceptor,
            tls_policy: self.config.tls_policy,
            shared_secret: self.config.shared_secret.clone(),
            registry: self.registry.clone(),
            writer: self.writer.clone(),
            callbacks: self.callbacks.clone(),
        };

        let allow_list = self.config.allow_list.clone();
        let shutdown_rx = self.shutdown.subscribe();
        let acceptor_task = tokio::spawn(acceptor::run(listener, allow_list, ctx, shutdown_rx));

        let mut tasks = self.tasks.lock().await;
        tasks.push(acceptor_task);

        if let Some(grace_period) = self.config.unauthenticated_grace_period {
            let registry = self.registry.clone();
            let mut shutdown_rx = self.shutdown.subscribe();
            tasks.push(tokio::spawn(async move {
                reap_unauthenticated(registry, grace_period, &mut shutdown_rx).await;
            }));
        }

        Ok(bound_addr)
    }

    pub async fn send(&self, id: &str, payload: Vec<u8>) -> bool {
        self.writer.send_payload(id, payload).await
    }

    pub async fn send_message(&self, id: &str, message: Message) -> bool {
        self.writer.send_message(id, message).await
    }

    pub fn send_async(&self, id: ClientId, payload: Vec<u8>) -> JoinHandle<bool> {
        self.writer.send_payload_async(id, payload)
    }

    pub fn send_message_async(&self, id: ClientId, message: Message) -> JoinHandle<bool> {
        self.writer.send_message_async(id, message)
    }

    pub fn is_client_connected(&self, id: &str) -> bool {
        self.registry.contains(id)
    }

    pub fn list_clients(&self) -> Vec<ClientId> {
        self.registry.list()
    }

    /// Dispose the named client's record, if present. The owning Reader observes
    /// the disconnect signal and runs its own exit path; this call does not wait
    /// for that to happen.
    pub async fn disconnect_client(&self, id: &str) {
        match self.registry.get(id) {
            Some(record) => record.dispose().await,
            None => warn!(identity = %id, "disconnect_client: no such client"),
        }
    }

    /// Idempotent: cancels the Acceptor and reaper, disposes every live client, and
    /// returns once every Reader has run its exit path and the Acceptor/reaper
    /// tasks have stopped.
    pub async fn shutdown(&self) {
        if self.shut_down.swap(true, Ordering::SeqCst) {
            return;
        }
        info!("shutting down");
        let _ = self.shutdown.send(());
        self.registry.dispose_all().await;
        self.registry.join_readers().await;

        let mut tasks = self.tasks.lock().await;
        for task in tasks.drain(..) {
            let _ = task.await;
        }
    }
}

async fn reap_unauthenticated(
    registry: Arc<Registry>,
    grace_period: Duration,
    shutdown: &mut broadcast::Receiver<()>,
) {
    let mut interval = tokio::time::interval(Duration::from_secs(1).min(grace_period));
    loop {
        tokio::select! {
            _ = interval.tick() => {}
            _ = shutdown.recv() => break,
        }
        for id in registry.expired_unauthenticated(grace_period, Instant::now()) {
            if let Some(record) = registry.get(id.as_str()) {
                info!(identity = %id, "unauthenticated grace period expired");
                record.dispose().await;
            }
        }
    }
}
