//! The per-connection read loop: framed reads, the authentication gate, dispatch,
//! and the exit-path teardown that every termination route funnels through.

use std::sync::Arc;

use tokio::io::ReadHalf;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::callbacks::Callbacks;
use crate::client::ClientRecord;
use crate::identity::ClientId;
use crate::io_stream::IoStream;
use crate::message::{read_message, Message, ReadError, Status};
use crate::registry::Registry;
use crate::writer::Writer;

pub struct Reader {
    id: ClientId,
    /// This Reader's own record, kept so its exit path can prove to the Registry
    /// that it still owns `id` before removing anything under that key (see
    /// `Registry::remove_if_current`).
    record: Arc<ClientRecord>,
    read_half: ReadHalf<IoStream>,
    disconnect: Arc<Notify>,
    registry: Arc<Registry>,
    writer: Writer,
    callbacks: Callbacks,
    shared_secret: Option<String>,
}

impl Reader {
    #[allow(clippy::too_many_arguments)]
    pub fn spawn(
        id: ClientId,
        record: Arc<ClientRecord>,
        read_half: ReadHalf<IoStream>,
        disconnect: Arc<Notify>,
        registry: Arc<Registry>,
        writer: Writer,
        callbacks: Callbacks,
        shared_secret: Option<String>,
    ) -> JoinHandle<()> {
        let reader = Reader {
            id,
            record,
            read_half,
            disconnect,
            registry,
            writer,
            callbacks,
            shared_secret,
        };
        tokio::spawn(reader.run())
    }

    async fn run(mut self) {
        loop {
            let message = tokio::select! {
                result = read_message(&mut self.read_half) => match result {
                    Ok(message) => message,
                    Err(ReadError::Closed) => {
                        debug!(identity = %self.id, "peer closed the connection");
                        break;
                    }
                    Err(error) => {
                        warn!(identity = %self.id, %error, "framed read failed");
                        break;
                    }
                },
                () = self.disconnect.notified() => {
                    debug!(identity = %self.id, "disconnect requested");
                    break;
                }
            };
            self.handle_message(message).await;
        }
        self.exit().await;
    }

    async fn handle_message(&self, message: Message) {
        if self.shared_secret.is_some() && self.registry.is_unauthenticated(self.id.as_str()) {
            self.auth_gate(message).await;
            return;
        }
        self.callbacks.fire_message(self.id.clone(), message.payload);
    }

    async fn auth_gate(&self, message: Message) {
        // `shared_secret` is always `Some` here: the only caller checks it first.
        let secret = self.shared_secret.as_deref().unwrap_or_default();
        match message.status {
            Status::AuthRequired if !message.auth.is_empty() => {
                let provided = String::from_utf8_lossy(&message.auth);
                if provided.trim() == secret.trim() {
                    self.registry.clear_unauthenticated(self.id.as_str());
                    self.reply(Status::AuthSuccess, "Authentication successful").await;
                } else {
                    self.reply(Status::AuthFailure, "Authentication declined").await;
                }
            }
            Status::AuthRequired => {
                self.reply(Status::AuthFailure, "No authentication material").await;
            }
            _ => {
                self.reply(Status::AuthRequired, "Authentication required").await;
            }
        }
    }

    async fn reply(&self, status: Status, text: &'static str) {
        let message = Message::status(status, text.as_bytes().to_vec());
        self.writer.send_message(self.id.as_str(), message).await;
    }

    async fn exit(self) {
        if let Some(record) = self
            .registry
            .remove_if_current(self.id.as_str(), &self.record)
        {
            self.callbacks.fire_disconnected(self.id.clone());
            record.dispose().await;
        }
    }
}
