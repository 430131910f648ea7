//! Send operations. All writes, across all connected clients, funnel through one
//! process-wide mutual-exclusion primitive — preserved faithfully per the base
//! spec's framing of this as "the correctness contract of the server" (see
//! DESIGN.md's open-question decision on global send serialization).

use std::sync::Arc;

use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::warn;

use crate::identity::ClientId;
use crate::message::Message;
use crate::registry::Registry;

#[derive(Clone)]
pub struct Writer {
    registry: Arc<Registry>,
    send_lock: Arc<Mutex<()>>,
}

impl Writer {
    pub fn new(registry: Arc<Registry>) -> Self {
        Writer {
            registry,
            send_lock: Arc::new(Mutex::new(())),
        }
    }

    pub async fn send_payload(&self, id: &str, payload: Vec<u8>) -> bool {
        self.send_message(id, Message::normal(payload)).await
    }

    pub async fn send_message(&self, id: &str, message: Message) -> bool {
        let record = match self.registry.get(id) {
            Some(record) => record,
            None => {
                warn!(identity = %id, "send to unknown identity");
                return false;
            }
        };

        let bytes = message.encode();

        // Held across the write+flush, not across the Registry lookup above: the
        // lock's only job is to serialize the bytes actually hitting the wire.
        let _guard = self.send_lock.lock().await;
        let mut write_half = record.write_half().await;
        match write_half.as_mut() {
            Some(stream) => match send_bytes(stream, &bytes).await {
                Ok(()) => true,
                Err(error) => {
                    warn!(identity = %id, %error, "send failed");
                    false
                }
            },
            None => {
                warn!(identity = %id, "send to already-disposed client");
                false
            }
        }
    }

    pub fn send_payload_async(&self, id: ClientId, payload: Vec<u8>) -> JoinHandle<bool> {
        self.send_message_async(id, Message::normal(payload))
    }

    pub fn send_message_async(&self, id: ClientId, message: Message) -> JoinHandle<bool> {
        let writer = self.clone();
        tokio::spawn(async move { writer.send_message(id.as_str(), message).await })
    }
}

async fn send_bytes<S: tokio::io::AsyncWrite + Unpin>(
    stream: &mut S,
    bytes: &[u8],
) -> std::io::Result<()> {
    stream.write_all(bytes).await?;
    stream.flush().await
}
