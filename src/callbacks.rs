//! Caller-supplied, optional callback slots, each invoked on a detached task.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use crate::identity::ClientId;

type BoxFuture = Pin<Box<dyn Future<Output = ()> + Send>>;

/// `ClientConnected(identity) -> ()`
pub type ClientConnected = Arc<dyn Fn(ClientId) -> BoxFuture + Send + Sync>;

/// `ClientDisconnected(identity) -> ()`
pub type ClientDisconnected = Arc<dyn Fn(ClientId) -> BoxFuture + Send + Sync>;

/// `MessageReceived(identity, payload) -> ()`
pub type MessageReceived = Arc<dyn Fn(ClientId, Vec<u8>) -> BoxFuture + Send + Sync>;

/// The set of callbacks a caller may install before starting the server. Any slot
/// left `None` is simply skipped.
#[derive(Clone, Default)]
pub struct Callbacks {
    pub on_connected: Option<ClientConnected>,
    pub on_disconnected: Option<ClientDisconnected>,
    pub on_message: Option<MessageReceived>,
}

impl Callbacks {
    pub fn fire_connected(&self, id: ClientId) {
        if let Some(callback) = self.on_connected.clone() {
            tokio::spawn(async move { callback(id).await });
        }
    }

    pub fn fire_disconnected(&self, id: ClientId) {
        if let Some(callback) = self.on_disconnected.clone() {
            tokio::spawn(async move { callback(id).await });
        }
    }

    pub fn fire_message(&self, id: ClientId, payload: Vec<u8>) {
        if let Some(callback) = self.on_message.clone() {
            tokio::spawn(async move { callback(id, payload).await });
        }
    }
}
