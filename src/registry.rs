//! The concurrent map of live connections, plus the companion Unauthenticated set.
//!
//! `dashmap` gives lock-free-from-the-caller's-perspective insert/remove/lookup,
//! the property §5 asks for ("support concurrent insert/remove/lookup without
//! external locking"); grounded on its use across this corpus's other servers for
//! exactly that need.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use tokio::sync::Mutex as AsyncMutex;
use tokio::task::JoinHandle;

use crate::client::ClientRecord;
use crate::identity::ClientId;

#[derive(Default)]
pub struct Registry {
    clients: DashMap<ClientId, Arc<ClientRecord>>,
    unauthenticated: DashMap<ClientId, Instant>,
    active_count: AtomicUsize,
    /// Handles of spawned Reader tasks, tracked so shutdown can wait for every
    /// Reader's exit path to actually run (not just for records to be disposed).
    reader_tasks: AsyncMutex<Vec<JoinHandle<()>>>,
}

impl Registry {
    pub fn new() -> Self {
        Registry::default()
    }

    /// Atomically replace any existing record under `id` (disposing it) and insert
    /// `record` in its place.
    pub async fn insert(&self, id: ClientId, record: Arc<ClientRecord>) {
        let previous = self.clients.insert(id, record);
        self.active_count.fetch_add(1, Ordering::SeqCst);
        if let Some(previous) = previous {
            // A reused identity replaced a still-live record; the counter above
            // double-counted it, so correct for the implicit removal here.
            self.active_count.fetch_sub(1, Ordering::SeqCst);
            previous.dispose().await;
        }
    }

    pub fn get(&self, id: &str) -> Option<Arc<ClientRecord>> {
        self.clients.get(id).map(|entry| entry.value().clone())
    }

    pub fn contains(&self, id: &str) -> bool {
        self.clients.contains_key(id)
    }

    pub fn list(&self) -> Vec<ClientId> {
        self.clients.iter().map(|entry| entry.key().clone()).collect()
    }

    pub fn active_count(&self) -> usize {
        self.active_count.load(Ordering::SeqCst)
    }

    /// Remove `id` from both the Registry and the Unauthenticated set, but only if
    /// the record currently stored under `id` is `expected` (compared by pointer
    /// identity, not just by key).
    ///
    /// This guards the connection-reuse race from SPEC_FULL.md §9: if a peer
    /// reconnects under the same `host:port` before the old Reader notices its own
    /// disconnect, `Registry::insert` has already overwritten `id`'s entry with the
    /// new record and disposed the old one. The old Reader's exit path must not be
    /// able to evict that new, live record just because it shares the old record's
    /// key — so it passes its own `Arc<ClientRecord>` here, and a mismatch is
    /// treated the same as "already removed": a no-op that disposes nothing of the
    /// new connection's state (Registry or Unauthenticated set).
    pub fn remove_if_current(
        &self,
        id: &str,
        expected: &Arc<ClientRecord>,
    ) -> Option<Arc<ClientRecord>> {
        let removed = self.clients.remove_if(id, |_, record| Arc::ptr_eq(record, expected));
        match removed {
            Some((_, record)) => {
                self.unauthenticated.remove(id);
                self.active_count.fetch_sub(1, Ordering::SeqCst);
                Some(record)
            }
            None => None,
        }
    }

    pub fn mark_unauthenticated(&self, id: ClientId, now: Instant) {
        self.unauthenticated.insert(id, now);
    }

    pub fn is_unauthenticated(&self, id: &str) -> bool {
        self.unauthenticated.contains_key(id)
    }

    /// Clear `id`'s pending-authentication state. Returns whether it was present.
    pub fn clear_unauthenticated(&self, id: &str) -> bool {
        self.unauthenticated.remove(id).is_some()
    }

    /// Identities that have been waiting longer than `grace_period` since first
    /// being observed, for the background reaper.
    pub fn expired_unauthenticated(&self, grace_period: Duration, now: Instant) -> Vec<ClientId> {
        self.unauthenticated
            .iter()
            .filter(|entry| now.duration_since(*entry.value()) >= grace_period)
            .map(|entry| entry.key().clone())
            .collect()
    }

    /// Dispose every live record. Deliberately does *not* clear `clients` or
    /// `unauthenticated` itself: each disposed record's own Reader observes the
    /// disconnect, runs its normal exit path (remove + fire `ClientDisconnected` +
    /// dispose), and that is what actually drains the maps. Clearing them here
    /// first would make that `remove` a no-op and silently swallow every
    /// `ClientDisconnected` callback on shutdown.
    pub async fn dispose_all(&self) {
        let records: Vec<Arc<ClientRecord>> = self
            .clients
            .iter()
            .map(|entry| entry.value().clone())
            .collect();
        for record in records {
            record.dispose().await;
        }
    }

    /// Track a spawned Reader task so [`Registry::join_readers`] can wait for it.
    pub async fn track_reader(&self, handle: JoinHandle<()>) {
        let mut tasks = self.reader_tasks.lock().await;
        tasks.retain(|task| !task.is_finished());
        tasks.push(handle);
    }

    /// Wait for every currently-tracked Reader task to finish. Used by shutdown,
    /// after `dispose_all`, to guarantee no Reader is left running on return.
    pub async fn join_readers(&self) {
        let handles: Vec<JoinHandle<()>> = self.reader_tasks.lock().await.drain(..).collect();
        for handle in handles {
            let _ = handle.await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::ClientRecord;
    use crate::io_stream::IoStream;
    use std::net::{IpAddr, Ipv4Addr, SocketAddr};

    fn id(port: u16) -> ClientId {
        ClientId::from(SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), port))
    }

    async fn connected_pair() -> (tokio::net::TcpStream, tokio::net::TcpStream) {
        let listener = tokio::net::TcpListener::bind((Ipv4Addr::LOCALHOST, 0))
            .await
            .unwrap();
        let addr = listener.local_addr().unwrap();
        let connect = tokio::net::TcpStream::connect(addr);
        let accept = listener.accept();
        let (client, (server, _)) = tokio::join!(connect, accept);
        (client.unwrap(), server)
    }

    #[tokio::test]
    async fn insert_and_remove_keep_active_count_in_sync_with_registry_size() {
        let registry = Registry::new();
        let (_client, server_stream) = connected_pair().await;
        let (record, _read_handle) = ClientRecord::new(id(1), IoStream::from(server_stream));

        registry.insert(id(1), record.clone()).await;
        assert_eq!(registry.active_count(), 1);
        assert!(registry.contains(id(1).as_str()));

        let removed = registry.remove_if_current(id(1).as_str(), &record);
        assert!(removed.is_some());
        assert_eq!(registry.active_count(), 0);
        assert!(!registry.contains(id(1).as_str()));
    }

    #[tokio::test]
    async fn remove_if_current_is_a_no_op_when_a_newer_record_owns_the_identity() {
        // Reproduces the connection-reuse race from SPEC_FULL.md §9: a stale
        // Reader's own record has already been replaced in the Registry by a
        // reconnect under the same identity, and must not be able to evict it.
        let registry = Registry::new();
        let (_client_a, server_a) = connected_pair().await;
        let (_client_b, server_b) = connected_pair().await;
        let (record_a, _handle_a) = ClientRecord::new(id(1), IoStream::from(server_a));
        let (record_b, _handle_b) = ClientRecord::new(id(1), IoStream::from(server_b));

        registry.insert(id(1), record_a.clone()).await;
        registry.insert(id(1), record_b.clone()).await;
        registry.mark_unauthenticated(id(1), Instant::now());

        let stale_removal = registry.remove_if_current(id(1).as_str(), &record_a);
        assert!(stale_removal.is_none());
        assert!(registry.contains(id(1).as_str()));
        assert_eq!(registry.active_count(), 1);
        assert!(registry.is_unauthenticated(id(1).as_str()));

        let current_removal = registry.remove_if_current(id(1).as_str(), &record_b);
        assert!(current_removal.is_some());
        assert!(!registry.contains(id(1).as_str()));
        assert_eq!(registry.active_count(), 0);
        assert!(!registry.is_unauthenticated(id(1).as_str()));
    }

    #[tokio::test]
    async fn reinserting_the_same_identity_disposes_the_old_record_without_double_counting() {
        let registry = Registry::new();
        let (_client_a, server_a) = connected_pair().await;
        let (_client_b, server_b) = connected_pair().await;
        let (record_a, _handle_a) = ClientRecord::new(id(1), IoStream::from(server_a));
        let (record_b, _handle_b) = ClientRecord::new(id(1), IoStream::from(server_b));

        registry.insert(id(1), record_a.clone()).await;
        registry.insert(id(1), record_b).await;

        assert_eq!(registry.active_count(), 1);
        assert!(record_a.is_disposed());
    }

    #[tokio::test]
    async fn unauthenticated_set_is_independent_of_registry_removal_order() {
        let registry = Registry::new();
        registry.mark_unauthenticated(id(1), Instant::now());
        assert!(registry.is_unauthenticated(id(1).as_str()));

        assert!(registry.clear_unauthenticated(id(1).as_str()));
        assert!(!registry.is_unauthenticated(id(1).as_str()));
    }

    #[tokio::test]
    async fn dispose_all_does_not_itself_drain_the_registry() {
        // dispose_all only notifies/drops write halves; the owning Reader's exit
        // path (not exercised here, since there is no Reader) is what removes the
        // entry. This guards the shutdown fix: dispose_all must not clear the map
        // itself, or a Reader's subsequent `remove` becomes a no-op and its
        // `ClientDisconnected` callback is silently swallowed.
        let registry = Registry::new();
        let (_client, server_stream) = connected_pair().await;
        let (record, _read_handle) = ClientRecord::new(id(1), IoStream::from(server_stream));
        registry.insert(id(1), record).await;

        registry.dispose_all().await;

        assert!(registry.contains(id(1).as_str()));
        assert_eq!(registry.active_count(), 1);
    }

    #[tokio::test]
    async fn join_readers_waits_for_tracked_tasks() {
        let registry = Registry::new();
        let (tx, rx) = tokio::sync::oneshot::channel::<()>();
        let handle = tokio::spawn(async move {
            let _ = rx.await;
        });
        registry.track_reader(handle).await;

        let _ = tx.send(());
        registry.join_readers().await;
    }
}
