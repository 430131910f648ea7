//! The Client Record: per-connection state owned by the Registry while live.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::io::{split, ReadHalf, WriteHalf};
use tokio::sync::{Mutex, Notify};

use crate::identity::ClientId;
use crate::io_stream::IoStream;

/// Everything the Reader needs to drive a single connection's read loop. Returned
/// alongside the [`ClientRecord`] by [`ClientRecord::new`] since the read half is
/// owned exclusively by the Reader task, never shared.
pub struct ReadHandle {
    pub id: ClientId,
    pub read_half: ReadHalf<IoStream>,
    pub disconnect: Arc<Notify>,
}

/// Owns a connection's outbound stream half and disposal state. Held by the
/// Registry; looked up by the Writer and by administrative operations.
pub struct ClientRecord {
    pub id: ClientId,
    pub is_tls: bool,
    write_half: Mutex<Option<WriteHalf<IoStream>>>,
    disconnect: Arc<Notify>,
    disposed: AtomicBool,
}

impl ClientRecord {
    /// Split a freshly accepted stream into a `ClientRecord` (outbound half, for the
    /// Registry) and a `ReadHandle` (inbound half, for the Reader task).
    pub fn new(id: ClientId, stream: IoStream) -> (Arc<ClientRecord>, ReadHandle) {
        let is_tls = stream.is_tls();
        let (read_half, write_half) = split(stream);
        let disconnect = Arc::new(Notify::new());

        let record = Arc::new(ClientRecord {
            id: id.clone(),
            is_tls,
            write_half: Mutex::new(Some(write_half)),
            disconnect: disconnect.clone(),
            disposed: AtomicBool::new(false),
        });
        let read_handle = ReadHandle {
            id,
            read_half,
            disconnect,
        };
        (record, read_handle)
    }

    /// Acquire the write half for a single send. `None` if the record has already
    /// been disposed.
    pub async fn write_half(&self) -> tokio::sync::MutexGuard<'_, Option<WriteHalf<IoStream>>> {
        self.write_half.lock().await
    }

    /// Idempotent disposal: wake the Reader (if still blocked on a read) and drop
    /// the outbound half, releasing the stream's resources once the Reader's
    /// inbound half is also dropped. Safe to call concurrently with Reader I/O and
    /// safe to call more than once.
    ///
    /// Uses `notify_one`, not `notify_waiters`: the Reader's `select!` re-creates
    /// its `notified()` future every loop iteration, so a waiter may not be
    /// registered at the instant this runs. `notify_one` stores a permit for
    /// whichever `notified().await` comes next, so the signal is never lost.
    pub async fn dispose(&self) {
        if self.disposed.swap(true, Ordering::SeqCst) {
            return;
        }
        self.disconnect.notify_one();
        self.write_half.lock().await.take();
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::SeqCst)
    }
}
