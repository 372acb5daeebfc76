//! Write-back coalescing queue for local field edits.
//!
//! Typing in the prompt editor produces an edit per keystroke; the server
//! only needs the latest value once per flush window. The queue keeps at
//! most one pending value per session and turns bursts of `enqueue` calls
//! into a single persistence write at the end of the window.
//!
//! Any operation that depends on the persisted value (generating a
//! response, replying) must await [`WriteBackQueue::flush`] first, or it
//! races against a stale server-side prompt.

use std::collections::HashMap;
use std::mem;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tracing::warn;

use shared::SessionId;

use crate::transport::PersistenceTransport;

/// How long edits accumulate before the scheduled flush fires.
pub const DEFAULT_FLUSH_WINDOW: Duration = Duration::from_millis(1000);

/// Cheap-to-clone handle over the shared queue state. Construct one per
/// process and pass clones to whatever composes the session view.
pub struct WriteBackQueue<T: PersistenceTransport + 'static> {
    inner: Arc<Inner<T>>,
}

impl<T: PersistenceTransport + 'static> Clone for WriteBackQueue<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

struct Inner<T> {
    transport: T,
    field: String,
    window: Duration,
    pending: Mutex<HashMap<SessionId, String>>,
    flush_scheduled: AtomicBool,
}

impl<T: PersistenceTransport + 'static> WriteBackQueue<T> {
    pub fn new(transport: T, field: impl Into<String>) -> Self {
        Self::with_window(transport, field, DEFAULT_FLUSH_WINDOW)
    }

    pub fn with_window(transport: T, field: impl Into<String>, window: Duration) -> Self {
        Self {
            inner: Arc::new(Inner {
                transport,
                field: field.into(),
                window,
                pending: Mutex::new(HashMap::new()),
                flush_scheduled: AtomicBool::new(false),
            }),
        }
    }

    /// Record `value` as the pending edit for `session_id`, superseding any
    /// earlier unflushed value for that session.
    ///
    /// The first enqueue in an idle period schedules a flush for the end of
    /// the window; further enqueues inside the window neither extend it nor
    /// schedule more flushes. Worst-case write latency is therefore one
    /// window length regardless of continued typing.
    ///
    /// Must be called from within a tokio runtime.
    pub fn enqueue(&self, session_id: &SessionId, value: impl Into<String>) {
        self.inner
            .pending
            .lock()
            .expect("pending edits lock")
            .insert(session_id.clone(), value.into());
        self.schedule_flush();
    }

    /// The latest unflushed value for a session, if any. Used to keep a
    /// refetch from clobbering an edit that has not reached the server yet.
    pub fn pending_value(&self, session_id: &SessionId) -> Option<String> {
        self.inner
            .pending
            .lock()
            .expect("pending edits lock")
            .get(session_id)
            .cloned()
    }

    /// Drain every pending edit to the transport.
    ///
    /// The pending map is swapped for an empty one up front, so edits made
    /// while writes are in flight accumulate for the next flush instead of
    /// racing with this one. Entries are written independently; a failed
    /// write is logged and that edit dropped. Resolves once every write has
    /// settled.
    pub async fn flush(&self) {
        self.inner.flush().await;
    }

    fn schedule_flush(&self) {
        if self.inner.flush_scheduled.swap(true, Ordering::SeqCst) {
            // A flush is already scheduled for this window.
            return;
        }
        let inner = Arc::clone(&self.inner);
        tokio::spawn(async move {
            tokio::time::sleep(inner.window).await;
            // Clear before flushing so an enqueue arriving mid-flush opens
            // the next window.
            inner.flush_scheduled.store(false, Ordering::SeqCst);
            inner.flush().await;
        });
    }
}

impl<T: PersistenceTransport> Inner<T> {
    async fn flush(&self) {
        let snapshot = mem::take(&mut *self.pending.lock().expect("pending edits lock"));
        for (session_id, value) in snapshot {
            if let Err(e) = self
                .transport
                .write_field(&session_id, &self.field, &value)
                .await
            {
                warn!(%session_id, field = %self.field, "dropping unsaved edit: {e}");
            }
        }
    }
}
