//! Per-thread request routing primitives.
//!
//! Two cooperating structures sit between the Telegram dispatcher and the
//! worker pool:
//!
//! - [`InFlightTracker`] maps a thread to the cancel signal of the turn
//!   currently being served for it. A new message for the same thread sets
//!   the signal; the running turn polls it between streamed chunks.
//! - [`PendingQueue`] holds at most one queued request per thread. A burst
//!   of messages for one thread coalesces to the newest payload while the
//!   thread keeps the FIFO position of its first burst entry. The queue is
//!   unbounded by design and lives inside the pool lock so release-and-
//!   dequeue is atomic.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use indexmap::IndexMap;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

/// A queued inbound request, newest-wins per thread.
#[derive(Debug, Clone)]
pub struct PendingRequest {
    /// Routing key: the conversational thread.
    pub thread_id: i64,
    /// Telegram sender id.
    pub user_id: i64,
    /// Prompt text (message text or media caption).
    pub text: String,
    /// Attachments already downloaded into the thread workspace.
    pub files: Vec<PathBuf>,
    /// Telegram chat the reply goes to.
    pub chat_id: i64,
    /// Telegram forum topic id, when the chat is a forum.
    pub topic_id: Option<i32>,
}

// ── In-flight tracking ───────────────────────────────────────────────────────

/// Tracks the cancel signal of each in-flight turn, keyed by thread.
#[derive(Debug, Clone, Default)]
pub struct InFlightTracker {
    inner: Arc<Mutex<HashMap<i64, CancellationToken>>>,
}

impl InFlightTracker {
    /// Create an empty tracker.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a fresh cancel signal for `thread_id` and return it.
    ///
    /// Replaces any previous entry, preserving the invariant of at most one
    /// in-flight turn per thread.
    pub async fn track(&self, thread_id: i64) -> CancellationToken {
        let token = CancellationToken::new();
        self.inner.lock().await.insert(thread_id, token.clone());
        token
    }

    /// Set the cancel signal for `thread_id`, if one is tracked. Idempotent.
    pub async fn cancel(&self, thread_id: i64) {
        if let Some(token) = self.inner.lock().await.get(&thread_id) {
            token.cancel();
        }
    }

    /// Remove the entry for `thread_id`.
    pub async fn untrack(&self, thread_id: i64) {
        self.inner.lock().await.remove(&thread_id);
    }

    /// Number of tracked turns. Test observability.
    pub async fn len(&self) -> usize {
        self.inner.lock().await.len()
    }

    /// Whether no turn is tracked.
    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

// ── Pending queue ────────────────────────────────────────────────────────────

/// Ordered, per-thread-deduplicated request queue.
///
/// Implemented as an insertion-ordered map: replacing a thread's entry
/// keeps its position, removal shifts the remainder, so FIFO order among
/// distinct threads is stable.
#[derive(Debug, Default)]
pub struct PendingQueue {
    entries: IndexMap<i64, PendingRequest>,
}

impl PendingQueue {
    /// Create an empty queue.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Enqueue `request`, replacing any queued entry for the same thread
    /// in place. Returns `true` when an entry was replaced.
    pub fn enqueue(&mut self, request: PendingRequest) -> bool {
        self.entries.insert(request.thread_id, request).is_some()
    }

    /// Pop the oldest queued request.
    pub fn dequeue(&mut self) -> Option<PendingRequest> {
        self.entries.shift_remove_index(0).map(|(_, req)| req)
    }

    /// Remove and return the queued request for `thread_id`, if any.
    pub fn dequeue_thread(&mut self, thread_id: i64) -> Option<PendingRequest> {
        self.entries.shift_remove(&thread_id)
    }

    /// Remove and return the oldest queued request whose thread satisfies
    /// `pred`.
    pub fn dequeue_where(&mut self, pred: impl Fn(i64) -> bool) -> Option<PendingRequest> {
        let thread_id = self.entries.keys().copied().find(|&tid| pred(tid))?;
        self.entries.shift_remove(&thread_id)
    }

    /// Number of queued requests.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the queue is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Queued thread ids in FIFO order. Test observability.
    #[must_use]
    pub fn thread_order(&self) -> Vec<i64> {
        self.entries.keys().copied().collect()
    }
}
