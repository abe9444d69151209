//! Append-only per-thread message store.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use futures::{Stream, StreamExt};
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;

use super::{Message, ThreadId};

/// Buffered notifications per subscriber before it starts lagging.
const EVENT_CAPACITY: usize = 1024;

/// Notification published for every applied append.
#[derive(Debug, Clone, PartialEq)]
pub struct LogEvent {
    pub thread_id: ThreadId,
    /// Position of the message in its thread.
    pub index: usize,
    pub message: Message,
}

/// Item of [`MessageLog::subscribe_thread`].
#[derive(Debug, Clone, PartialEq)]
pub enum ThreadUpdate {
    Appended(LogEvent),
    /// Appends were missed; `skipped` counts events across all threads.
    Lagged { skipped: u64 },
}

/// Ordered message store shared by every component of the engine.
///
/// Messages are only ever appended. Positions never change once assigned,
/// and subscribers see appends in exactly the order they were applied.
#[derive(Debug, Clone)]
pub struct MessageLog {
    inner: Arc<LogInner>,
}

#[derive(Debug)]
struct LogInner {
    threads: RwLock<HashMap<ThreadId, Vec<Message>>>,
    events: broadcast::Sender<LogEvent>,
}

impl Default for MessageLog {
    fn default() -> Self {
        Self::new()
    }
}

impl MessageLog {
    /// Create an empty log.
    #[must_use]
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            inner: Arc::new(LogInner {
                threads: RwLock::new(HashMap::new()),
                events,
            }),
        }
    }

    /// Append one message to the end of a thread and return the new length.
    pub fn append(&self, thread_id: &ThreadId, message: Message) -> usize {
        let mut guard = self
            .inner
            .threads
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        let messages = guard.entry(thread_id.clone()).or_default();
        messages.push(message.clone());
        let len = messages.len();

        // Published under the write lock so notification order is append order.
        self.notify(thread_id, len - 1, message);
        len
    }

    /// Append a loaded history, but only if the thread is still empty.
    ///
    /// Returns `false` and leaves the log untouched when something was
    /// appended to the thread while the history was in flight.
    pub fn append_history(&self, thread_id: &ThreadId, history: Vec<Message>) -> bool {
        let mut guard = self
            .inner
            .threads
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        let messages = guard.entry(thread_id.clone()).or_default();
        if !messages.is_empty() {
            return false;
        }
        for message in history {
            messages.push(message.clone());
            self.notify(thread_id, messages.len() - 1, message);
        }
        true
    }

    /// Current ordered messages of a thread (empty for unseen threads).
    #[must_use]
    pub fn snapshot(&self, thread_id: &ThreadId) -> Vec<Message> {
        self.inner
            .threads
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(thread_id)
            .cloned()
            .unwrap_or_default()
    }

    #[must_use]
    pub fn len(&self, thread_id: &ThreadId) -> usize {
        self.inner
            .threads
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(thread_id)
            .map_or(0, Vec::len)
    }

    #[must_use]
    pub fn is_empty(&self, thread_id: &ThreadId) -> bool {
        self.len(thread_id) == 0
    }

    /// Subscribe to appends on every thread.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<LogEvent> {
        self.inner.events.subscribe()
    }

    /// Subscribe to appends on one thread.
    ///
    /// A subscriber that falls more than the channel capacity behind gets a
    /// [`ThreadUpdate::Lagged`] in place of the missed appends and should
    /// re-read [`MessageLog::snapshot`].
    pub fn subscribe_thread(
        &self,
        thread_id: ThreadId,
    ) -> impl Stream<Item = ThreadUpdate> + Send + use<> {
        BroadcastStream::new(self.subscribe()).filter_map(move |event| {
            let update = match event {
                Ok(event) if event.thread_id == thread_id => Some(ThreadUpdate::Appended(event)),
                Ok(_) => None,
                Err(BroadcastStreamRecvError::Lagged(skipped)) => {
                    tracing::warn!(
                        name: "log.subscriber.lagged",
                        thread_id = %thread_id,
                        skipped,
                        "Log subscriber fell behind"
                    );
                    Some(ThreadUpdate::Lagged { skipped })
                }
            };
            futures::future::ready(update)
        })
    }

    fn notify(&self, thread_id: &ThreadId, index: usize, message: Message) {
        // No receivers is not an error.
        let _ = self.inner.events.send(LogEvent {
            thread_id: thread_id.clone(),
            index,
            message,
        });
    }
}
