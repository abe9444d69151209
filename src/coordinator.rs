//! Top-level state machine routing sends and thread switches.
//!
//! The coordinator owns the thread → current-session map and guarantees at
//! most one non-terminal [`StreamingSession`] per thread: a new send on a
//! thread cancels whatever was still streaming there. Switching the active
//! thread never cancels anything; background threads keep streaming into
//! their own logs.
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use agent_chat_client::client::HttpAgentService;
//! use agent_chat_client::conversation::{MessageLog, ThreadId, ThreadRegistry};
//! use agent_chat_client::coordinator::SessionCoordinator;
//! use agent_chat_client::stream::StreamPolicy;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let service = Arc::new(HttpAgentService::new("http://localhost:8000/api/universal-agent")?);
//! let registry = ThreadRegistry::new(service.clone(), ThreadId::from("1"));
//! let coordinator =
//!     SessionCoordinator::new(service, registry, MessageLog::new(), StreamPolicy::default());
//!
//! let threads = coordinator.refresh_threads().await;
//! let session = coordinator.send(&threads[0], "Hello!")?;
//! session.finished().await;
//! # Ok(())
//! # }
//! ```

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::instrument;

use crate::client::{AgentService, RemoteMessage};
use crate::conversation::{HistoryLoader, Message, MessageLog, ThreadId, ThreadRegistry};
use crate::error::{Error, Result};
use crate::stream::{StreamPolicy, StreamingSession};

/// Binds the registry, history loader, sessions and log together.
pub struct SessionCoordinator {
    service: Arc<dyn AgentService>,
    registry: ThreadRegistry,
    log: MessageLog,
    history: HistoryLoader,
    policy: StreamPolicy,
    sessions: Mutex<HashMap<ThreadId, StreamingSession>>,
    /// Threads whose history fetch is in flight.
    loading: Mutex<HashSet<ThreadId>>,
}

impl std::fmt::Debug for SessionCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionCoordinator")
            .field("registry", &self.registry)
            .field("policy", &self.policy)
            .field("sessions", &self.lock_sessions().len())
            .finish_non_exhaustive()
    }
}

impl SessionCoordinator {
    pub fn new(
        service: Arc<dyn AgentService>,
        registry: ThreadRegistry,
        log: MessageLog,
        policy: StreamPolicy,
    ) -> Self {
        Self {
            history: HistoryLoader::new(Arc::clone(&service)),
            service,
            registry,
            log,
            policy,
            sessions: Mutex::new(HashMap::new()),
            loading: Mutex::new(HashSet::new()),
        }
    }

    #[must_use]
    pub fn log(&self) -> &MessageLog {
        &self.log
    }

    #[must_use]
    pub fn registry(&self) -> &ThreadRegistry {
        &self.registry
    }

    #[must_use]
    pub fn active_thread(&self) -> Option<ThreadId> {
        self.registry.active()
    }

    /// Send `text` on `thread_id` through a new streaming session.
    ///
    /// A still-running session on the same thread is cancelled first. The
    /// user's message is in the log when this returns; the reply streams in
    /// on a background task. Must be called inside a Tokio runtime.
    #[instrument(skip(self, text), fields(thread_id = %thread_id))]
    pub fn send(&self, thread_id: &ThreadId, text: &str) -> Result<StreamingSession> {
        self.check_sendable(thread_id, text)?;

        let session = StreamingSession::new(
            thread_id.clone(),
            Arc::clone(&self.service),
            self.log.clone(),
            self.policy,
        );

        let mut sessions = self.lock_sessions();
        if let Some(previous) = sessions.insert(thread_id.clone(), session.clone()) {
            if !previous.is_terminal() {
                tracing::info!(
                    name: "coordinator.session.superseded",
                    previous = %previous.id(),
                    next = %session.id(),
                    "Cancelling previous session on thread"
                );
                previous.cancel();
            }
        }
        session.start(text)?;
        drop(sessions);

        Ok(session)
    }

    /// Send over the non-streaming endpoint and append the whole reply.
    ///
    /// Returns the number of reply messages appended. A failed request is
    /// logged and leaves only the echoed user message behind.
    #[instrument(skip(self, text), fields(thread_id = %thread_id))]
    pub async fn send_unstreamed(&self, thread_id: &ThreadId, text: &str) -> Result<usize> {
        self.check_sendable(thread_id, text)?;
        self.log.append(thread_id, Message::user(text));

        match self.service.chat(thread_id, vec![text.to_string()]).await {
            Ok(reply) => {
                let count = reply.len();
                for remote in reply {
                    self.log
                        .append(thread_id, RemoteMessage::into_streamed_message(remote));
                }
                Ok(count)
            }
            Err(e) => {
                tracing::warn!(
                    name: "coordinator.chat.failed",
                    error = %e,
                    retriable = e.is_retriable(),
                    "Chat request failed"
                );
                Ok(0)
            }
        }
    }

    /// Make `thread_id` the active thread, loading its history if its log
    /// is empty. Returns `false` (and changes nothing) for unknown threads.
    #[instrument(skip(self), fields(thread_id = %thread_id))]
    pub async fn switch_active(&self, thread_id: &ThreadId) -> bool {
        if !self.registry.set_active(thread_id) {
            tracing::debug!(name: "coordinator.switch.unknown", "Ignoring switch to unknown thread");
            return false;
        }
        if self.log.is_empty(thread_id) {
            self.load_history(thread_id).await;
        }
        true
    }

    /// Refresh the thread list from the service. Activates the first thread
    /// when nothing is active yet.
    pub async fn refresh_threads(&self) -> Vec<ThreadId> {
        let threads = self.registry.list().await;
        if self.registry.active().is_none() {
            if let Some(first) = threads.first() {
                self.switch_active(first).await;
            }
        }
        threads
    }

    /// Start a new local thread and make it active.
    pub async fn new_thread(&self) -> ThreadId {
        let id = self.registry.create_local();
        self.switch_active(&id).await;
        id
    }

    /// The most recent session of a thread, finished or not.
    #[must_use]
    pub fn session(&self, thread_id: &ThreadId) -> Option<StreamingSession> {
        self.lock_sessions().get(thread_id).cloned()
    }

    /// Sessions that have not reached a terminal state.
    #[must_use]
    pub fn active_sessions(&self) -> Vec<StreamingSession> {
        self.lock_sessions()
            .values()
            .filter(|s| !s.is_terminal())
            .cloned()
            .collect()
    }

    /// Cancel every live session.
    pub fn shutdown(&self) {
        for session in self.lock_sessions().values() {
            session.cancel();
        }
    }

    fn check_sendable(&self, thread_id: &ThreadId, text: &str) -> Result<()> {
        if text.trim().is_empty() {
            return Err(Error::EmptyMessage);
        }
        if !self.registry.contains(thread_id) {
            return Err(Error::UnknownThread(thread_id.clone()));
        }
        Ok(())
    }

    async fn load_history(&self, thread_id: &ThreadId) {
        let Some(_guard) = LoadingGuard::acquire(&self.loading, thread_id) else {
            return;
        };

        let history = self.history.load(thread_id).await;
        if history.is_empty() {
            return;
        }
        let count = history.len();
        if self.log.append_history(thread_id, history) {
            tracing::debug!(name: "coordinator.history.applied", count, "History applied");
        } else {
            tracing::warn!(
                name: "coordinator.history.discarded",
                count,
                "Thread received messages while history was loading; history discarded"
            );
        }
    }

    fn lock_sessions(&self) -> MutexGuard<'_, HashMap<ThreadId, StreamingSession>> {
        self.sessions.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Marks a thread's history fetch as in flight until dropped.
struct LoadingGuard<'a> {
    loading: &'a Mutex<HashSet<ThreadId>>,
    thread_id: ThreadId,
}

impl<'a> LoadingGuard<'a> {
    fn acquire(loading: &'a Mutex<HashSet<ThreadId>>, thread_id: &ThreadId) -> Option<Self> {
        let inserted = loading
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(thread_id.clone());
        inserted.then(|| Self {
            loading,
            thread_id: thread_id.clone(),
        })
    }
}

impl Drop for LoadingGuard<'_> {
    fn drop(&mut self) {
        self.loading
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.thread_id);
    }
}
