//! Known threads and the active-thread pointer.

use std::collections::HashSet;
use std::sync::Arc;

use tokio::sync::watch;

use super::ThreadId;
use crate::client::AgentService;

/// Point-in-time view of the registry, published to subscribers.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RegistrySnapshot {
    /// Known threads in display order.
    pub threads: Vec<ThreadId>,
    pub active: Option<ThreadId>,
}

/// Single source of truth for which threads exist and which one is shown.
///
/// Threads are never removed. Changes are published through a
/// [`watch`] channel; see [`ThreadRegistry::subscribe`].
#[derive(Clone)]
pub struct ThreadRegistry {
    service: Arc<dyn AgentService>,
    default_thread: ThreadId,
    state: Arc<watch::Sender<RegistrySnapshot>>,
}

impl std::fmt::Debug for ThreadRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ThreadRegistry")
            .field("default_thread", &self.default_thread)
            .field("state", &*self.state.borrow())
            .finish_non_exhaustive()
    }
}

impl ThreadRegistry {
    /// Create an empty registry. `default_thread` is used when the service
    /// reports no threads.
    pub fn new(service: Arc<dyn AgentService>, default_thread: ThreadId) -> Self {
        let (state, _) = watch::channel(RegistrySnapshot::default());
        Self {
            service,
            default_thread,
            state: Arc::new(state),
        }
    }

    /// Refresh from the service and return the known threads.
    ///
    /// The service's order is kept. Threads known before but missing from
    /// the listing (e.g. created locally) stay registered after them. If the
    /// service reports nothing, or cannot be reached, the default thread
    /// stands in for the listing.
    pub async fn list(&self) -> Vec<ThreadId> {
        let remote = match self.service.list_threads().await {
            Ok(threads) => threads,
            Err(e) => {
                tracing::warn!(
                    name: "registry.list.failed",
                    error = %e,
                    "Failed to list conversations"
                );
                Vec::new()
            }
        };
        let listing = if remote.is_empty() {
            vec![self.default_thread.clone()]
        } else {
            remote
        };

        self.state.send_modify(|state| {
            let mut seen = HashSet::new();
            let mut merged = Vec::with_capacity(listing.len() + state.threads.len());
            for id in listing.iter().chain(state.threads.iter()) {
                if seen.insert(id.clone()) {
                    merged.push(id.clone());
                }
            }
            state.threads = merged;
        });

        let threads = self.threads();
        tracing::debug!(name: "registry.listed", count = threads.len(), "Threads listed");
        threads
    }

    /// Register a brand-new thread without contacting the service.
    pub fn create_local(&self) -> ThreadId {
        let id = ThreadId::generate();
        self.state.send_modify(|state| state.threads.push(id.clone()));
        tracing::info!(name: "registry.thread.created", thread_id = %id, "Local thread created");
        id
    }

    /// Point the registry at `thread_id`.
    ///
    /// Unknown ids are ignored and `false` is returned.
    pub fn set_active(&self, thread_id: &ThreadId) -> bool {
        let mut known = false;
        self.state.send_if_modified(|state| {
            known = state.threads.contains(thread_id);
            if !known || state.active.as_ref() == Some(thread_id) {
                return false;
            }
            state.active = Some(thread_id.clone());
            true
        });
        known
    }

    #[must_use]
    pub fn active(&self) -> Option<ThreadId> {
        self.state.borrow().active.clone()
    }

    #[must_use]
    pub fn threads(&self) -> Vec<ThreadId> {
        self.state.borrow().threads.clone()
    }

    #[must_use]
    pub fn contains(&self, thread_id: &ThreadId) -> bool {
        self.state.borrow().threads.contains(thread_id)
    }

    #[must_use]
    pub fn snapshot(&self) -> RegistrySnapshot {
        self.state.borrow().clone()
    }

    /// Receive a notification whenever the thread set or active pointer changes.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<RegistrySnapshot> {
        self.state.subscribe()
    }
}
