//! Fetches a thread's persisted history when it becomes active.

use std::sync::Arc;

use super::{Message, ThreadId};
use crate::client::{AgentService, RemoteMessage};
use crate::error::Result;

/// Loads history from the service and maps it to domain messages.
#[derive(Clone)]
pub struct HistoryLoader {
    service: Arc<dyn AgentService>,
}

impl std::fmt::Debug for HistoryLoader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HistoryLoader").finish_non_exhaustive()
    }
}

impl HistoryLoader {
    pub fn new(service: Arc<dyn AgentService>) -> Self {
        Self { service }
    }

    /// Ordered history of `thread_id`.
    ///
    /// Failures are logged and yield an empty history; a thread that cannot
    /// be loaded is shown empty rather than blocking activation.
    pub async fn load(&self, thread_id: &ThreadId) -> Vec<Message> {
        match self.try_load(thread_id).await {
            Ok(messages) => {
                tracing::debug!(
                    name: "history.loaded",
                    thread_id = %thread_id,
                    count = messages.len(),
                    "History loaded"
                );
                messages
            }
            Err(e) => {
                tracing::warn!(
                    name: "history.load.failed",
                    thread_id = %thread_id,
                    error = %e,
                    "Failed to load conversation history"
                );
                Vec::new()
            }
        }
    }

    /// Like [`HistoryLoader::load`], but surfaces the failure.
    pub async fn try_load(&self, thread_id: &ThreadId) -> Result<Vec<Message>> {
        let remote = self.service.history(thread_id).await?;
        Ok(remote
            .into_iter()
            .map(RemoteMessage::into_history_message)
            .collect())
    }
}
