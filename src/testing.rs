//! Scripted [`AgentService`] for engine tests.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::sync::atomic::{AtomicUsize, Ordering};

use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;

use crate::client::{AgentService, EventStream, RemoteMessage};
use crate::conversation::ThreadId;
use crate::error::{Error, Result};

/// What one `open_stream` call on a thread does.
pub(crate) enum StreamScript {
    /// Handshake answered with this status.
    Reject(u16),
    /// Handshake succeeds, these items are delivered, then a normal close.
    Events(Vec<Result<String>>),
    /// Handshake succeeds, items are pushed by the test.
    Live(mpsc::UnboundedReceiver<Result<String>>),
    /// Handshake never completes.
    Pending,
}

/// Payload helper: a well-formed batch with one message.
pub(crate) fn batch(role: &str, content: &str) -> Result<String> {
    Ok(serde_json::json!({ "messages": [{ "role": role, "content": content }] }).to_string())
}

/// A mid-stream transport failure.
pub(crate) fn transport_failure() -> Result<String> {
    Err(Error::Api {
        status: 502,
        message: "connection reset by peer".into(),
    })
}

#[derive(Default)]
pub(crate) struct ScriptedService {
    threads: Vec<String>,
    listing_fails: bool,
    histories: HashMap<ThreadId, std::result::Result<Vec<RemoteMessage>, u16>>,
    chat_replies: HashMap<ThreadId, std::result::Result<Vec<RemoteMessage>, u16>>,
    streams: Mutex<HashMap<ThreadId, VecDeque<StreamScript>>>,
    sent: Mutex<Vec<(ThreadId, Vec<String>)>>,
    history_calls: AtomicUsize,
}

impl ScriptedService {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn with_threads<const N: usize>(mut self, ids: [&str; N]) -> Self {
        self.threads = ids.iter().map(ToString::to_string).collect();
        self
    }

    pub(crate) fn failing_listing(mut self) -> Self {
        self.listing_fails = true;
        self
    }

    pub(crate) fn with_history(mut self, id: &str, messages: Vec<RemoteMessage>) -> Self {
        self.histories.insert(ThreadId::from(id), Ok(messages));
        self
    }

    pub(crate) fn with_history_error(mut self, id: &str, status: u16) -> Self {
        self.histories.insert(ThreadId::from(id), Err(status));
        self
    }

    pub(crate) fn with_chat_reply(mut self, id: &str, messages: Vec<RemoteMessage>) -> Self {
        self.chat_replies.insert(ThreadId::from(id), Ok(messages));
        self
    }

    pub(crate) fn with_chat_error(mut self, id: &str, status: u16) -> Self {
        self.chat_replies.insert(ThreadId::from(id), Err(status));
        self
    }

    /// Queue the behaviour of the next `open_stream` on `id`.
    pub(crate) fn with_stream(self, id: &str, script: StreamScript) -> Self {
        self.push_stream(id, script);
        self
    }

    pub(crate) fn push_stream(&self, id: &str, script: StreamScript) {
        self.streams
            .lock()
            .unwrap()
            .entry(ThreadId::from(id))
            .or_default()
            .push_back(script);
    }

    /// Queue a live stream and return the sender feeding it.
    pub(crate) fn live_stream(&self, id: &str) -> mpsc::UnboundedSender<Result<String>> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.push_stream(id, StreamScript::Live(rx));
        tx
    }

    pub(crate) fn sent(&self) -> Vec<(ThreadId, Vec<String>)> {
        self.sent.lock().unwrap().clone()
    }

    pub(crate) fn history_calls(&self) -> usize {
        self.history_calls.load(Ordering::SeqCst)
    }
}

fn api_error(status: u16) -> Error {
    Error::Api {
        status,
        message: format!("scripted status {status}"),
    }
}

#[async_trait::async_trait]
impl AgentService for ScriptedService {
    async fn list_threads(&self) -> Result<Vec<ThreadId>> {
        if self.listing_fails {
            return Err(api_error(503));
        }
        Ok(self.threads.iter().map(|t| ThreadId::from(t.as_str())).collect())
    }

    async fn history(&self, thread_id: &ThreadId) -> Result<Vec<RemoteMessage>> {
        self.history_calls.fetch_add(1, Ordering::SeqCst);
        match self.histories.get(thread_id) {
            Some(Ok(messages)) => Ok(messages.clone()),
            Some(Err(status)) => Err(api_error(*status)),
            None => Ok(Vec::new()),
        }
    }

    async fn chat(&self, thread_id: &ThreadId, messages: Vec<String>) -> Result<Vec<RemoteMessage>> {
        self.sent.lock().unwrap().push((thread_id.clone(), messages));
        match self.chat_replies.get(thread_id) {
            Some(Ok(reply)) => Ok(reply.clone()),
            Some(Err(status)) => Err(api_error(*status)),
            None => Ok(Vec::new()),
        }
    }

    async fn open_stream(&self, thread_id: &ThreadId, messages: Vec<String>) -> Result<EventStream> {
        self.sent.lock().unwrap().push((thread_id.clone(), messages));
        let script = self
            .streams
            .lock()
            .unwrap()
            .get_mut(thread_id)
            .and_then(VecDeque::pop_front)
            .unwrap_or(StreamScript::Events(Vec::new()));

        match script {
            StreamScript::Reject(status) => Err(api_error(status)),
            StreamScript::Events(items) => Ok(Box::pin(futures::stream::iter(items))),
            StreamScript::Live(rx) => Ok(Box::pin(UnboundedReceiverStream::new(rx))),
            StreamScript::Pending => futures::future::pending().await,
        }
    }
}

/// Shared handle so tests can keep inspecting the service after handing it out.
pub(crate) fn shared(service: ScriptedService) -> Arc<ScriptedService> {
    Arc::new(service)
}
