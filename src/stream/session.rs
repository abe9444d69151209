use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use futures::StreamExt;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;
use uuid::Uuid;

use super::{SessionState, StreamPolicy};
use crate::client::{AgentService, StreamBatch};
use crate::conversation::{Message, MessageLog, ThreadId};
use crate::error::{Error, Result};

/// One live event connection delivering a single outgoing message and the
/// assistant's reply increments into its owner thread's log.
///
/// Cloning yields another handle to the same session.
#[derive(Clone)]
pub struct StreamingSession {
    inner: Arc<SessionInner>,
}

struct SessionInner {
    id: Uuid,
    owner: ThreadId,
    /// Authoritative state. Held while appending so that a terminal
    /// transition and an append can never interleave.
    state: Mutex<SessionState>,
    /// Published copy of `state` for observers.
    state_tx: watch::Sender<SessionState>,
    cancel: CancellationToken,
    received: AtomicUsize,
    service: Arc<dyn AgentService>,
    log: MessageLog,
    policy: StreamPolicy,
}

impl std::fmt::Debug for StreamingSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamingSession")
            .field("id", &self.inner.id)
            .field("owner", &self.inner.owner)
            .field("state", &self.state())
            .field("received", &self.received())
            .finish_non_exhaustive()
    }
}

impl StreamingSession {
    /// Create an idle session appending to `owner`.
    pub fn new(
        owner: ThreadId,
        service: Arc<dyn AgentService>,
        log: MessageLog,
        policy: StreamPolicy,
    ) -> Self {
        let (state_tx, _) = watch::channel(SessionState::Idle);
        Self {
            inner: Arc::new(SessionInner {
                id: Uuid::new_v4(),
                owner,
                state: Mutex::new(SessionState::Idle),
                state_tx,
                cancel: CancellationToken::new(),
                received: AtomicUsize::new(0),
                service,
                log,
                policy,
            }),
        }
    }

    /// Correlation id used in logs.
    #[must_use]
    pub fn id(&self) -> Uuid {
        self.inner.id
    }

    #[must_use]
    pub fn owner(&self) -> &ThreadId {
        &self.inner.owner
    }

    #[must_use]
    pub fn state(&self) -> SessionState {
        *self.lock_state()
    }

    #[must_use]
    pub fn is_terminal(&self) -> bool {
        self.state().is_terminal()
    }

    /// Observe state transitions.
    #[must_use]
    pub fn watch_state(&self) -> watch::Receiver<SessionState> {
        self.inner.state_tx.subscribe()
    }

    /// Number of streamed messages this session appended.
    #[must_use]
    pub fn received(&self) -> usize {
        self.inner.received.load(Ordering::Acquire)
    }

    /// Wait until the session reaches `closed` or `errored`.
    pub async fn finished(&self) -> SessionState {
        let mut rx = self.watch_state();
        match rx.wait_for(|state| state.is_terminal()).await {
            Ok(state) => *state,
            Err(_) => self.state(),
        }
    }

    /// Echo `text` into the owner's log, then open the stream on a new task.
    ///
    /// The echo is appended before any network activity, whatever the
    /// handshake later does. The returned handle resolves with the terminal
    /// state.
    pub fn start(&self, text: impl Into<String>) -> Result<JoinHandle<SessionState>> {
        let text = text.into();
        {
            let mut state = self.lock_state();
            if *state != SessionState::Idle {
                return Err(Error::AlreadyStarted);
            }
            self.inner
                .log
                .append(&self.inner.owner, Message::user(text.clone()));
            *state = SessionState::Connecting;
            self.inner.state_tx.send_replace(SessionState::Connecting);
        }

        let span = tracing::info_span!(
            "stream_session",
            session_id = %self.inner.id,
            thread_id = %self.inner.owner,
        );
        let session = self.clone();
        Ok(tokio::spawn(async move { session.drive(text).await }.instrument(span)))
    }

    /// Stop the session. Idempotent; never removes appended messages.
    pub fn cancel(&self) {
        let was_live = self.transition(SessionState::Closed);
        self.inner.cancel.cancel();
        if was_live {
            tracing::info!(
                name: "stream.session.cancelled",
                session_id = %self.inner.id,
                thread_id = %self.inner.owner,
                "Session cancelled"
            );
        }
    }

    async fn drive(self, text: String) -> SessionState {
        let inner = &self.inner;

        let opened = tokio::select! {
            biased;
            () = inner.cancel.cancelled() => return self.state(),
            opened = with_timeout(
                inner.policy.handshake_timeout,
                inner.service.open_stream(&inner.owner, vec![text]),
            ) => opened,
        };
        let mut events = match opened {
            Ok(Ok(events)) => events,
            Ok(Err(e)) | Err(e) => {
                tracing::warn!(
                    name: "stream.handshake.failed",
                    error = %e,
                    retriable = e.is_retriable(),
                    "Stream handshake failed"
                );
                self.transition(SessionState::Errored);
                return self.state();
            }
        };
        if !self.transition(SessionState::Streaming) {
            return self.state();
        }
        tracing::debug!(name: "stream.session.streaming", "Stream open");

        loop {
            let next = tokio::select! {
                biased;
                () = inner.cancel.cancelled() => break,
                next = with_timeout(inner.policy.idle_timeout, events.next()) => next,
            };
            match next {
                Ok(Some(Ok(data))) => self.reconcile(&data),
                Ok(Some(Err(e))) => {
                    tracing::warn!(
                        name: "stream.transport.failed",
                        error = %e,
                        received = self.received(),
                        "Stream failed mid-flight"
                    );
                    self.transition(SessionState::Errored);
                    break;
                }
                Ok(None) => {
                    self.transition(SessionState::Closed);
                    tracing::info!(
                        name: "stream.session.closed",
                        received = self.received(),
                        "Stream closed by server"
                    );
                    break;
                }
                Err(e) => {
                    tracing::warn!(name: "stream.idle.timeout", error = %e, "Stream went silent");
                    self.transition(SessionState::Errored);
                    break;
                }
            }
        }
        // Dropping `events` here aborts the underlying connection.
        self.state()
    }

    /// Append every message of one event's batch, in order.
    fn reconcile(&self, data: &str) {
        let batch = match StreamBatch::parse(data) {
            Ok(batch) => batch,
            Err(e) => {
                tracing::warn!(
                    name: "stream.event.malformed",
                    error = %e,
                    "Dropping malformed stream event"
                );
                return;
            }
        };
        let count = batch.messages.len();
        for remote in batch.messages {
            if !self.append_streamed(remote.into_streamed_message()) {
                return;
            }
        }
        tracing::trace!(name: "stream.event.applied", count, "Event reconciled");
    }

    /// Append unless the session already ended.
    fn append_streamed(&self, message: Message) -> bool {
        let state = self.lock_state();
        if state.is_terminal() {
            return false;
        }
        self.inner.log.append(&self.inner.owner, message);
        self.inner.received.fetch_add(1, Ordering::AcqRel);
        true
    }

    /// Move to `to` unless already terminal. Returns whether it moved.
    fn transition(&self, to: SessionState) -> bool {
        let mut state = self.lock_state();
        if state.is_terminal() {
            return false;
        }
        tracing::debug!(
            name: "stream.session.transition",
            session_id = %self.inner.id,
            from = %*state,
            to = %to,
            "Session state changed"
        );
        *state = to;
        self.inner.state_tx.send_replace(to);
        true
    }

    fn lock_state(&self) -> MutexGuard<'_, SessionState> {
        self.inner
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

async fn with_timeout<F: Future>(limit: Option<Duration>, fut: F) -> Result<F::Output> {
    let Some(limit) = limit else {
        return Ok(fut.await);
    };
    match tokio::time::timeout(limit, fut).await {
        Ok(output) => Ok(output),
        Err(_) => Err(Error::Timeout(limit)),
    }
}
