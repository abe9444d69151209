//! Client for the remote assistant service.
//!
//! [`AgentService`] is the seam between the engine and the network. The
//! production implementation, [`HttpAgentService`], speaks the service's
//! HTTP + event-stream contract:
//!
//! | Call | Endpoint |
//! |---|---|
//! | [`AgentService::list_threads`] | `GET /conversations` |
//! | [`AgentService::history`] | `GET /conversations/{thread_id}` |
//! | [`AgentService::chat`] | `POST /chat` |
//! | [`AgentService::open_stream`] | `POST /chat/stream` |

pub mod sse;
pub mod types;

use std::pin::Pin;

use futures::{Stream, StreamExt};
use reqwest::header::{ACCEPT, HeaderValue};
use url::Url;

use crate::conversation::ThreadId;
use crate::error::{Error, Result};

pub use sse::SseDecoder;
pub use types::{ChatRequest, MessageList, RemoteMessage, StreamBatch, ThreadList};

/// Data payloads of a live event stream, in arrival order.
///
/// An `Err` item is a transport failure; the stream yields nothing after it.
pub type EventStream = Pin<Box<dyn Stream<Item = Result<String>> + Send>>;

/// Operations the engine needs from the assistant service.
#[async_trait::async_trait]
pub trait AgentService: Send + Sync {
    /// Known thread identifiers, in the service's order.
    async fn list_threads(&self) -> Result<Vec<ThreadId>>;

    /// Persisted history of one thread.
    async fn history(&self, thread_id: &ThreadId) -> Result<Vec<RemoteMessage>>;

    /// Non-streaming exchange: send messages, receive the full reply.
    async fn chat(&self, thread_id: &ThreadId, messages: Vec<String>) -> Result<Vec<RemoteMessage>>;

    /// Send messages and open the reply event stream.
    ///
    /// Resolves once the service has answered the handshake. A non-success
    /// status is returned as [`Error::Api`].
    async fn open_stream(&self, thread_id: &ThreadId, messages: Vec<String>) -> Result<EventStream>;
}

/// [`AgentService`] over HTTP.
#[derive(Debug, Clone)]
pub struct HttpAgentService {
    base_url: Url,
    http: reqwest::Client,
}

impl HttpAgentService {
    /// Create a client rooted at `base_url`
    /// (e.g. `http://localhost:8000/api/universal-agent`).
    pub fn new(base_url: impl AsRef<str>) -> Result<Self> {
        Self::with_client(base_url, reqwest::Client::new())
    }

    /// Create a client with a custom reqwest client.
    pub fn with_client(base_url: impl AsRef<str>, http: reqwest::Client) -> Result<Self> {
        let base_url = Url::parse(base_url.as_ref())?;
        if base_url.cannot_be_a_base() {
            return Err(Error::Config(format!("not a base URL: {base_url}")));
        }
        Ok(Self { base_url, http })
    }

    #[must_use]
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Base URL with `segments` appended as escaped path segments.
    fn endpoint(&self, segments: &[&str]) -> Result<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|()| Error::Config(format!("not a base URL: {}", self.base_url)))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    async fn error_for_status(response: reqwest::Response) -> Result<reqwest::Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let message = response
            .text()
            .await
            .unwrap_or_else(|_| "Unknown error".into());
        Err(Error::Api {
            status: status.as_u16(),
            message,
        })
    }

    async fn handle_response<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T> {
        let response = Self::error_for_status(response).await?;
        Ok(response.json().await?)
    }
}

#[async_trait::async_trait]
impl AgentService for HttpAgentService {
    async fn list_threads(&self) -> Result<Vec<ThreadId>> {
        let url = self.endpoint(&["conversations"])?;
        tracing::debug!(name: "service.request", %url, "Listing conversations");

        let response = self.http.get(url).send().await?;
        let list: ThreadList = Self::handle_response(response).await?;
        Ok(list.threads.into_iter().map(ThreadId::from).collect())
    }

    async fn history(&self, thread_id: &ThreadId) -> Result<Vec<RemoteMessage>> {
        let url = self.endpoint(&["conversations", thread_id.as_str()])?;
        tracing::debug!(name: "service.request", %url, "Fetching conversation history");

        let response = self.http.get(url).send().await?;
        let list: MessageList = Self::handle_response(response).await?;
        Ok(list.messages)
    }

    async fn chat(&self, thread_id: &ThreadId, messages: Vec<String>) -> Result<Vec<RemoteMessage>> {
        let url = self.endpoint(&["chat"])?;
        tracing::debug!(name: "service.request", %url, "Sending chat");

        let req = ChatRequest {
            thread_id: thread_id.to_string(),
            messages,
        };
        let response = self.http.post(url).json(&req).send().await?;
        let list: MessageList = Self::handle_response(response).await?;
        Ok(list.messages)
    }

    async fn open_stream(&self, thread_id: &ThreadId, messages: Vec<String>) -> Result<EventStream> {
        let url = self.endpoint(&["chat", "stream"])?;
        tracing::debug!(name: "service.request", %url, "Opening chat stream");

        let req = ChatRequest {
            thread_id: thread_id.to_string(),
            messages,
        };
        let response = self
            .http
            .post(url)
            .header(ACCEPT, HeaderValue::from_static("text/event-stream"))
            .json(&req)
            .send()
            .await?;
        let response = Self::error_for_status(response).await?;
        let byte_stream = response.bytes_stream();

        let events = async_stream::stream! {
            let mut decoder = SseDecoder::new();

            futures::pin_mut!(byte_stream);
            while let Some(chunk) = byte_stream.next().await {
                match chunk {
                    Ok(chunk) => {
                        for data in decoder.push(&chunk) {
                            yield Ok::<_, Error>(data);
                        }
                    }
                    Err(e) => {
                        yield Err(Error::from(e));
                        return;
                    }
                }
            }
            if let Some(data) = decoder.finish() {
                yield Ok(data);
            }
        };

        Ok(Box::pin(events))
    }
}
