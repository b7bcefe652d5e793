//! Streaming chat-completion client for `POST {base}/api/v1/chat/completions`.

use std::pin::Pin;
use std::time::Duration;

use bytes::Bytes;
use serde::Serialize;
use thiserror::Error;
use tokio_stream::{Stream, StreamExt};
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::conversation::ChatMessage;
use crate::embeddings::endpoint_url;
use crate::sse::{SseDecoder, StreamEvent};

const COMPLETIONS_PATH: &str = "api/v1/chat/completions";

/// Decoded events of one answer, in arrival order.
pub type CompletionStream = Pin<Box<dyn Stream<Item = Result<StreamEvent, CompletionError>> + Send>>;

#[derive(Debug, Clone)]
pub struct ChatClient {
    client: reqwest::Client,
    endpoint: Url,
    model: String,
    request_timeout: Duration,
    idle_timeout: Duration,
}

#[derive(Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    stream: bool,
}

impl ChatClient {
    pub fn new(
        base: &str,
        model: impl Into<String>,
        request_timeout: Duration,
        idle_timeout: Duration,
    ) -> Result<Self, CompletionError> {
        let endpoint = endpoint_url(base, COMPLETIONS_PATH)?;
        let client = reqwest::Client::builder()
            .connect_timeout(request_timeout)
            .build()
            .map_err(CompletionError::Request)?;
        Ok(Self {
            client,
            endpoint,
            model: model.into(),
            request_timeout,
            idle_timeout,
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Submit the transcript and return the decoded event stream.
    ///
    /// Fails before streaming on transport errors, non-2xx statuses, a response that takes
    /// longer than the request timeout, or cancellation.
    pub async fn stream(
        &self,
        messages: &[ChatMessage],
        cancel: CancellationToken,
    ) -> Result<CompletionStream, CompletionError> {
        let payload = CompletionRequest {
            model: &self.model,
            messages,
            stream: true,
        };
        tracing::debug!(
            endpoint = %self.endpoint,
            model = %self.model,
            messages = messages.len(),
            "submitting chat completion"
        );
        let send = self
            .client
            .post(self.endpoint.clone())
            .header("accept", "text/event-stream")
            .json(&payload)
            .send();

        let resp = tokio::select! {
            _ = cancel.cancelled() => return Err(CompletionError::Cancelled),
            res = tokio::time::timeout(self.request_timeout, send) => match res {
                Err(_) => return Err(CompletionError::Timeout),
                Ok(r) => r?,
            },
        };

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(CompletionError::Status {
                status: status.as_u16(),
                body,
            });
        }
        Ok(Box::pin(decode_stream(
            resp.bytes_stream(),
            self.idle_timeout,
            cancel,
        )))
    }
}

/// Reassemble SSE events from raw body chunks.
///
/// Ends after `[DONE]`, when the body ends (flushing a final unterminated event), when
/// `cancel` fires (silently), or after yielding the first transport error or idle timeout.
pub fn decode_stream(
    byte_stream: impl Stream<Item = Result<Bytes, reqwest::Error>> + Send + 'static,
    idle_timeout: Duration,
    cancel: CancellationToken,
) -> impl Stream<Item = Result<StreamEvent, CompletionError>> + Send {
    async_stream::stream! {
        tokio::pin!(byte_stream);
        let mut decoder = SseDecoder::new();

        loop {
            let next = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    tracing::debug!("completion stream cancelled");
                    return;
                }
                next = tokio::time::timeout(idle_timeout, byte_stream.next()) => next,
            };
            match next {
                Err(_) => {
                    yield Err(CompletionError::Timeout);
                    return;
                }
                Ok(None) => {
                    for event in decoder.finish() {
                        yield Ok(event);
                    }
                    return;
                }
                Ok(Some(Err(e))) => {
                    yield Err(CompletionError::from(e));
                    return;
                }
                Ok(Some(Ok(chunk))) => {
                    for event in decoder.push(&chunk) {
                        yield Ok(event);
                    }
                    if decoder.is_done() {
                        return;
                    }
                }
            }
        }
    }
}

#[derive(Debug, Error)]
pub enum CompletionError {
    #[error("invalid completions URL: {0}")]
    ParseUrl(#[from] url::ParseError),
    #[error("completion request failed: {0}")]
    Request(reqwest::Error),
    #[error("completion timed out")]
    Timeout,
    #[error("completion service returned {status}: {body}")]
    Status { status: u16, body: String },
    #[error("completion cancelled")]
    Cancelled,
}

impl From<reqwest::Error> for CompletionError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            Self::Timeout
        } else {
            Self::Request(e)
        }
    }
}
