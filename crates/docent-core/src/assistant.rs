//! The question → retrieval → streamed answer pipeline, and the transcript it feeds.
//!
//! [`Assistant`] owns every piece of session state: the loaded index, the conversation,
//! the in-flight [`LiveMessage`] and the completion state. A page host calls
//! [`Assistant::begin`] when the user submits (the question shows up in the transcript
//! immediately) and drives [`Assistant::complete`] to stream the answer; [`Assistant::ask`]
//! does both. At most one answer is in flight per assistant.

use std::path::Path;
use std::sync::Arc;

use tokio_stream::StreamExt;
use tokio_util::sync::CancellationToken;

use crate::completion::{ChatClient, CompletionError};
use crate::config::Config;
use crate::conversation::Conversation;
use crate::embeddings::{EmbedError, Embedder, RemoteEmbedder};
use crate::index_file::{read_index_file, IndexFileError};
use crate::live::{LiveMessage, Phase};
use crate::prompt::{assemble_prompt, DEFAULT_SYSTEM_PROMPT, DEFAULT_TOP_K};
use crate::sse::StreamEvent;
use crate::store::{ScoredSection, StoreError, VectorIndex};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompletionState {
    Idle,
    Sending,
    StreamOpen,
    Reasoning,
    Responding,
    Completed,
    Failed,
    Cancelled,
}

impl CompletionState {
    pub fn is_pending(self) -> bool {
        matches!(
            self,
            Self::Sending | Self::StreamOpen | Self::Reasoning | Self::Responding
        )
    }
}

/// A submitted question waiting for its answer. Produced by [`Assistant::begin`].
#[derive(Debug)]
pub struct Submission {
    user_turn: usize,
    query: String,
}

impl Submission {
    pub fn query(&self) -> &str {
        &self.query
    }
}

/// How one question ended.
#[derive(Debug, Clone)]
pub struct AskOutcome {
    /// `Completed`, `Failed` or `Cancelled`.
    pub state: CompletionState,
    /// Text promoted into the transcript, if any.
    pub answer: Option<String>,
    /// Message of the error turn, if one was appended.
    pub error: Option<String>,
    /// Sections the prompt was built from.
    pub sources: Vec<ScoredSection>,
}

pub struct Assistant {
    embedder: Box<dyn Embedder>,
    chat: ChatClient,
    index: Option<Arc<VectorIndex>>,
    conversation: Conversation,
    live: Option<LiveMessage>,
    state: CompletionState,
    top_k: usize,
}

impl Assistant {
    pub fn new(embedder: impl Embedder + 'static, chat: ChatClient) -> Self {
        Self {
            embedder: Box::new(embedder),
            chat,
            index: None,
            conversation: Conversation::new(DEFAULT_SYSTEM_PROMPT),
            live: None,
            state: CompletionState::Idle,
            top_k: DEFAULT_TOP_K,
        }
    }

    /// Remote embedder and chat client from config, with its prompt and retrieval settings.
    pub fn from_config(config: &Config) -> Result<Self, AssistantError> {
        let embedder = RemoteEmbedder::new(&config.api_base, config.request_timeout())?;
        let chat = ChatClient::new(
            &config.api_base,
            config.chat_model.clone(),
            config.request_timeout(),
            config.idle_timeout(),
        )?;
        let mut assistant = Self::new(embedder, chat).with_top_k(config.top_k);
        if let Some(prompt) = config.system_prompt.as_deref().filter(|p| !p.is_empty()) {
            assistant = assistant.with_system_prompt(prompt);
        }
        Ok(assistant)
    }

    /// Replaces the system turn; resets the transcript.
    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.conversation = Conversation::new(prompt);
        self
    }

    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = top_k.max(1);
        self
    }

    /// Use an already built index instead of loading one.
    pub fn with_index(mut self, index: VectorIndex) -> Self {
        self.index = Some(Arc::new(index));
        self
    }

    /// Load the serialized index once. Later calls are no-ops and return `false`.
    pub fn initialize(&mut self, index_path: &Path) -> Result<bool, AssistantError> {
        if self.index.is_some() {
            return Ok(false);
        }
        let files = read_index_file(index_path)?;
        let index = VectorIndex::from_files(&files)?;
        tracing::info!(
            path = %index_path.display(),
            sections = index.len(),
            "assistant index loaded"
        );
        self.index = Some(Arc::new(index));
        Ok(true)
    }

    pub fn is_initialized(&self) -> bool {
        self.index.is_some()
    }

    pub fn index(&self) -> Option<&VectorIndex> {
        self.index.as_deref()
    }

    pub fn conversation(&self) -> &Conversation {
        &self.conversation
    }

    pub fn live(&self) -> Option<&LiveMessage> {
        self.live.as_ref()
    }

    pub fn state(&self) -> CompletionState {
        self.state
    }

    pub fn is_pending(&self) -> bool {
        self.state.is_pending()
    }

    /// Reset the transcript to the system turn. Refused while an answer is in flight.
    pub fn clear(&mut self) -> Result<(), AssistantError> {
        if self.is_pending() {
            return Err(AssistantError::Busy);
        }
        self.conversation.clear();
        self.state = CompletionState::Idle;
        Ok(())
    }

    /// Accept a question: appends the user turn and opens the live message.
    /// Blank input is ignored (`Ok(None)`).
    pub fn begin(&mut self, query: &str) -> Result<Option<Submission>, AssistantError> {
        let query = query.trim();
        if query.is_empty() {
            return Ok(None);
        }
        if self.is_pending() {
            return Err(AssistantError::Busy);
        }
        if self.index.is_none() {
            return Err(AssistantError::NotInitialized);
        }
        let user_turn = self.conversation.append_user(query);
        self.live = Some(LiveMessage::new());
        self.state = CompletionState::Sending;
        Ok(Some(Submission {
            user_turn,
            query: query.to_string(),
        }))
    }

    /// Retrieve context, stream the answer into the live message and fold it into the transcript.
    ///
    /// `on_update` sees the live message after the stream opens and after every decoded event.
    /// Failures end up as an error turn in the transcript, not as an `Err`.
    pub async fn complete(
        &mut self,
        submission: Submission,
        page_text: &str,
        cancel: CancellationToken,
        mut on_update: impl FnMut(&LiveMessage, CompletionState),
    ) -> AskOutcome {
        let Some(index) = self.index.clone() else {
            let message = format!("retrieval failed: {}", AssistantError::NotInitialized);
            return self.fail(message, Vec::new());
        };

        let embedding = tokio::select! {
            biased;
            _ = cancel.cancelled() => None,
            res = self.embedder.embed(&submission.query) => Some(res),
        };
        let Some(embedding) = embedding else {
            return self.cancel(Vec::new());
        };
        let top_k = self.top_k;
        let sources = match embedding.map_err(AssistantError::from).and_then(|e| {
            index
                .retrieve_relevant(&e, top_k)
                .map_err(AssistantError::from)
        }) {
            Ok(sources) => sources,
            Err(e) => return self.fail(format!("retrieval failed: {e}"), Vec::new()),
        };
        tracing::debug!(query = %submission.query, sources = sources.len(), "context retrieved");

        let prompt = assemble_prompt(
            &submission.query,
            sources.iter().map(|s| &s.section),
            page_text,
        );
        self.conversation.set_user_content(submission.user_turn, prompt);
        let messages = self.conversation.to_request_messages();

        let mut stream = match self.chat.stream(&messages, cancel.clone()).await {
            Ok(stream) => stream,
            Err(CompletionError::Cancelled) => return self.cancel(sources),
            Err(e) => return self.fail(format!("completion failed: {e}"), sources),
        };
        self.state = CompletionState::StreamOpen;
        if let Some(live) = &self.live {
            on_update(live, self.state);
        }

        let mut saw_done = false;
        while let Some(item) = stream.next().await {
            match item {
                Ok(StreamEvent::Delta(delta)) => {
                    let live = self.live.take().unwrap_or_default().apply(&delta);
                    self.state = match live.phase() {
                        Phase::Reasoning => CompletionState::Reasoning,
                        Phase::Responding => CompletionState::Responding,
                    };
                    on_update(&live, self.state);
                    self.live = Some(live);
                }
                Ok(StreamEvent::Done) => {
                    saw_done = true;
                    break;
                }
                Err(e) => return self.fail(format!("completion failed: {e}"), sources),
            }
        }

        if cancel.is_cancelled() && !saw_done {
            return self.cancel(sources);
        }
        if !saw_done {
            tracing::debug!("stream closed without [DONE], treating as complete");
        }
        let answer = self.promote(saw_done);
        self.state = CompletionState::Completed;
        AskOutcome {
            state: self.state,
            answer,
            error: None,
            sources,
        }
    }

    /// [`begin`](Self::begin) + [`complete`](Self::complete).
    pub async fn ask(
        &mut self,
        query: &str,
        page_text: &str,
        cancel: CancellationToken,
        on_update: impl FnMut(&LiveMessage, CompletionState),
    ) -> Result<Option<AskOutcome>, AssistantError> {
        let Some(submission) = self.begin(query)? else {
            return Ok(None);
        };
        Ok(Some(self.complete(submission, page_text, cancel, on_update).await))
    }

    /// Settle an answer whose future was dropped mid-flight: keep what streamed so far and
    /// mark it cancelled so new questions are accepted again.
    pub fn abort(&mut self) {
        if self.is_pending() {
            self.promote(false);
            self.state = CompletionState::Cancelled;
        }
    }

    /// Move the live answer into the transcript. An empty partial answer is dropped unless
    /// the stream finished normally.
    fn promote(&mut self, always: bool) -> Option<String> {
        let live = self.live.take()?;
        if live.final_response.is_empty() && !always {
            return None;
        }
        self.conversation.append_assistant(live.final_response.clone());
        Some(live.final_response)
    }

    fn fail(&mut self, message: String, sources: Vec<ScoredSection>) -> AskOutcome {
        tracing::warn!(error = %message, "assistant request failed");
        let answer = self.promote(false);
        self.conversation.append_error(message.clone());
        self.state = CompletionState::Failed;
        AskOutcome {
            state: self.state,
            answer,
            error: Some(message),
            sources,
        }
    }

    fn cancel(&mut self, sources: Vec<ScoredSection>) -> AskOutcome {
        tracing::debug!("assistant request cancelled");
        let answer = self.promote(false);
        self.state = CompletionState::Cancelled;
        AskOutcome {
            state: self.state,
            answer,
            error: None,
            sources,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum AssistantError {
    #[error("an answer is already in progress")]
    Busy,
    #[error("assistant index not loaded")]
    NotInitialized,
    #[error(transparent)]
    IndexFile(#[from] IndexFileError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Embed(#[from] EmbedError),
    #[error(transparent)]
    Completion(#[from] CompletionError),
}
