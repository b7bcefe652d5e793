//! Incremental decoder for the chat-completion event stream.
//!
//! Network reads split events anywhere, including inside a multi-byte UTF-8 sequence.
//! The decoder keeps undecoded bytes and the trailing partial event between pushes, so
//! feeding one event in any number of pieces yields the same events as feeding it whole.

use serde::Deserialize;

const EVENT_DELIMITER: &str = "\n\n";
const DATA_PREFIX: &str = "data: ";
const DONE_SENTINEL: &str = "[DONE]";

/// One decoded fragment of a streamed answer.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Delta {
    /// `choices[0].delta.content`
    pub content: Option<String>,
    /// `choices[0].delta.reasoning_content`, for models that stream their reasoning separately.
    pub reasoning: Option<String>,
}

impl Delta {
    pub fn content(text: impl Into<String>) -> Self {
        Self {
            content: Some(text.into()),
            reasoning: None,
        }
    }

    pub fn reasoning(text: impl Into<String>) -> Self {
        Self {
            content: None,
            reasoning: Some(text.into()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEvent {
    Delta(Delta),
    /// The `[DONE]` sentinel.
    Done,
}

#[derive(Deserialize)]
struct ChunkPayload {
    #[serde(default)]
    choices: Vec<ChoicePayload>,
}

#[derive(Deserialize)]
struct ChoicePayload {
    #[serde(default)]
    delta: DeltaPayload,
}

#[derive(Default, Deserialize)]
struct DeltaPayload {
    content: Option<String>,
    reasoning_content: Option<String>,
}

#[derive(Debug, Default)]
pub struct SseDecoder {
    /// Decoded text not yet terminated by a blank line.
    buffer: String,
    /// Tail bytes of an incomplete UTF-8 sequence.
    pending: Vec<u8>,
    done: bool,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// True once `[DONE]` has been decoded; later input is ignored.
    pub fn is_done(&self) -> bool {
        self.done
    }

    /// Feed one network read; returns every event completed by it, in order.
    pub fn push(&mut self, bytes: &[u8]) -> Vec<StreamEvent> {
        if self.done {
            return Vec::new();
        }
        self.pending.extend_from_slice(bytes);
        self.decode_pending();

        let mut events = Vec::new();
        while let Some(pos) = self.buffer.find(EVENT_DELIMITER) {
            let segment: String = self.buffer.drain(..pos + EVENT_DELIMITER.len()).collect();
            if self.take_segment(&segment, &mut events) {
                break;
            }
        }
        events
    }

    /// End of stream: a final event without its trailing blank line still counts.
    pub fn finish(&mut self) -> Vec<StreamEvent> {
        let mut events = Vec::new();
        if self.done {
            return events;
        }
        if !self.pending.is_empty() {
            let tail = String::from_utf8_lossy(&self.pending).into_owned();
            self.pending.clear();
            self.append_text(&tail);
        }
        let rest = std::mem::take(&mut self.buffer);
        self.take_segment(&rest, &mut events);
        events
    }

    /// Returns true when the segment was `[DONE]`.
    fn take_segment(&mut self, segment: &str, events: &mut Vec<StreamEvent>) -> bool {
        let segment = segment.trim();
        let Some(data) = segment.strip_prefix(DATA_PREFIX) else {
            if !segment.is_empty() {
                tracing::debug!(segment, "ignoring non-data event");
            }
            return false;
        };
        if data.trim() == DONE_SENTINEL {
            self.done = true;
            self.buffer.clear();
            self.pending.clear();
            events.push(StreamEvent::Done);
            return true;
        }
        if let Some(delta) = parse_data(data) {
            events.push(StreamEvent::Delta(delta));
        }
        false
    }

    fn decode_pending(&mut self) {
        let bytes = std::mem::take(&mut self.pending);
        let mut rest = bytes.as_slice();
        loop {
            match std::str::from_utf8(rest) {
                Ok(text) => {
                    self.append_text(text);
                    return;
                }
                Err(e) => {
                    let (valid, after) = rest.split_at(e.valid_up_to());
                    // valid_up_to guarantees this prefix is UTF-8.
                    self.append_text(std::str::from_utf8(valid).unwrap_or_default());
                    match e.error_len() {
                        Some(bad) => {
                            self.buffer.push(char::REPLACEMENT_CHARACTER);
                            rest = &after[bad..];
                        }
                        None => {
                            // Incomplete sequence at the end: wait for more bytes.
                            self.pending = after.to_vec();
                            return;
                        }
                    }
                }
            }
        }
    }

    fn append_text(&mut self, text: &str) {
        self.buffer.push_str(text);
        // A read may end between '\r' and '\n', so normalize the whole buffer.
        if self.buffer.contains("\r\n") {
            self.buffer = self.buffer.replace("\r\n", "\n");
        }
    }
}

/// One `data:` payload → delta. Malformed JSON is logged and skipped.
fn parse_data(data: &str) -> Option<Delta> {
    match serde_json::from_str::<ChunkPayload>(data) {
        Ok(payload) => {
            let delta = payload
                .choices
                .into_iter()
                .next()
                .map(|c| c.delta)
                .unwrap_or_default();
            Some(Delta {
                content: delta.content,
                reasoning: delta.reasoning_content,
            })
        }
        Err(e) => {
            tracing::warn!(error = %e, data, "skipped, failed to parse stream event");
            None
        }
    }
}

/// Decode a whole body at once. Convenience for tests and non-streaming callers.
pub fn decode_all(body: &[u8]) -> Vec<StreamEvent> {
    let mut decoder = SseDecoder::new();
    let mut events = decoder.push(body);
    events.extend(decoder.finish());
    events
}
