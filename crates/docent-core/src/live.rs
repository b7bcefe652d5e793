//! The in-flight assistant answer and its transition function.

use crate::sse::Delta;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Reasoning,
    Responding,
}

/// Answer being streamed. Lives from submission until the stream ends.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LiveMessage {
    pub thinking: bool,
    pub reasoning_activities: String,
    pub final_response: String,
}

impl LiveMessage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn phase(&self) -> Phase {
        if self.thinking {
            Phase::Reasoning
        } else {
            Phase::Responding
        }
    }

    /// Fold one decoded delta into the message.
    ///
    /// Answer text switches to responding and grows `final_response`; reasoning text switches
    /// to reasoning and grows `reasoning_activities`. A frame with neither leaves the message
    /// as it is.
    pub fn apply(mut self, delta: &Delta) -> Self {
        if let Some(content) = delta.content.as_deref().filter(|c| !c.is_empty()) {
            self.thinking = false;
            self.final_response.push_str(content);
        } else if let Some(reasoning) = delta.reasoning.as_deref().filter(|r| !r.is_empty()) {
            self.thinking = true;
            self.reasoning_activities.push_str(reasoning);
        }
        self
    }

    /// What a page host should display right now.
    pub fn display_text(&self) -> &str {
        if self.thinking {
            "Thinking..."
        } else {
            &self.final_response
        }
    }
}
