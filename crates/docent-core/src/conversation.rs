//! Ordered transcript of one assistant session.

use serde::Serialize;

/// One message in the transcript.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Turn {
    /// Fixed instructions; always the first turn.
    System { content: String },
    /// `query` is what the user typed, `content` the assembled prompt sent to the model.
    User { query: String, content: String },
    Assistant { content: String },
    /// A failure shown to the user. Never sent to the model.
    Error { message: String },
}

/// Wire form of a turn in a chat-completion request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChatMessage {
    pub role: &'static str,
    pub content: String,
}

#[derive(Debug, Clone)]
pub struct Conversation {
    turns: Vec<Turn>,
}

impl Conversation {
    pub fn new(system_prompt: impl Into<String>) -> Self {
        Self {
            turns: vec![Turn::System {
                content: system_prompt.into(),
            }],
        }
    }

    /// Append a user turn with no prompt yet; returns its position.
    pub fn append_user(&mut self, query: impl Into<String>) -> usize {
        self.turns.push(Turn::User {
            query: query.into(),
            content: String::new(),
        });
        self.turns.len() - 1
    }

    /// Fill in the assembled prompt of the user turn at `idx`. Returns false if `idx` is not a user turn.
    pub fn set_user_content(&mut self, idx: usize, prompt: String) -> bool {
        match self.turns.get_mut(idx) {
            Some(Turn::User { content, .. }) => {
                *content = prompt;
                true
            }
            _ => false,
        }
    }

    pub fn append_assistant(&mut self, text: impl Into<String>) {
        self.turns.push(Turn::Assistant {
            content: text.into(),
        });
    }

    pub fn append_error(&mut self, message: impl Into<String>) {
        self.turns.push(Turn::Error {
            message: message.into(),
        });
    }

    /// Back to just the system turn.
    pub fn clear(&mut self) {
        self.turns.truncate(1);
    }

    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    /// Everything but the system turn, for rendering.
    pub fn visible_turns(&self) -> &[Turn] {
        &self.turns[1..]
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        // The system turn is always present.
        false
    }

    pub fn last(&self) -> Option<&Turn> {
        self.turns.last()
    }

    /// Messages for the next completion request: system first, error notices left out.
    /// User turns whose prompt was never assembled (retrieval failed or was cancelled) are
    /// skipped too.
    pub fn to_request_messages(&self) -> Vec<ChatMessage> {
        self.turns
            .iter()
            .filter_map(|turn| match turn {
                Turn::System { content } => Some(ChatMessage {
                    role: "system",
                    content: content.clone(),
                }),
                Turn::User { content, .. } if content.is_empty() => None,
                Turn::User { content, .. } => Some(ChatMessage {
                    role: "user",
                    content: content.clone(),
                }),
                Turn::Assistant { content } => Some(ChatMessage {
                    role: "assistant",
                    content: content.clone(),
                }),
                Turn::Error { .. } => None,
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_with_system_turn() {
        let c = Conversation::new("be helpful");
        assert_eq!(c.len(), 1);
        assert!(c.visible_turns().is_empty());
        assert_eq!(
            c.turns()[0],
            Turn::System {
                content: "be helpful".into()
            }
        );
    }

    #[test]
    fn clear_always_leaves_only_system() {
        for n in [0, 1, 7] {
            let mut c = Conversation::new("sys");
            for i in 0..n {
                let idx = c.append_user(format!("q{i}"));
                c.set_user_content(idx, format!("prompt {i}"));
                c.append_assistant(format!("a{i}"));
                c.append_error("oops");
            }
            c.clear();
            assert_eq!(c.turns(), &[Turn::System { content: "sys".into() }]);
        }
    }

    #[test]
    fn user_content_is_filled_later() {
        let mut c = Conversation::new("sys");
        let idx = c.append_user("what is XSML?");
        assert_eq!(
            c.turns()[idx],
            Turn::User {
                query: "what is XSML?".into(),
                content: String::new()
            }
        );
        assert!(c.set_user_content(idx, "assembled".into()));
        assert!(!c.set_user_content(0, "nope".into()));
        assert!(matches!(&c.turns()[idx], Turn::User { content, .. } if content == "assembled"));
    }

    #[test]
    fn request_messages_skip_errors_and_send_prompts() {
        let mut c = Conversation::new("sys");
        let idx = c.append_user("q1");
        c.set_user_content(idx, "prompt 1".into());
        c.append_error("retrieval failed");
        let idx = c.append_user("q2");
        c.set_user_content(idx, "prompt 2".into());
        c.append_assistant("a2");

        let roles: Vec<_> = c
            .to_request_messages()
            .into_iter()
            .map(|m| (m.role, m.content))
            .collect();
        assert_eq!(
            roles,
            vec![
                ("system", "sys".to_string()),
                ("user", "prompt 1".to_string()),
                ("user", "prompt 2".to_string()),
                ("assistant", "a2".to_string()),
            ]
        );
    }

    #[test]
    fn unassembled_user_turns_are_not_sent() {
        let mut c = Conversation::new("sys");
        c.append_user("lost question");
        c.append_error("retrieval failed");
        let idx = c.append_user("q2");
        c.set_user_content(idx, "prompt 2".into());

        let messages = c.to_request_messages();
        assert_eq!(messages.len(), 2);
        assert!(messages.iter().all(|m| !m.content.is_empty()));
        // Still visible in the transcript.
        assert_eq!(c.visible_turns().len(), 3);
    }
}
