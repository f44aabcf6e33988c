//! Message and Conversation domain types.
//!
//! A conversation is the append-only chat timeline a session writes to:
//! user asks → session retrieves context → backend streams an answer → answer is appended.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Maximum number of characters of the first user message used as a title.
pub const TITLE_MAX_CHARS: usize = 60;

/// The role of a message sender in a conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// System instructions (persona, tool catalog, context)
    System,
    /// The end user
    User,
    /// The generated answer
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

/// A message as it is sent to the completion backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self { role: Role::System, content: content.into() }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self { role: Role::User, content: content.into() }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self { role: Role::Assistant, content: content.into() }
    }
}

/// A persisted message in a conversation timeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredMessage {
    pub role: Role,
    pub content: String,
    pub time: DateTime<Utc>,
}

impl From<&StoredMessage> for ChatMessage {
    fn from(m: &StoredMessage) -> Self {
        Self { role: m.role, content: m.content.clone() }
    }
}

/// A conversation is an ordered sequence of messages with shared persona.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Conversation {
    /// Unique conversation ID (`chat-<nanos>`)
    pub id: String,

    /// Derived from the first user message unless set explicitly
    #[serde(default)]
    pub title: String,

    #[serde(default)]
    pub messages: Vec<StoredMessage>,

    pub created: DateTime<Utc>,
    pub updated: DateTime<Utc>,

    /// Persona pinned to this conversation, if any
    #[serde(default, rename = "persona_id", skip_serializing_if = "Option::is_none")]
    pub persona_id: Option<String>,
}

impl Conversation {
    /// Create an empty conversation with a time-based id.
    pub fn new(persona_id: Option<String>) -> Self {
        let now = Utc::now();
        let nanos = now.timestamp_nanos_opt().unwrap_or_else(|| now.timestamp_micros() * 1000);
        Self {
            id: format!("chat-{nanos}"),
            title: String::new(),
            messages: Vec::new(),
            created: now,
            updated: now,
            persona_id,
        }
    }

    /// Append a message. The first user message becomes the title.
    pub fn push(&mut self, role: Role, content: impl Into<String>) {
        let content = content.into();
        let now = Utc::now();
        if self.title.is_empty() && role == Role::User {
            self.title = title_from(&content);
        }
        self.messages.push(StoredMessage { role, content, time: now });
        self.updated = now;
    }

    /// The last `max` messages before the newest one, oldest first.
    ///
    /// The newest message is the question currently being answered, so it is
    /// excluded here and appended by the caller.
    pub fn history_before_last(&self, max: usize) -> Vec<ChatMessage> {
        let prior = match self.messages.len() {
            0 => &self.messages[..],
            n => &self.messages[..n - 1],
        };
        let start = prior.len().saturating_sub(max);
        prior[start..].iter().map(ChatMessage::from).collect()
    }
}

fn title_from(content: &str) -> String {
    if content.chars().count() > TITLE_MAX_CHARS {
        let cut: String = content.chars().take(TITLE_MAX_CHARS).collect();
        format!("{cut}…")
    } else {
        content.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_serialization() {
        let json = serde_json::to_string(&Role::Assistant).unwrap();
        assert_eq!(json, "\"assistant\"");
        let role: Role = serde_json::from_str("\"system\"").unwrap();
        assert_eq!(role, Role::System);
    }

    #[test]
    fn first_user_message_sets_title() {
        let mut conv = Conversation::new(None);
        conv.push(Role::User, "Wer ist Mars?");
        conv.push(Role::Assistant, "Ein Planet.");
        conv.push(Role::User, "Und Venus?");
        assert_eq!(conv.title, "Wer ist Mars?");
        assert_eq!(conv.messages.len(), 3);
    }

    #[test]
    fn long_titles_are_cut_on_char_boundaries() {
        let mut conv = Conversation::new(None);
        conv.push(Role::User, "ä".repeat(80));
        assert_eq!(conv.title.chars().count(), TITLE_MAX_CHARS + 1);
        assert!(conv.title.ends_with('…'));
    }

    #[test]
    fn history_excludes_the_current_question() {
        let mut conv = Conversation::new(None);
        for i in 0..14 {
            let role = if i % 2 == 0 { Role::User } else { Role::Assistant };
            conv.push(role, format!("m{i}"));
        }
        let history = conv.history_before_last(10);
        assert_eq!(history.len(), 10);
        assert_eq!(history.first().unwrap().content, "m3");
        assert_eq!(history.last().unwrap().content, "m12");
    }

    #[test]
    fn history_of_empty_conversation() {
        let conv = Conversation::new(None);
        assert!(conv.history_before_last(10).is_empty());
    }

    #[test]
    fn persona_is_omitted_when_unset() {
        let conv = Conversation::new(None);
        let json = serde_json::to_value(&conv).unwrap();
        assert!(json.get("persona_id").is_none());
        assert!(json["id"].as_str().unwrap().starts_with("chat-"));
    }
}
