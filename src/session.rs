use crate::dataset::Dataset;
use crate::settings::SessionSettings;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
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

/// Append-only message log for one session. Messages are never edited,
/// removed, or reordered.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Conversation {
    messages: Vec<ChatMessage>,
}

impl Conversation {
    pub fn append(&mut self, msg: ChatMessage) {
        self.messages.push(msg);
    }

    pub fn snapshot(&self) -> &[ChatMessage] {
        &self.messages
    }

    /// Last `n` messages in original order, or all of them if shorter.
    pub fn tail(&self, n: usize) -> &[ChatMessage] {
        let start = self.messages.len().saturating_sub(n);
        &self.messages[start..]
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Session {
    pub id: Uuid,
    pub client_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub conversation: Conversation,
    pub dataset: Option<Dataset>,
    pub settings: SessionSettings,
}

impl Session {
    pub fn new(client_id: Option<String>, settings: SessionSettings) -> Self {
        Self {
            id: Uuid::new_v4(),
            client_id,
            created_at: Utc::now(),
            conversation: Conversation::default(),
            dataset: None,
            settings,
        }
    }
}
