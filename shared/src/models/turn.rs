use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// One message in a conversation, attributed to its speaker, in
/// chronological order.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Turn {
    pub role: Role,
    #[serde(default)]
    pub speaker: Option<String>,
    pub content: String,
}

impl Turn {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            speaker: None,
            content: content.into(),
        }
    }

    pub fn from_speaker(role: Role, speaker: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role,
            speaker: Some(speaker.into()),
            content: content.into(),
        }
    }
}
