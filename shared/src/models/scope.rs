use serde::{Deserialize, Serialize};

/// The namespace within which a character id must be unique: a guild, or a
/// user's private/direct-message context.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Scope {
    Guild(u64),
    Dm(u64),
}

impl Scope {
    /// Stable textual key used as the storage namespace.
    pub fn key(&self) -> String {
        match self {
            Scope::Guild(id) => format!("guild:{id}"),
            Scope::Dm(id) => format!("dm:{id}"),
        }
    }
}
