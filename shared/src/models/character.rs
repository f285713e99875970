use serde::{Deserialize, Serialize};

use crate::models::{GenParams, Scope};

pub const MAX_ID_LEN: usize = 20;
pub const MAX_PROMPT_LEN: usize = 2000;
pub const MAX_DESCRIPTION_LEN: usize = 200;
pub const MAX_AVATAR_LINK_LEN: usize = 200;
pub const MAX_DISPLAY_NAME_LEN: usize = 50;

/// A named persona: system prompt, style exemplar, cosmetics, and
/// generation-parameter overrides. Ids are stored lowercased and are unique
/// within their scope; only the author may mutate the record.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Character {
    pub id: String,
    pub scope: Scope,
    pub author: u64,
    pub display_name: Option<String>,
    pub description: Option<String>,
    pub avatar_link: Option<String>,
    pub system_prompt: Option<String>,
    pub example_message: Option<String>,
    pub model: Option<String>,
    pub params: GenParams,
}

impl Character {
    /// Name shown on replies; falls back to the id.
    pub fn name(&self) -> &str {
        self.display_name.as_deref().unwrap_or(&self.id)
    }

    /// Overlay a partial update onto this record. The id, scope, and author
    /// never change.
    pub fn apply(&mut self, fields: CharacterFields) {
        macro_rules! take {
            ($field:ident) => {
                if let Some(value) = fields.$field {
                    self.$field = Some(value);
                }
            };
        }
        take!(display_name);
        take!(description);
        take!(avatar_link);
        take!(system_prompt);
        take!(example_message);
        take!(model);
        self.params.merge(&fields.params);
    }
}

/// Partial field payload for character creation and updates. `None` leaves a
/// field unchanged.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CharacterFields {
    pub display_name: Option<String>,
    pub description: Option<String>,
    pub avatar_link: Option<String>,
    pub system_prompt: Option<String>,
    pub example_message: Option<String>,
    pub model: Option<String>,
    pub params: GenParams,
}

/// One row of a character listing: id, description, display name.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CharacterSummary {
    pub id: String,
    pub description: Option<String>,
    pub display_name: Option<String>,
}
