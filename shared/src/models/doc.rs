use serde::Deserialize;

use crate::models::{CharacterFields, GenParams};

/// A character definition document: one structured file per character, as
/// attached to an import command. Unknown keys are ignored; generation
/// overrides sit at the top level alongside the named fields.
#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct CharacterDoc {
    pub id: String,
    pub display_name: Option<String>,
    pub description: Option<String>,
    pub avatar_link: Option<String>,
    pub system_prompt: Option<String>,
    pub example_messages: Option<String>,
    pub model: Option<String>,
    #[serde(flatten)]
    pub params: GenParams,
}

impl CharacterDoc {
    pub fn into_fields(self) -> (String, CharacterFields) {
        (
            self.id,
            CharacterFields {
                display_name: self.display_name,
                description: self.description,
                avatar_link: self.avatar_link,
                system_prompt: self.system_prompt,
                example_message: self.example_messages,
                model: self.model,
                params: self.params,
            },
        )
    }
}
