use shared::models::{CharacterFields, Scope};

use crate::registry::{CharacterStore, RegistryError, RegistryResult};

/// The steps, in order, of the character creation dialogue. One field is
/// collected per step and validated immediately; the record is created at the
/// id step and updated in place afterwards.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Step {
    Id,
    DisplayName,
    SystemPrompt,
    AvatarLink,
    Description,
}

impl Step {
    fn next(self) -> Option<Step> {
        match self {
            Step::Id => Some(Step::DisplayName),
            Step::DisplayName => Some(Step::SystemPrompt),
            Step::SystemPrompt => Some(Step::AvatarLink),
            Step::AvatarLink => Some(Step::Description),
            Step::Description => None,
        }
    }

    fn prompt(self) -> &'static str {
        match self {
            Step::Id => {
                "Let's make a character! First, give it a short id: one word of \
                 letters, numbers, and underscores (up to 20 characters)."
            }
            Step::DisplayName => {
                "What name should the character go by? This is shown on its \
                 replies. Say `skip` to use the id."
            }
            Step::SystemPrompt => {
                "Describe how the character should behave. This is given to the \
                 model as its instructions. Say `skip` to leave it empty."
            }
            Step::AvatarLink => {
                "Paste a link to an avatar image for the character, or `skip`."
            }
            Step::Description => {
                "Finally, a short description for character listings, or `skip`."
            }
        }
    }
}

pub enum WizardOutcome {
    /// Reply to send; the dialogue continues.
    Continue(String),
    /// Reply to send; the dialogue is finished or abandoned.
    Done(String),
}

/// A per-(channel, author) character creation session. Plain messages from
/// the author are fed here until the dialogue completes.
pub struct CreationWizard {
    scope: Scope,
    author: u64,
    step: Step,
    char_id: Option<String>,
}

impl CreationWizard {
    /// New characters start out private to their author; publishing into a
    /// guild is a separate, explicit action.
    pub fn new(author: u64) -> Self {
        Self {
            scope: Scope::Dm(author),
            author,
            step: Step::Id,
            char_id: None,
        }
    }

    pub fn intro(&self) -> String {
        format!(
            "{}\nSay `cancel` at any point to stop.",
            Step::Id.prompt()
        )
    }

    pub async fn feed(
        &mut self,
        store: &dyn CharacterStore,
        input: &str,
    ) -> RegistryResult<WizardOutcome> {
        let input = input.trim();
        if input.eq_ignore_ascii_case("cancel") {
            return Ok(WizardOutcome::Done(
                "Character creation cancelled.".to_string(),
            ));
        }

        match self.step {
            Step::Id => {
                match store
                    .create(self.scope, self.author, input, CharacterFields::default())
                    .await
                {
                    Ok(character) => {
                        self.char_id = Some(character.id);
                        self.advance()
                    }
                    Err(e @ (RegistryError::InvalidId | RegistryError::DuplicateId)) => {
                        Ok(WizardOutcome::Continue(format!("{e} Try another id.")))
                    }
                    Err(e) => Err(e),
                }
            }
            step => {
                if !input.eq_ignore_ascii_case("skip") {
                    let fields = field_for_step(step, input);
                    let id = self.char_id.as_deref().unwrap_or_default();
                    match store.update(self.scope, id, self.author, fields).await {
                        Ok(_) => {}
                        Err(e @ RegistryError::InvalidField { .. }) => {
                            return Ok(WizardOutcome::Continue(format!("{e} Try again.")));
                        }
                        Err(e) => return Err(e),
                    }
                }
                self.advance()
            }
        }
    }

    fn advance(&mut self) -> RegistryResult<WizardOutcome> {
        match self.step.next() {
            Some(next) => {
                self.step = next;
                Ok(WizardOutcome::Continue(next.prompt().to_string()))
            }
            None => {
                let id = self.char_id.clone().unwrap_or_default();
                Ok(WizardOutcome::Done(format!(
                    "All done! Invoke your character with `-c {id}`, or \
                     `-u publish {id}` to share it with a server."
                )))
            }
        }
    }
}

fn field_for_step(step: Step, value: &str) -> CharacterFields {
    let mut fields = CharacterFields::default();
    let value = Some(value.to_string());
    match step {
        Step::Id => {}
        Step::DisplayName => fields.display_name = value,
        Step::SystemPrompt => fields.system_prompt = value,
        Step::AvatarLink => fields.avatar_link = value,
        Step::Description => fields.description = value,
    }
    fields
}
