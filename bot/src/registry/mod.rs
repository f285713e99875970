use async_trait::async_trait;
use shared::models::{
    Character, CharacterFields, CharacterSummary, Scope, MAX_AVATAR_LINK_LEN,
    MAX_DESCRIPTION_LEN, MAX_DISPLAY_NAME_LEN, MAX_ID_LEN, MAX_PROMPT_LEN,
};
use thiserror::Error;

pub mod sqlite;

pub use sqlite::SqliteStore;

pub type RegistryResult<T> = Result<T, RegistryError>;

/// Listings are paginated in pages of this size.
pub const LIST_PAGE_SIZE: u32 = 5;

#[derive(Error, Debug)]
pub enum RegistryError {
    #[error("Character ids must be one word of up to 20 letters, numbers, and underscores.")]
    InvalidId,
    #[error("A character with that name exists already.")]
    DuplicateId,
    #[error("There is no character by that name.")]
    NotFound,
    #[error("That character belongs to another user.")]
    Forbidden,
    #[error("`{field}` must be at most {max} characters.")]
    InvalidField { field: &'static str, max: usize },
    #[error("Database error: {0}")]
    Db(#[from] sqlx::Error),
    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

/// Storage for character records. Ids are case-insensitive and unique within
/// their scope; mutation is restricted to the record's author.
#[async_trait]
pub trait CharacterStore: Send + Sync {
    async fn create(
        &self,
        scope: Scope,
        author: u64,
        id: &str,
        fields: CharacterFields,
    ) -> RegistryResult<Character>;
    async fn get(&self, scope: Scope, id: &str) -> RegistryResult<Character>;
    async fn update(
        &self,
        scope: Scope,
        id: &str,
        requester: u64,
        fields: CharacterFields,
    ) -> RegistryResult<Character>;
    /// Copy a record into another scope as an independent record.
    async fn publish(&self, record: &Character, target: Scope) -> RegistryResult<Character>;
    async fn delete(&self, scope: Scope, id: &str, requester: u64) -> RegistryResult<()>;
    /// One page of `(id, description, display_name)` rows, ordered by id.
    async fn list(&self, scope: Scope, offset: u32) -> RegistryResult<Vec<CharacterSummary>>;
}

/// Look a character up the way an invoking user sees it: the guild's public
/// characters first, then the user's own private ones. A miss is reported as
/// `NotFound` either way, so private characters are not disclosed.
pub async fn resolve_character(
    store: &dyn CharacterStore,
    guild: Option<u64>,
    user: u64,
    id: &str,
) -> RegistryResult<Character> {
    if let Some(guild_id) = guild {
        match store.get(Scope::Guild(guild_id), id).await {
            Err(RegistryError::NotFound) => {}
            other => return other,
        }
    }
    store.get(Scope::Dm(user), id).await
}

pub fn validate_id(id: &str) -> RegistryResult<()> {
    if id.is_empty()
        || id.len() > MAX_ID_LEN
        || !id.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
    {
        return Err(RegistryError::InvalidId);
    }
    Ok(())
}

pub fn validate_fields(fields: &CharacterFields) -> RegistryResult<()> {
    check_len(&fields.display_name, "display_name", MAX_DISPLAY_NAME_LEN)?;
    check_len(&fields.description, "description", MAX_DESCRIPTION_LEN)?;
    check_len(&fields.avatar_link, "avatar_link", MAX_AVATAR_LINK_LEN)?;
    check_len(&fields.system_prompt, "system_prompt", MAX_PROMPT_LEN)?;
    check_len(&fields.example_message, "example_message", MAX_PROMPT_LEN)?;
    Ok(())
}

fn check_len(value: &Option<String>, field: &'static str, max: usize) -> RegistryResult<()> {
    if let Some(text) = value
        && text.chars().count() > max
    {
        return Err(RegistryError::InvalidField { field, max });
    }
    Ok(())
}
