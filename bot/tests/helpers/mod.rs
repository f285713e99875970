#![allow(dead_code)]

use bot::registry::SqliteStore;
use shared::models::CharacterFields;
use tempfile::TempDir;

/// Open a fresh store backed by a database file in a temp directory. Keep the
/// directory alive for as long as the store is used.
pub async fn test_store() -> (TempDir, SqliteStore) {
    let dir = tempfile::tempdir().unwrap();
    let store = SqliteStore::open(dir.path().join("characters.db"))
        .await
        .unwrap();
    (dir, store)
}

pub fn described(description: &str) -> CharacterFields {
    CharacterFields {
        description: Some(description.to_string()),
        ..CharacterFields::default()
    }
}
