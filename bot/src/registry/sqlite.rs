use std::path::Path;

use async_trait::async_trait;
use shared::models::{Character, CharacterFields, CharacterSummary, GenParams, Scope};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteRow};
use sqlx::{Pool, Row, Sqlite};

use crate::registry::{
    validate_fields, validate_id, CharacterStore, RegistryError, RegistryResult, LIST_PAGE_SIZE,
};

/// SQLite-backed character store. Writes to the same `(scope, id)` key are
/// serialized by the database; reads go through the pool concurrently.
#[derive(Clone)]
pub struct SqliteStore {
    pool: Pool<Sqlite>,
}

impl SqliteStore {
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, sqlx::Error> {
        let options = SqliteConnectOptions::new()
            .filename(path.as_ref())
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal);
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;

        let store = Self { pool };
        store.init().await?;
        Ok(store)
    }

    async fn init(&self) -> Result<(), sqlx::Error> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS characters (
                scope TEXT NOT NULL,
                id TEXT NOT NULL,
                author INTEGER NOT NULL,
                display_name TEXT,
                description TEXT,
                avatar_link TEXT,
                system_prompt TEXT,
                example_message TEXT,
                model TEXT,
                params TEXT NOT NULL,
                PRIMARY KEY (scope, id)
            )",
        )
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn insert(&self, character: &Character) -> RegistryResult<()> {
        let params = serde_json::to_string(&character.params)?;
        let result = sqlx::query(
            "INSERT INTO characters (
                scope, id, author, display_name, description, avatar_link,
                system_prompt, example_message, model, params
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
        )
        .bind(character.scope.key())
        .bind(&character.id)
        .bind(character.author as i64)
        .bind(&character.display_name)
        .bind(&character.description)
        .bind(&character.avatar_link)
        .bind(&character.system_prompt)
        .bind(&character.example_message)
        .bind(&character.model)
        .bind(params)
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(()),
            // a racing create for the same (scope, id) loses on the primary key
            Err(sqlx::Error::Database(db)) if db.is_unique_violation() => {
                Err(RegistryError::DuplicateId)
            }
            Err(e) => Err(RegistryError::Db(e)),
        }
    }

    fn from_row(scope: Scope, row: &SqliteRow) -> RegistryResult<Character> {
        let params: GenParams = serde_json::from_str(&row.get::<String, _>("params"))?;
        Ok(Character {
            id: row.get("id"),
            scope,
            author: row.get::<i64, _>("author") as u64,
            display_name: row.get("display_name"),
            description: row.get("description"),
            avatar_link: row.get("avatar_link"),
            system_prompt: row.get("system_prompt"),
            example_message: row.get("example_message"),
            model: row.get("model"),
            params,
        })
    }
}

#[async_trait]
impl CharacterStore for SqliteStore {
    async fn create(
        &self,
        scope: Scope,
        author: u64,
        id: &str,
        fields: CharacterFields,
    ) -> RegistryResult<Character> {
        let id = id.to_lowercase();
        validate_id(&id)?;
        validate_fields(&fields)?;

        let mut character = Character {
            id,
            scope,
            author,
            display_name: None,
            description: None,
            avatar_link: None,
            system_prompt: None,
            example_message: None,
            model: None,
            params: GenParams::default(),
        };
        character.apply(fields);
        self.insert(&character).await?;
        Ok(character)
    }

    async fn get(&self, scope: Scope, id: &str) -> RegistryResult<Character> {
        let id = id.to_lowercase();
        let row = sqlx::query(
            "SELECT id, author, display_name, description, avatar_link,
                    system_prompt, example_message, model, params
             FROM characters WHERE scope = ?1 AND id = ?2",
        )
        .bind(scope.key())
        .bind(&id)
        .fetch_optional(&self.pool)
        .await?;

        let row = row.ok_or(RegistryError::NotFound)?;
        Self::from_row(scope, &row)
    }

    async fn update(
        &self,
        scope: Scope,
        id: &str,
        requester: u64,
        fields: CharacterFields,
    ) -> RegistryResult<Character> {
        validate_fields(&fields)?;

        let mut character = self.get(scope, id).await?;
        if character.author != requester {
            return Err(RegistryError::Forbidden);
        }
        character.apply(fields);

        let params = serde_json::to_string(&character.params)?;
        sqlx::query(
            "UPDATE characters SET
                display_name = ?1, description = ?2, avatar_link = ?3,
                system_prompt = ?4, example_message = ?5, model = ?6, params = ?7
             WHERE scope = ?8 AND id = ?9",
        )
        .bind(&character.display_name)
        .bind(&character.description)
        .bind(&character.avatar_link)
        .bind(&character.system_prompt)
        .bind(&character.example_message)
        .bind(&character.model)
        .bind(params)
        .bind(character.scope.key())
        .bind(&character.id)
        .execute(&self.pool)
        .await?;

        Ok(character)
    }

    async fn publish(&self, record: &Character, target: Scope) -> RegistryResult<Character> {
        let mut copy = record.clone();
        copy.scope = target;
        self.insert(&copy).await?;
        Ok(copy)
    }

    async fn delete(&self, scope: Scope, id: &str, requester: u64) -> RegistryResult<()> {
        let character = self.get(scope, id).await?;
        if character.author != requester {
            return Err(RegistryError::Forbidden);
        }

        sqlx::query("DELETE FROM characters WHERE scope = ?1 AND id = ?2")
            .bind(scope.key())
            .bind(&character.id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn list(&self, scope: Scope, offset: u32) -> RegistryResult<Vec<CharacterSummary>> {
        let rows = sqlx::query(
            "SELECT id, description, display_name
             FROM characters WHERE scope = ?1
             ORDER BY id ASC LIMIT ?2 OFFSET ?3",
        )
        .bind(scope.key())
        .bind(LIST_PAGE_SIZE as i64)
        .bind(offset as i64)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|row| CharacterSummary {
                id: row.get("id"),
                description: row.get("description"),
                display_name: row.get("display_name"),
            })
            .collect())
    }
}
