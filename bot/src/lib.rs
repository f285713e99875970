pub mod completion;
pub mod config;
pub mod discord;
pub mod prompt;
pub mod registry;
pub mod split;

use std::sync::Arc;

use serenity::prelude::*;
use thiserror::Error;
use tracing::info;

use crate::config::Config;
use crate::discord::{AppState, Handler};
use crate::registry::SqliteStore;

#[derive(Error, Debug)]
pub enum StartError {
    #[error("Failed to open character database: {0}")]
    Store(#[from] sqlx::Error),
    #[error("Discord client error: {0}")]
    Discord(#[from] serenity::Error),
}

/// Open the character store and run the gateway client until it exits.
pub async fn run(config: Config) -> Result<(), StartError> {
    let config = Arc::new(config);
    let store = SqliteStore::open(&config.db_path).await?;
    info!("Character database open at {}", config.db_path);

    let intents = GatewayIntents::GUILD_MESSAGES
        | GatewayIntents::DIRECT_MESSAGES
        | GatewayIntents::MESSAGE_CONTENT
        | GatewayIntents::GUILD_MESSAGE_REACTIONS
        | GatewayIntents::DIRECT_MESSAGE_REACTIONS;

    let state = Arc::new(AppState::new(config.clone(), Arc::new(store)));
    let mut client = Client::builder(&config.client_token, intents)
        .event_handler(Handler::new(state))
        .await?;
    client.start().await?;
    Ok(())
}
