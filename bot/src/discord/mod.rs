pub mod commands;
pub mod wizard;

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serenity::async_trait;
use serenity::builder::{CreateEmbed, CreateEmbedFooter, CreateMessage};
use serenity::gateway::ActivityData;
use serenity::model::channel::{Message, Reaction, ReactionType};
use serenity::model::gateway::Ready;
use serenity::prelude::*;
use shared::models::{Character, CharacterDoc, CharacterSummary, Role, Scope, Turn};
use tokio::sync::Mutex;
use tracing::{error, info, warn};

use crate::completion::{Captioner, CompletionClient, UpstreamError};
use crate::config::Config;
use crate::discord::commands::{ChatCommand, CommandError, Utility};
use crate::discord::wizard::{CreationWizard, WizardOutcome};
use crate::prompt::{self, PromptError};
use crate::registry::{self, CharacterStore, RegistryError, LIST_PAGE_SIZE};
use crate::split;

/// How many messages of a reply chain are followed for context.
const REPLY_CHAIN_LIMIT: usize = 50;
/// Error replies are clipped to this many characters.
const ERROR_REPLY_LIMIT: usize = 1024;

/// Anything that ends up as an error reply to the invoking user.
#[derive(thiserror::Error, Debug)]
pub enum BotError {
    #[error("{0}")]
    Command(#[from] CommandError),
    #[error("{0}")]
    Registry(#[from] RegistryError),
    #[error("{0}")]
    Prompt(#[from] PromptError),
    #[error("{0}")]
    Upstream(#[from] UpstreamError),
    #[error("Discord error: {0}")]
    Discord(#[from] serenity::Error),
}

pub struct AppState {
    pub config: Arc<Config>,
    pub store: Arc<dyn CharacterStore>,
    pub llm: CompletionClient,
    pub captioner: Option<Captioner>,
    bot_id: AtomicU64,
    wizards: Mutex<HashMap<(u64, u64), CreationWizard>>,
    channel_locks: Mutex<HashMap<u64, Arc<Mutex<()>>>>,
}

impl AppState {
    pub fn new(config: Arc<Config>, store: Arc<dyn CharacterStore>) -> Self {
        let llm = CompletionClient::new(&config);
        let captioner = Captioner::from_config(&config);
        Self {
            config,
            store,
            llm,
            captioner,
            bot_id: AtomicU64::new(0),
            wizards: Mutex::new(HashMap::new()),
            channel_locks: Mutex::new(HashMap::new()),
        }
    }

    fn bot_id(&self) -> u64 {
        self.bot_id.load(Ordering::SeqCst)
    }

    /// One lock per channel keeps replies within a conversation in the order
    /// their triggering messages arrived. Different channels never share a
    /// lock.
    async fn channel_lock(&self, channel: u64) -> Arc<Mutex<()>> {
        let mut locks = self.channel_locks.lock().await;
        locks
            .entry(channel)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }
}

pub struct Handler {
    state: Arc<AppState>,
}

impl Handler {
    pub fn new(state: Arc<AppState>) -> Self {
        Self { state }
    }
}

#[async_trait]
impl EventHandler for Handler {
    async fn ready(&self, ctx: Context, ready: Ready) {
        self.state.bot_id.store(ready.user.id.get(), Ordering::SeqCst);
        if let Some(activity) = &self.state.config.activity {
            ctx.set_activity(Some(ActivityData::playing(activity.clone())));
        }
        info!("Logged on as {}", ready.user.name);
    }

    async fn message(&self, ctx: Context, msg: Message) {
        if msg.author.bot || msg.webhook_id.is_some() {
            return;
        }
        let bot_id = self.state.bot_id();
        if msg.author.id.get() == bot_id {
            return;
        }

        let body = commands::strip_trigger(&msg.content, &self.state.config.command_start_str)
            .map(str::to_owned);

        // an in-progress creation dialogue consumes plain messages from its author
        if body.is_none() && self.feed_wizard(&ctx, &msg).await {
            return;
        }

        // otherwise only commands and replies to the bot are for us
        let mut replied: Option<Message> = None;
        if let Some(reference) = &msg.message_reference
            && let Some(message_id) = reference.message_id
        {
            replied = msg.channel_id.message(&ctx.http, message_id).await.ok();
        }
        let replied_to_bot = replied
            .as_ref()
            .is_some_and(|m| m.author.id.get() == bot_id);
        if body.is_none() && !replied_to_bot {
            return;
        }

        let _ = msg.react(&ctx.http, '⏳').await;
        let replied = if replied_to_bot { replied } else { None };
        let result = self.respond(&ctx, &msg, body.as_deref(), replied.as_ref()).await;
        match result {
            Ok(()) => {
                let _ = msg.react(&ctx.http, '✅').await;
            }
            Err(err) => {
                warn!("Failed to respond to {}: {err}", msg.author.name);
                let _ = msg.react(&ctx.http, '❌').await;
                let _ = msg
                    .reply(&ctx.http, format!("❌ {}", clip(&err.to_string(), ERROR_REPLY_LIMIT)))
                    .await;
            }
        }
        let _ = msg
            .channel_id
            .delete_reaction(&ctx.http, msg.id, None, ReactionType::Unicode("⏳".into()))
            .await;
    }

    /// [🗑️] on one of the bot's posts deletes it.
    async fn reaction_add(&self, ctx: Context, reaction: Reaction) {
        let bot_id = self.state.bot_id();
        if reaction.user_id.map(|u| u.get()) == Some(bot_id) {
            return;
        }
        if !reaction.emoji.unicode_eq("🗑️") {
            return;
        }
        let Ok(message) = reaction.message(&ctx.http).await else {
            return;
        };
        if message.author.id.get() != bot_id {
            return;
        }
        if let Err(e) = message.delete(&ctx.http).await {
            warn!("Failed to delete own message: {e}");
        }
    }
}

impl Handler {
    /// Routes a message into an active creation session, if its author has
    /// one in this channel. Returns true when the message was consumed.
    async fn feed_wizard(&self, ctx: &Context, msg: &Message) -> bool {
        let key = (msg.channel_id.get(), msg.author.id.get());
        let mut wizards = self.state.wizards.lock().await;
        let Some(session) = wizards.get_mut(&key) else {
            return false;
        };

        let reply = match session.feed(self.state.store.as_ref(), &msg.content).await {
            Ok(WizardOutcome::Continue(reply)) => reply,
            Ok(WizardOutcome::Done(reply)) => {
                wizards.remove(&key);
                reply
            }
            Err(e) => {
                error!("Creation dialogue failed: {e}");
                wizards.remove(&key);
                format!("❌ {e}")
            }
        };
        drop(wizards);

        if let Err(e) = msg.reply(&ctx.http, reply).await {
            warn!("Failed to send wizard reply: {e}");
        }
        true
    }

    async fn respond(
        &self,
        ctx: &Context,
        msg: &Message,
        body: Option<&str>,
        replied: Option<&Message>,
    ) -> Result<(), BotError> {
        let command = match body {
            Some(body) => commands::parse(body)?,
            // invoked by replying to the bot: the whole message is the prompt
            None => ChatCommand::prompt_only(&msg.content),
        };

        if let Some(utility) = &command.utility {
            let reply = self.handle_utility(msg, utility, &command.prompt).await?;
            msg.reply(&ctx.http, reply).await?;
            return Ok(());
        }

        // one generation at a time per channel, in arrival order
        let lock = self.state.channel_lock(msg.channel_id.get()).await;
        let _guard = lock.lock().await;

        // a reply to a character's message continues as that character
        let char_id = replied
            .and_then(replied_character_id)
            .or_else(|| command.character.clone());
        let character = match char_id {
            Some(id) => Some(
                registry::resolve_character(
                    self.state.store.as_ref(),
                    msg.guild_id.map(|g| g.get()),
                    msg.author.id.get(),
                    &id,
                )
                .await?,
            ),
            None => None,
        };

        let mut history = self.follow_reply_chain(ctx, msg).await;
        let mut text = command.prompt_text();
        if let Some(captioner) = &self.state.captioner {
            let images: Vec<String> = msg
                .attachments
                .iter()
                .filter(|a| {
                    a.content_type
                        .as_deref()
                        .is_some_and(|t| t.starts_with("image/"))
                })
                .map(|a| a.url.clone())
                .collect();
            captioner.describe_attachments(&images, &mut text).await;
        }
        history.push(Turn::from_speaker(
            Role::User,
            msg.author.display_name(),
            text,
        ));

        let assembled = prompt::assemble(character.as_ref(), &self.state.config, &history)?;
        let response = self.state.llm.generate(&assembled).await?;
        self.send_reply(ctx, msg, &response, character.as_ref())
            .await?;
        Ok(())
    }

    async fn handle_utility(
        &self,
        msg: &Message,
        name: &str,
        args: &[String],
    ) -> Result<String, BotError> {
        let store = self.state.store.as_ref();
        let user = msg.author.id.get();
        let guild = msg.guild_id.map(|g| g.get());

        match commands::parse_utility(name, args)? {
            Utility::Create => {
                let mut wizards = self.state.wizards.lock().await;
                let session = CreationWizard::new(user);
                let intro = session.intro();
                wizards.insert((msg.channel_id.get(), user), session);
                Ok(intro)
            }
            Utility::Update { id, field, value } => {
                let record = registry::resolve_character(store, guild, user, &id).await?;
                let fields = commands::fields_for(&field, &value)?;
                let record = store.update(record.scope, &record.id, user, fields).await?;
                Ok(format!("{} has been updated.", record.id))
            }
            Utility::Delete { id } => {
                let record = registry::resolve_character(store, guild, user, &id).await?;
                store.delete(record.scope, &record.id, user).await?;
                Ok(format!("{} was deleted.", record.id))
            }
            Utility::Publish { id } => {
                let Some(guild_id) = guild else {
                    return Ok("You are not speaking from a server!".into());
                };
                let record = store.get(Scope::Dm(user), &id).await?;
                let published = store.publish(&record, Scope::Guild(guild_id)).await?;
                Ok(format!("{} has been added to the server!", published.id))
            }
            Utility::Unpublish { id } => {
                let Some(guild_id) = guild else {
                    return Ok("You are not speaking from a server!".into());
                };
                store.delete(Scope::Guild(guild_id), &id, user).await?;
                Ok(format!("{id} has been removed from the server!"))
            }
            Utility::List { page } => {
                let Some(guild_id) = guild else {
                    return Ok(
                        "You are not on a server. Did you want a list of your own \
                         characters? Use `-u mine` instead."
                            .into(),
                    );
                };
                let offset = (page - 1).saturating_mul(LIST_PAGE_SIZE);
                let list = store.list(Scope::Guild(guild_id), offset).await?;
                if list.is_empty() {
                    Ok("There are no public characters on this server.".into())
                } else {
                    Ok(format_list(&list))
                }
            }
            Utility::Mine { page } => {
                let offset = (page - 1).saturating_mul(LIST_PAGE_SIZE);
                let list = store.list(Scope::Dm(user), offset).await?;
                if list.is_empty() {
                    Ok("You don't own any characters.".into())
                } else {
                    Ok(format_list(&list))
                }
            }
            Utility::Import => {
                let Some(attachment) = msg.attachments.first() else {
                    return Ok("Attach a character definition file to import.".into());
                };
                let bytes = attachment.download().await?;
                let text = String::from_utf8_lossy(&bytes);
                let doc: CharacterDoc = serde_yaml::from_str(&text)
                    .map_err(|e| CommandError(format!("Could not parse the character file: {e}")))?;
                let (id, fields) = doc.into_fields();
                let record = store.create(Scope::Dm(user), user, &id, fields).await?;
                Ok(format!("Imported {}.", record.id))
            }
            Utility::Help => Ok(commands::help_text(&self.state.config.command_start_str)),
        }
    }

    /// Rebuild the conversation by walking the reply chain backwards from the
    /// invoking message. Returns turns oldest-first, excluding the invoking
    /// message itself.
    async fn follow_reply_chain(&self, ctx: &Context, msg: &Message) -> Vec<Turn> {
        let bot_id = self.state.bot_id();
        let mut turns = Vec::new();
        let mut current = msg.clone();

        for _ in 0..REPLY_CHAIN_LIMIT {
            let Some(message_id) = current
                .message_reference
                .as_ref()
                .and_then(|r| r.message_id)
            else {
                break;
            };
            // the user may have deleted a message in the chain; stop there
            let Ok(fetched) = current.channel_id.message(&ctx.http, message_id).await else {
                break;
            };
            if let Some(turn) = self.turn_from_message(&fetched, bot_id) {
                turns.push(turn);
            }
            current = fetched;
        }

        turns.reverse();
        turns
    }

    /// One reply-chain message as a conversation turn. The bot's own posts
    /// carry their text in embeds; command messages contribute only their
    /// prompt part; empty messages are dropped.
    fn turn_from_message(&self, message: &Message, bot_id: u64) -> Option<Turn> {
        if message.author.id.get() == bot_id {
            let embed = message.embeds.first()?;
            let content = embed.description.clone()?;
            if content.is_empty() {
                return None;
            }
            Some(Turn {
                role: Role::Assistant,
                speaker: embed.title.clone(),
                content,
            })
        } else {
            let trigger = &self.state.config.command_start_str;
            let text = match commands::strip_trigger(&message.content, trigger) {
                Some(body) => commands::parse(body)
                    .map(|c| c.prompt_text())
                    .unwrap_or_else(|_| message.content.clone()),
                None => message.content.clone(),
            };
            if text.is_empty() {
                return None;
            }
            Some(Turn::from_speaker(
                Role::User,
                message.author.display_name(),
                text,
            ))
        }
    }

    /// Send the generated text, split under Discord's character limit, as
    /// embeds decorated with the active character's name and avatar.
    async fn send_reply(
        &self,
        ctx: &Context,
        msg: &Message,
        response: &str,
        character: Option<&Character>,
    ) -> Result<(), serenity::Error> {
        let response = if response.trim().is_empty() {
            "..."
        } else {
            response
        };

        let mut first = true;
        for piece in split::split_text(response, split::DISCORD_CHAR_LIMIT) {
            let mut embed = CreateEmbed::new().description(piece);
            if let Some(character) = character {
                embed = embed
                    .title(character.name().to_string())
                    // the id in the footer lets replies continue as this character
                    .footer(CreateEmbedFooter::new(character.id.clone()));
                if let Some(avatar) = &character.avatar_link {
                    embed = embed.thumbnail(avatar.clone());
                }
            }

            let mut builder = CreateMessage::new().embed(embed);
            if first {
                builder = builder.reference_message(msg);
                first = false;
            }
            let sent = msg.channel_id.send_message(&ctx.http, builder).await?;
            let _ = sent.react(&ctx.http, ReactionType::Unicode("🗑️".into())).await;
        }
        Ok(())
    }
}

/// The character id a bot message spoke as, from its embed footer.
fn replied_character_id(message: &Message) -> Option<String> {
    let footer = message.embeds.first()?.footer.as_ref()?;
    if footer.text.is_empty() {
        None
    } else {
        Some(footer.text.clone())
    }
}

fn format_list(list: &[CharacterSummary]) -> String {
    let mut output = String::new();
    for entry in list {
        output.push('\n');
        output.push_str(&entry.id);
        if let Some(name) = &entry.display_name {
            output.push_str(&format!(" ({name})"));
        }
        if let Some(description) = &entry.description {
            output.push_str(&format!("\n> {description}"));
        }
    }
    output
}

fn clip(text: &str, max_chars: usize) -> String {
    text.chars().take(max_chars).collect()
}
