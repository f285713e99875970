use std::collections::HashMap;
use std::time::Duration;

use async_openai::{
    config::OpenAIConfig,
    error::OpenAIError,
    types::chat::{
        ChatCompletionRequestAssistantMessageArgs, ChatCompletionRequestAssistantMessageContent,
        ChatCompletionRequestMessage, ChatCompletionRequestMessageContentPartImageArgs,
        ChatCompletionRequestMessageContentPartTextArgs, ChatCompletionRequestSystemMessageArgs,
        ChatCompletionRequestUserMessageArgs, ChatCompletionRequestUserMessageContent,
        CreateChatCompletionRequestArgs, ImageUrlArgs, StopConfiguration,
    },
    Client,
};
use shared::models::{Role, Turn};
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::warn;

use crate::config::Config;
use crate::prompt::Assembled;

#[derive(Error, Debug)]
pub enum UpstreamError {
    #[error("The model backend did not respond within {0} seconds.")]
    Timeout(u64),
    #[error("Model backend error: {0}")]
    Api(#[from] OpenAIError),
    #[error("The model backend returned an empty response.")]
    Empty,
}

/// Client for the completions endpoint. One call per inbound message, bounded
/// by the configured timeout, never retried.
#[derive(Clone)]
pub struct CompletionClient {
    client: Client<OpenAIConfig>,
    stop_words: Vec<String>,
    timeout: Duration,
}

impl CompletionClient {
    pub fn new(config: &Config) -> Self {
        let api = OpenAIConfig::new()
            .with_api_key(config.api_key.clone())
            .with_api_base(config.api_base_url.clone());
        Self {
            client: Client::with_config(api),
            stop_words: config.stop_words.clone(),
            timeout: config.request_timeout(),
        }
    }

    pub async fn generate(&self, assembled: &Assembled) -> Result<String, UpstreamError> {
        let messages: Vec<ChatCompletionRequestMessage> =
            assembled.turns.iter().map(to_request_message).collect();

        let mut builder = CreateChatCompletionRequestArgs::default();
        builder
            .model(assembled.model.clone())
            .messages(messages)
            .temperature(assembled.params.temperature)
            .top_p(assembled.params.top_p)
            .presence_penalty(assembled.params.presence_penalty)
            .frequency_penalty(assembled.params.frequency_penalty)
            .max_tokens(assembled.params.max_new_tokens);
        if !self.stop_words.is_empty() {
            builder.stop(StopConfiguration::StringArray(self.stop_words.clone()));
        }
        let request = builder.build()?;

        let response = tokio::time::timeout(self.timeout, self.client.chat().create(request))
            .await
            .map_err(|_| UpstreamError::Timeout(self.timeout.as_secs()))??;

        response
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .filter(|text| !text.is_empty())
            .ok_or(UpstreamError::Empty)
    }
}

fn to_request_message(turn: &Turn) -> ChatCompletionRequestMessage {
    let content = turn.content.clone();
    match turn.role {
        Role::System => {
            let msg = ChatCompletionRequestSystemMessageArgs::default()
                .content(content)
                .build()
                .unwrap_or_default();
            ChatCompletionRequestMessage::System(msg)
        }
        Role::User => {
            let msg = ChatCompletionRequestUserMessageArgs::default()
                .content(content)
                .build()
                .unwrap_or_default();
            ChatCompletionRequestMessage::User(msg)
        }
        Role::Assistant => {
            let msg = ChatCompletionRequestAssistantMessageArgs::default()
                .content(ChatCompletionRequestAssistantMessageContent::Text(content))
                .build()
                .unwrap_or_default();
            ChatCompletionRequestMessage::Assistant(msg)
        }
    }
}

/// Client for the secondary captioning endpoint. Captions are memoized by
/// image URL for the lifetime of the process, so reposted images are only
/// described once.
pub struct Captioner {
    client: Client<OpenAIConfig>,
    model: String,
    system_prompt: Option<String>,
    question: String,
    timeout: Duration,
    cache: Mutex<HashMap<String, String>>,
}

impl Captioner {
    /// Returns `None` unless a captioning endpoint is configured.
    pub fn from_config(config: &Config) -> Option<Self> {
        let base_url = config.image_api_base_url.clone()?;
        let api = OpenAIConfig::new()
            .with_api_key(config.image_api_key.clone().unwrap_or_default())
            .with_api_base(base_url);
        Some(Self {
            client: Client::with_config(api),
            model: config.image_model.clone(),
            system_prompt: config.image_system_prompt.clone(),
            question: config.image_question_prompt.clone(),
            timeout: config.request_timeout(),
            cache: Mutex::new(HashMap::new()),
        })
    }

    pub async fn caption(&self, url: &str) -> Result<String, UpstreamError> {
        if let Some(hit) = self.cache.lock().await.get(url) {
            return Ok(hit.clone());
        }

        let mut messages: Vec<ChatCompletionRequestMessage> = Vec::new();
        if let Some(system) = &self.system_prompt {
            let msg = ChatCompletionRequestSystemMessageArgs::default()
                .content(system.clone())
                .build()
                .unwrap_or_default();
            messages.push(ChatCompletionRequestMessage::System(msg));
        }
        let image = ChatCompletionRequestMessageContentPartImageArgs::default()
            .image_url(ImageUrlArgs::default().url(url).build()?)
            .build()?;
        let question = ChatCompletionRequestMessageContentPartTextArgs::default()
            .text(self.question.clone())
            .build()?;
        let user = ChatCompletionRequestUserMessageArgs::default()
            .content(ChatCompletionRequestUserMessageContent::Array(vec![
                image.into(),
                question.into(),
            ]))
            .build()
            .unwrap_or_default();
        messages.push(ChatCompletionRequestMessage::User(user));

        let request = CreateChatCompletionRequestArgs::default()
            .model(self.model.clone())
            .messages(messages)
            .build()?;

        let response = tokio::time::timeout(self.timeout, self.client.chat().create(request))
            .await
            .map_err(|_| UpstreamError::Timeout(self.timeout.as_secs()))??;

        let caption = response
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .filter(|text| !text.is_empty())
            .ok_or(UpstreamError::Empty)?;

        self.cache
            .lock()
            .await
            .insert(url.to_string(), caption.clone());
        Ok(caption)
    }

    /// Caption every image attached to a message and fold the descriptions
    /// into the turn text. Caption failures degrade to omitting the note.
    pub async fn describe_attachments(&self, urls: &[String], text: &mut String) {
        for url in urls {
            match self.caption(url).await {
                Ok(caption) => {
                    text.push_str(&format!(
                        "\n\n```SYSTEM: An image was attached to this message. \
                         Here is a description of the image: {caption}```"
                    ));
                }
                Err(e) => warn!("Failed to caption attached image: {e}"),
            }
        }
    }
}
