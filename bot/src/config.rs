use std::path::Path;
use std::time::Duration;

use serde::Deserialize;
use shared::models::GenDefaults;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to parse config file: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("Missing required config field `{0}`")]
    Missing(&'static str),
    #[error("Invalid config: {0}")]
    Invalid(String),
}

/// Process-wide configuration, loaded once at startup and read-only
/// thereafter. Per-character overrides are applied at the assembler layer
/// and are never written back here.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct Config {
    pub api_key: String,
    pub api_base_url: String,
    pub client_token: String,
    pub default_model: String,
    #[serde(flatten)]
    pub defaults: GenDefaults,
    pub context_length: u32,
    pub stop_words: Vec<String>,
    pub system_prompt: Option<String>,
    pub use_tools: bool,
    pub tool_prompt: Option<String>,
    pub chat_template: Option<String>,
    pub command_start_str: String,
    pub activity: Option<String>,
    pub bot_name: Option<String>,
    pub request_timeout_secs: u64,
    pub db_path: String,
    pub image_api_base_url: Option<String>,
    pub image_api_key: Option<String>,
    pub image_model: String,
    pub image_system_prompt: Option<String>,
    pub image_question_prompt: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            api_base_url: String::new(),
            client_token: String::new(),
            default_model: "default".into(),
            defaults: GenDefaults::default(),
            context_length: 4096,
            stop_words: Vec::new(),
            system_prompt: None,
            use_tools: false,
            tool_prompt: None,
            chat_template: None,
            command_start_str: "!syn".into(),
            activity: None,
            bot_name: None,
            request_timeout_secs: 120,
            db_path: "characters.db".into(),
            image_api_base_url: None,
            image_api_key: None,
            image_model: "gpt-4-vision-preview".into(),
            image_system_prompt: None,
            image_question_prompt: "Describe this image in detail.".into(),
        }
    }
}

impl Config {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        Self::parse(&text)
    }

    /// Parse and validate a config document. Unknown keys are ignored;
    /// absent optional keys take their defaults.
    pub fn parse(text: &str) -> Result<Self, ConfigError> {
        let config: Config = serde_yaml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.api_base_url.is_empty() {
            return Err(ConfigError::Missing("api_base_url"));
        }
        if self.client_token.is_empty() {
            return Err(ConfigError::Missing("client_token"));
        }
        if self.command_start_str.is_empty() {
            return Err(ConfigError::Invalid(
                "command_start_str must not be empty".into(),
            ));
        }
        if self.context_length == 0 || self.defaults.max_new_tokens == 0 {
            return Err(ConfigError::Invalid(
                "context_length and max_new_tokens must be positive".into(),
            ));
        }
        if self.defaults.max_new_tokens >= self.context_length {
            return Err(ConfigError::Invalid(format!(
                "max_new_tokens ({}) must be smaller than context_length ({})",
                self.defaults.max_new_tokens, self.context_length
            )));
        }
        Ok(())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = "api_base_url: http://localhost:8080/v1\nclient_token: token\n";

    #[test]
    fn minimal_config_takes_defaults() {
        let config = Config::parse(MINIMAL).unwrap();
        assert_eq!(config.command_start_str, "!syn");
        assert_eq!(config.context_length, 4096);
        assert_eq!(config.defaults.temperature, 0.7);
        assert_eq!(config.defaults.max_new_tokens, 512);
        assert!(config.stop_words.is_empty());
        assert!(!config.use_tools);
    }

    #[test]
    fn generation_defaults_read_from_top_level_keys() {
        let text = format!("{MINIMAL}temperature: 1.1\ntop_p: 0.5\nmax_new_tokens: 256\n");
        let config = Config::parse(&text).unwrap();
        assert_eq!(config.defaults.temperature, 1.1);
        assert_eq!(config.defaults.top_p, 0.5);
        assert_eq!(config.defaults.max_new_tokens, 256);
    }

    #[test]
    fn unknown_keys_are_ignored() {
        let text = format!("{MINIMAL}some_future_key: 42\n");
        assert!(Config::parse(&text).is_ok());
    }

    #[test]
    fn missing_required_fields_fail_fast() {
        assert!(matches!(
            Config::parse("client_token: token\n"),
            Err(ConfigError::Missing("api_base_url"))
        ));
        assert!(matches!(
            Config::parse("api_base_url: http://localhost:8080/v1\n"),
            Err(ConfigError::Missing("client_token"))
        ));
    }

    #[test]
    fn generation_budget_must_fit_in_context() {
        let text = format!("{MINIMAL}context_length: 512\nmax_new_tokens: 512\n");
        assert!(matches!(
            Config::parse(&text),
            Err(ConfigError::Invalid(_))
        ));
    }

    #[test]
    fn stop_words_parse_as_list() {
        let text = format!("{MINIMAL}stop_words:\n  - \"</s>\"\n  - \"User:\"\n");
        let config = Config::parse(&text).unwrap();
        assert_eq!(config.stop_words, vec!["</s>", "User:"]);
    }
}
