use clap::Parser;
use shared::models::CharacterFields;
use thiserror::Error;

#[derive(Error, Debug)]
#[error("{0}")]
pub struct CommandError(pub String);

/// A chat command, parsed from the text after the trigger string.
#[derive(Parser, Debug, PartialEq)]
#[command(
    name = "!syn",
    about = "This bot is an interface for chatting with large language models.",
    no_binary_name = true,
    disable_version_flag = true
)]
pub struct ChatCommand {
    /// The character for the bot to assume in its response.
    #[arg(short = 'c', long = "character")]
    pub character: Option<String>,

    /// Run a utility instead of generating a response, e.g. `-u create`.
    /// Remaining words become the utility's arguments.
    #[arg(short = 'u', long = "utility")]
    pub utility: Option<String>,

    /// The prompt to give the bot.
    #[arg(trailing_var_arg = true)]
    pub prompt: Vec<String>,
}

impl ChatCommand {
    /// A command carrying only a prompt, for messages that invoke the bot by
    /// replying to it rather than with the trigger string.
    pub fn prompt_only(text: &str) -> Self {
        Self {
            character: None,
            utility: None,
            prompt: vec![text.to_string()],
        }
    }

    pub fn prompt_text(&self) -> String {
        self.prompt.join(" ")
    }
}

/// Returns the command body when `text` starts with the trigger string
/// followed by a word boundary; `None` means the message is not for us.
pub fn strip_trigger<'a>(text: &'a str, trigger: &str) -> Option<&'a str> {
    let rest = text.strip_prefix(trigger)?;
    if rest.is_empty() || rest.starts_with(char::is_whitespace) {
        Some(rest.trim_start())
    } else {
        None
    }
}

pub fn parse(body: &str) -> Result<ChatCommand, CommandError> {
    ChatCommand::try_parse_from(body.split_whitespace())
        .map_err(|e| CommandError(e.to_string()))
}

/// A parsed utility invocation.
#[derive(Clone, Debug, PartialEq)]
pub enum Utility {
    Create,
    Update {
        id: String,
        field: String,
        value: String,
    },
    Delete {
        id: String,
    },
    Publish {
        id: String,
    },
    Unpublish {
        id: String,
    },
    List {
        page: u32,
    },
    Mine {
        page: u32,
    },
    Import,
    Help,
}

pub fn parse_utility(name: &str, args: &[String]) -> Result<Utility, CommandError> {
    match name {
        "create" => Ok(Utility::Create),
        "update" => {
            if args.len() < 3 {
                return Err(CommandError(
                    "Usage: -u update <id> <field> <value>".into(),
                ));
            }
            Ok(Utility::Update {
                id: args[0].clone(),
                field: args[1].clone(),
                value: args[2..].join(" "),
            })
        }
        "delete" => Ok(Utility::Delete {
            id: one_arg(name, args)?,
        }),
        "publish" => Ok(Utility::Publish {
            id: one_arg(name, args)?,
        }),
        "unpublish" => Ok(Utility::Unpublish {
            id: one_arg(name, args)?,
        }),
        "list" => Ok(Utility::List {
            page: page_arg(args)?,
        }),
        "mine" => Ok(Utility::Mine {
            page: page_arg(args)?,
        }),
        "import" => Ok(Utility::Import),
        "help" => Ok(Utility::Help),
        other => Err(CommandError(format!(
            "Unknown utility `{other}`. Try `-u help`."
        ))),
    }
}

fn one_arg(name: &str, args: &[String]) -> Result<String, CommandError> {
    match args.first() {
        Some(id) => Ok(id.clone()),
        None => Err(CommandError(format!("Usage: -u {name} <id>"))),
    }
}

fn page_arg(args: &[String]) -> Result<u32, CommandError> {
    match args.first() {
        None => Ok(1),
        Some(raw) => raw
            .parse::<u32>()
            .ok()
            .filter(|page| *page > 0)
            .ok_or_else(|| CommandError(format!("`{raw}` is not a valid page number."))),
    }
}

/// Map an editable field name and raw value to an update payload, mirroring
/// the creation fields plus the generation overrides.
pub fn fields_for(field: &str, value: &str) -> Result<CharacterFields, CommandError> {
    let mut fields = CharacterFields::default();
    let text = || Some(value.to_string());
    match field {
        "display_name" => fields.display_name = text(),
        "description" => fields.description = text(),
        "avatar_link" => fields.avatar_link = text(),
        "system_prompt" => fields.system_prompt = text(),
        "example_message" => fields.example_message = text(),
        "model" => fields.model = text(),
        "temperature" | "top_p" | "min_p" | "presence_penalty" | "frequency_penalty"
        | "mirostat_tau" | "mirostat_eta" => {
            let number: f32 = value
                .parse()
                .map_err(|_| CommandError(format!("`{value}` is not a number.")))?;
            let params = &mut fields.params;
            match field {
                "temperature" => params.temperature = Some(number),
                "top_p" => params.top_p = Some(number),
                "min_p" => params.min_p = Some(number),
                "presence_penalty" => params.presence_penalty = Some(number),
                "frequency_penalty" => params.frequency_penalty = Some(number),
                "mirostat_tau" => params.mirostat_tau = Some(number),
                _ => params.mirostat_eta = Some(number),
            }
        }
        "top_k" | "max_new_tokens" | "mirostat" => {
            let number: u32 = value
                .parse()
                .map_err(|_| CommandError(format!("`{value}` is not a whole number.")))?;
            let params = &mut fields.params;
            match field {
                "top_k" => params.top_k = Some(number),
                "max_new_tokens" => params.max_new_tokens = Some(number),
                _ => params.mirostat = Some(number as u8),
            }
        }
        other => {
            return Err(CommandError(format!(
                "`{other}` is not an editable field."
            )));
        }
    }
    Ok(fields)
}

pub fn help_text(trigger: &str) -> String {
    format!(
        "Chat with the bot with `{trigger} <prompt>`, or as a character with \
         `{trigger} -c <id> <prompt>`. Replying to one of the bot's messages \
         continues that conversation.\n\
         Utilities (`{trigger} -u <utility>`):\n\
         `create` — create a character step by step\n\
         `update <id> <field> <value>` — edit a character you own\n\
         `delete <id>` — delete a character you own\n\
         `publish <id>` / `unpublish <id>` — share a character with this \
         server, or stop sharing it\n\
         `list [page]` — characters on this server\n\
         `mine [page]` — characters you own\n\
         `import` — create a character from an attached definition file"
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trigger_prefix_is_required() {
        assert_eq!(strip_trigger("!syn hello", "!syn"), Some("hello"));
        assert_eq!(strip_trigger("!syn", "!syn"), Some(""));
        assert_eq!(strip_trigger("hello", "!syn"), None);
        // a longer word that merely starts with the trigger is not a command
        assert_eq!(strip_trigger("!synthesis hello", "!syn"), None);
    }

    #[test]
    fn plain_prompt_parses() {
        let command = parse("tell me a story").unwrap();
        assert_eq!(command.character, None);
        assert_eq!(command.prompt_text(), "tell me a story");
    }

    #[test]
    fn character_flag_parses() {
        let command = parse("-c bob tell me a story").unwrap();
        assert_eq!(command.character.as_deref(), Some("bob"));
        assert_eq!(command.prompt_text(), "tell me a story");
    }

    #[test]
    fn utility_with_arguments_parses() {
        let command = parse("-u update bob description A gruff dwarf").unwrap();
        assert_eq!(command.utility.as_deref(), Some("update"));
        let utility = parse_utility("update", &command.prompt).unwrap();
        assert_eq!(
            utility,
            Utility::Update {
                id: "bob".into(),
                field: "description".into(),
                value: "A gruff dwarf".into(),
            }
        );
    }

    #[test]
    fn unknown_utility_is_an_error() {
        assert!(parse_utility("frobnicate", &[]).is_err());
    }

    #[test]
    fn missing_utility_arguments_are_an_error() {
        assert!(parse_utility("delete", &[]).is_err());
        assert!(parse_utility("update", &["bob".into()]).is_err());
    }

    #[test]
    fn page_argument_defaults_and_validates() {
        assert_eq!(parse_utility("list", &[]).unwrap(), Utility::List { page: 1 });
        assert_eq!(
            parse_utility("list", &["3".into()]).unwrap(),
            Utility::List { page: 3 }
        );
        assert!(parse_utility("list", &["zero".into()]).is_err());
        assert!(parse_utility("list", &["0".into()]).is_err());
    }

    #[test]
    fn fields_map_to_update_payloads() {
        let fields = fields_for("description", "A gruff dwarf").unwrap();
        assert_eq!(fields.description.as_deref(), Some("A gruff dwarf"));

        let fields = fields_for("temperature", "1.2").unwrap();
        assert_eq!(fields.params.temperature, Some(1.2));

        assert!(fields_for("temperature", "hot").is_err());
        assert!(fields_for("owner", "someone").is_err());
    }

    #[test]
    fn invalid_flags_report_an_error() {
        assert!(parse("--no-such-flag hello").is_err());
    }
}
