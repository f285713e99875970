use shared::models::{Character, ResolvedParams, Role, Turn};
use thiserror::Error;

use crate::config::Config;

/// Rough measure of how many characters are in each token, used for context
/// budgeting.
const EST_CHARS_PER_TOKEN: usize = 3;

#[derive(Error, Debug)]
pub enum PromptError {
    #[error("No character is active and no default system prompt is configured.")]
    NoPersona,
}

/// An assembled generation request: role-tagged messages, a fully resolved
/// parameter set, and the model to use.
#[derive(Clone, Debug)]
pub struct Assembled {
    pub model: String,
    pub turns: Vec<Turn>,
    pub params: ResolvedParams,
}

/// Build the outbound request for one inbound message.
///
/// The system message comes from the active character (or the process-wide
/// default), the character's example message becomes a single illustrative
/// assistant turn, and the live conversation follows in chronological order.
/// When the estimated size exceeds the context budget, the oldest
/// conversational turns are dropped first; the system message, the example
/// turn, and the newest turn are always retained.
pub fn assemble(
    character: Option<&Character>,
    config: &Config,
    history: &[Turn],
) -> Result<Assembled, PromptError> {
    let mut system = match character.and_then(|c| c.system_prompt.as_deref()) {
        Some(prompt) => prompt.to_string(),
        None => config
            .system_prompt
            .clone()
            .ok_or(PromptError::NoPersona)?,
    };
    if config.use_tools
        && let Some(tool_prompt) = &config.tool_prompt
    {
        system.push_str("\n\n");
        system.push_str(tool_prompt);
    }

    let params = character
        .map(|c| c.params.clone())
        .unwrap_or_default()
        .resolve(&config.defaults);
    let model = character
        .and_then(|c| c.model.clone())
        .unwrap_or_else(|| config.default_model.clone());

    let mut turns = vec![Turn::new(Role::System, system)];
    if let Some(example) = character.and_then(|c| c.example_message.as_deref()) {
        turns.push(Turn::new(Role::Assistant, example));
    }

    let budget = config.context_length.saturating_sub(params.max_new_tokens) as usize;
    let mut used: usize = turns.iter().map(estimate).sum();

    // walk the history newest-first and stop once the budget is spent
    let mut kept: Vec<Turn> = Vec::new();
    for (index, turn) in history.iter().enumerate().rev() {
        if turn.content.is_empty() {
            continue;
        }
        let turn = attribute(turn);
        let cost = estimate(&turn);
        let is_newest = index + 1 == history.len();
        if !is_newest && used + cost > budget {
            break;
        }
        used += cost;
        kept.push(turn);
    }
    kept.reverse();
    turns.extend(kept);

    Ok(Assembled {
        model,
        turns,
        params,
    })
}

fn estimate(turn: &Turn) -> usize {
    turn.content.len() / EST_CHARS_PER_TOKEN
}

/// User turns carry their speaker's name so the model can tell participants
/// apart in multi-user channels.
fn attribute(turn: &Turn) -> Turn {
    match (&turn.role, &turn.speaker) {
        (Role::User, Some(name)) => Turn::new(Role::User, format!("{name}: {}", turn.content)),
        _ => turn.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::models::{GenParams, Scope};

    fn config() -> Config {
        Config {
            system_prompt: Some("You are a helpful assistant.".into()),
            ..Config::default()
        }
    }

    fn character() -> Character {
        Character {
            id: "bob".into(),
            scope: Scope::Dm(100),
            author: 100,
            display_name: Some("Bob".into()),
            description: None,
            avatar_link: None,
            system_prompt: Some("You are Bob, a gruff dwarf.".into()),
            example_message: Some("Aye, what d'ye want?".into()),
            model: None,
            params: GenParams::default(),
        }
    }

    #[test]
    fn default_persona_used_when_no_character_is_active() {
        let assembled = assemble(None, &config(), &[Turn::new(Role::User, "hi")]).unwrap();
        assert_eq!(assembled.turns[0].role, Role::System);
        assert_eq!(assembled.turns[0].content, "You are a helpful assistant.");
    }

    #[test]
    fn no_persona_at_all_is_an_error() {
        let mut config = config();
        config.system_prompt = None;
        let result = assemble(None, &config, &[Turn::new(Role::User, "hi")]);
        assert!(matches!(result, Err(PromptError::NoPersona)));
    }

    #[test]
    fn character_prompt_and_example_lead_the_conversation() {
        let character = character();
        let history = [Turn::new(Role::User, "hello there")];
        let assembled = assemble(Some(&character), &config(), &history).unwrap();

        assert_eq!(assembled.turns[0].content, "You are Bob, a gruff dwarf.");
        assert_eq!(assembled.turns[1].role, Role::Assistant);
        assert_eq!(assembled.turns[1].content, "Aye, what d'ye want?");
        assert_eq!(assembled.turns[2].content, "hello there");
    }

    #[test]
    fn character_temperature_override_keeps_other_defaults() {
        let mut character = character();
        character.params.temperature = Some(1.5);
        let assembled =
            assemble(Some(&character), &config(), &[Turn::new(Role::User, "hi")]).unwrap();

        let defaults = config().defaults;
        assert_eq!(assembled.params.temperature, 1.5);
        assert_eq!(assembled.params.top_p, defaults.top_p);
        assert_eq!(assembled.params.top_k, defaults.top_k);
        assert_eq!(assembled.params.presence_penalty, defaults.presence_penalty);
        assert_eq!(assembled.params.max_new_tokens, defaults.max_new_tokens);
    }

    #[test]
    fn character_model_override_wins_over_default() {
        let mut character = character();
        character.model = Some("other-model".into());
        let assembled =
            assemble(Some(&character), &config(), &[Turn::new(Role::User, "hi")]).unwrap();
        assert_eq!(assembled.model, "other-model");
    }

    #[test]
    fn oldest_turns_are_dropped_when_over_budget() {
        let mut config = config();
        // budget of (400 - 200) * 3 = 600 chars of history
        config.context_length = 400;
        config.defaults.max_new_tokens = 200;

        let character = character();
        let long = "x".repeat(450);
        let history = [
            Turn::new(Role::User, long.clone()),
            Turn::new(Role::Assistant, long.clone()),
            Turn::new(Role::User, "the final question"),
        ];
        let assembled = assemble(Some(&character), &config, &history).unwrap();

        // system + example survive unconditionally, as does the newest turn
        assert_eq!(assembled.turns[0].role, Role::System);
        assert_eq!(assembled.turns[1].content, "Aye, what d'ye want?");
        let contents: Vec<&str> = assembled
            .turns
            .iter()
            .map(|t| t.content.as_str())
            .collect();
        assert!(contents.contains(&"the final question"));
        // the oldest long turn no longer fits
        assert_eq!(
            contents.iter().filter(|c| c.len() >= 450).count(),
            1,
            "only the newer long turn should survive"
        );
    }

    #[test]
    fn newest_turn_survives_even_when_over_budget() {
        let mut config = config();
        config.context_length = 100;
        config.defaults.max_new_tokens = 90;

        let huge = "y".repeat(5000);
        let history = [Turn::new(Role::User, huge.clone())];
        let assembled = assemble(None, &config, &history).unwrap();
        assert_eq!(assembled.turns.last().unwrap().content, huge);
    }

    #[test]
    fn user_turns_carry_speaker_attribution() {
        let history = [Turn::from_speaker(Role::User, "alice", "how are you?")];
        let assembled = assemble(None, &config(), &history).unwrap();
        assert_eq!(assembled.turns.last().unwrap().content, "alice: how are you?");
    }

    #[test]
    fn tool_prompt_appended_when_tools_enabled() {
        let mut config = config();
        config.use_tools = true;
        config.tool_prompt = Some("You may call tools.".into());
        let assembled = assemble(None, &config, &[]).unwrap();
        assert!(assembled.turns[0].content.ends_with("You may call tools."));
    }

    #[test]
    fn empty_history_turns_are_skipped() {
        let history = [
            Turn::new(Role::User, ""),
            Turn::new(Role::User, "something"),
        ];
        let assembled = assemble(None, &config(), &history).unwrap();
        assert_eq!(assembled.turns.len(), 2);
        assert_eq!(assembled.turns[1].content, "something");
    }
}
