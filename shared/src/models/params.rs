use serde::{Deserialize, Serialize};

/// Per-character generation overrides. Every field is optional; unset fields
/// fall back to the process-wide defaults at assembly time.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GenParams {
    pub temperature: Option<f32>,
    pub top_p: Option<f32>,
    pub top_k: Option<u32>,
    pub min_p: Option<f32>,
    pub presence_penalty: Option<f32>,
    pub frequency_penalty: Option<f32>,
    pub mirostat: Option<u8>,
    pub mirostat_tau: Option<f32>,
    pub mirostat_eta: Option<f32>,
    pub max_new_tokens: Option<u32>,
}

impl GenParams {
    /// Overlay another set of overrides onto this one. Fields set in `other`
    /// win; fields left unset keep their current value.
    pub fn merge(&mut self, other: &GenParams) {
        macro_rules! take {
            ($field:ident) => {
                if other.$field.is_some() {
                    self.$field = other.$field;
                }
            };
        }
        take!(temperature);
        take!(top_p);
        take!(top_k);
        take!(min_p);
        take!(presence_penalty);
        take!(frequency_penalty);
        take!(mirostat);
        take!(mirostat_tau);
        take!(mirostat_eta);
        take!(max_new_tokens);
    }

    /// Resolve field-by-field against the process defaults. The result is
    /// always fully defined.
    pub fn resolve(&self, defaults: &GenDefaults) -> ResolvedParams {
        ResolvedParams {
            temperature: self.temperature.unwrap_or(defaults.temperature),
            top_p: self.top_p.unwrap_or(defaults.top_p),
            top_k: self.top_k.unwrap_or(defaults.top_k),
            min_p: self.min_p.unwrap_or(defaults.min_p),
            presence_penalty: self.presence_penalty.unwrap_or(defaults.presence_penalty),
            frequency_penalty: self.frequency_penalty.unwrap_or(defaults.frequency_penalty),
            mirostat: self.mirostat.unwrap_or(defaults.mirostat),
            mirostat_tau: self.mirostat_tau.unwrap_or(defaults.mirostat_tau),
            mirostat_eta: self.mirostat_eta.unwrap_or(defaults.mirostat_eta),
            max_new_tokens: self.max_new_tokens.unwrap_or(defaults.max_new_tokens),
        }
    }
}

/// Process-wide generation defaults, loaded once from configuration.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GenDefaults {
    pub temperature: f32,
    pub top_p: f32,
    pub top_k: u32,
    pub min_p: f32,
    pub presence_penalty: f32,
    pub frequency_penalty: f32,
    pub mirostat: u8,
    pub mirostat_tau: f32,
    pub mirostat_eta: f32,
    pub max_new_tokens: u32,
}

impl Default for GenDefaults {
    fn default() -> Self {
        Self {
            temperature: 0.7,
            top_p: 0.9,
            top_k: 40,
            min_p: 0.0,
            presence_penalty: 0.0,
            frequency_penalty: 0.0,
            mirostat: 0,
            mirostat_tau: 5.0,
            mirostat_eta: 0.1,
            max_new_tokens: 512,
        }
    }
}

/// A fully resolved parameter set for one generation request.
#[derive(Clone, Debug, PartialEq)]
pub struct ResolvedParams {
    pub temperature: f32,
    pub top_p: f32,
    pub top_k: u32,
    pub min_p: f32,
    pub presence_penalty: f32,
    pub frequency_penalty: f32,
    pub mirostat: u8,
    pub mirostat_tau: f32,
    pub mirostat_eta: f32,
    pub max_new_tokens: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unset_params_resolve_to_defaults() {
        let defaults = GenDefaults::default();
        let resolved = GenParams::default().resolve(&defaults);
        assert_eq!(resolved.temperature, defaults.temperature);
        assert_eq!(resolved.max_new_tokens, defaults.max_new_tokens);
    }

    #[test]
    fn single_override_leaves_other_fields_at_defaults() {
        let defaults = GenDefaults::default();
        let params = GenParams {
            temperature: Some(1.3),
            ..GenParams::default()
        };
        let resolved = params.resolve(&defaults);
        assert_eq!(resolved.temperature, 1.3);
        assert_eq!(resolved.top_p, defaults.top_p);
        assert_eq!(resolved.top_k, defaults.top_k);
        assert_eq!(resolved.presence_penalty, defaults.presence_penalty);
        assert_eq!(resolved.frequency_penalty, defaults.frequency_penalty);
        assert_eq!(resolved.max_new_tokens, defaults.max_new_tokens);
    }

    #[test]
    fn merge_prefers_fields_from_other() {
        let mut base = GenParams {
            temperature: Some(0.5),
            top_p: Some(0.8),
            ..GenParams::default()
        };
        base.merge(&GenParams {
            temperature: Some(1.0),
            ..GenParams::default()
        });
        assert_eq!(base.temperature, Some(1.0));
        assert_eq!(base.top_p, Some(0.8));
    }
}
