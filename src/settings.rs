use serde::{Deserialize, Serialize};

pub const DEFAULT_MODEL: &str = "deepseek-r1-qwen-7b";
pub const DEFAULT_TEMPERATURE: f32 = 0.6;
pub const DEFAULT_MAX_TOKENS: u32 = 300;
pub const DEFAULT_CONTEXT_COLUMNS: usize = 5;
pub const DEFAULT_HISTORY_WINDOW: usize = 6;

const TEMPERATURE_MIN: f32 = 0.0;
const TEMPERATURE_MAX: f32 = 1.0;
const MAX_TOKENS_MIN: u32 = 50;
const MAX_TOKENS_MAX: u32 = 1500;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Default)]
pub struct GenerationParams {
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
}

/// Caps on how much of the dataset and history is folded into a prompt.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct PromptLimits {
    pub context_columns: Option<usize>,
    pub history_window: Option<usize>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct SessionSettings {
    pub default_model: Option<String>,
    pub generation: Option<GenerationParams>,
    pub prompt_limits: Option<PromptLimits>,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct SessionSettingsPatch {
    pub default_model: Option<String>,
    pub generation: Option<GenerationParams>,
    pub prompt_limits: Option<PromptLimits>,
}

impl SessionSettings {
    pub fn apply_patch(&mut self, patch: SessionSettingsPatch) {
        if let Some(model) = patch.default_model {
            self.default_model = Some(model);
        }
        if let Some(r#gen) = patch.generation {
            let current = self.generation.get_or_insert_with(Default::default);
            if let Some(t) = r#gen.temperature {
                current.temperature = Some(t);
            }
            if let Some(m) = r#gen.max_tokens {
                current.max_tokens = Some(m);
            }
        }
        if let Some(limits) = patch.prompt_limits {
            let current = self.prompt_limits.get_or_insert_with(Default::default);
            if let Some(c) = limits.context_columns {
                current.context_columns = Some(c);
            }
            if let Some(h) = limits.history_window {
                current.history_window = Some(h);
            }
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct GlobalConfigDefaults {
    pub default_model: Option<String>,
    pub generation: Option<GenerationParams>,
    pub prompt_limits: Option<PromptLimits>,
}

#[derive(Debug, Clone, Deserialize, PartialEq, Default)]
pub struct RequestOverrides {
    pub model: Option<String>,
    pub generation: Option<GenerationParams>,
    pub prompt_limits: Option<PromptLimits>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EffectiveSettings {
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
    pub context_columns: usize,
    pub history_window: usize,
}

/// Request overrides win over session settings, which win over global
/// defaults. Temperature and max_tokens are clamped to their valid ranges.
pub fn resolve_effective_settings(
    global: &GlobalConfigDefaults,
    session: &SessionSettings,
    request: &RequestOverrides,
) -> EffectiveSettings {
    let model = request
        .model
        .clone()
        .or_else(|| session.default_model.clone())
        .or_else(|| global.default_model.clone())
        .unwrap_or_else(|| DEFAULT_MODEL.to_string());

    let temperature = request
        .generation
        .as_ref()
        .and_then(|g| g.temperature)
        .or_else(|| session.generation.as_ref().and_then(|g| g.temperature))
        .or_else(|| global.generation.as_ref().and_then(|g| g.temperature))
        .unwrap_or(DEFAULT_TEMPERATURE)
        .clamp(TEMPERATURE_MIN, TEMPERATURE_MAX);

    let max_tokens = request
        .generation
        .as_ref()
        .and_then(|g| g.max_tokens)
        .or_else(|| session.generation.as_ref().and_then(|g| g.max_tokens))
        .or_else(|| global.generation.as_ref().and_then(|g| g.max_tokens))
        .unwrap_or(DEFAULT_MAX_TOKENS)
        .clamp(MAX_TOKENS_MIN, MAX_TOKENS_MAX);

    let context_columns = request
        .prompt_limits
        .as_ref()
        .and_then(|p| p.context_columns)
        .or_else(|| session.prompt_limits.as_ref().and_then(|p| p.context_columns))
        .or_else(|| global.prompt_limits.as_ref().and_then(|p| p.context_columns))
        .unwrap_or(DEFAULT_CONTEXT_COLUMNS);

    let history_window = request
        .prompt_limits
        .as_ref()
        .and_then(|p| p.history_window)
        .or_else(|| session.prompt_limits.as_ref().and_then(|p| p.history_window))
        .or_else(|| global.prompt_limits.as_ref().and_then(|p| p.history_window))
        .unwrap_or(DEFAULT_HISTORY_WINDOW);

    EffectiveSettings { model, temperature, max_tokens, context_columns, history_window }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn precedence_request_over_session_over_global() {
        let global = GlobalConfigDefaults {
            default_model: Some("global-model".into()),
            generation: Some(GenerationParams {
                temperature: Some(0.1),
                max_tokens: Some(1000),
            }),
            prompt_limits: Some(PromptLimits {
                context_columns: Some(4),
                history_window: Some(10),
            }),
        };

        let session = SessionSettings {
            default_model: Some("session-model".into()),
            generation: Some(GenerationParams { temperature: Some(0.2), max_tokens: None }),
            prompt_limits: Some(PromptLimits { context_columns: None, history_window: Some(8) }),
        };

        let request = RequestOverrides {
            model: Some("request-model".into()),
            generation: Some(GenerationParams { temperature: None, max_tokens: Some(400) }),
            prompt_limits: None,
        };

        let eff = resolve_effective_settings(&global, &session, &request);

        assert_eq!(eff.model, "request-model");
        assert_eq!(eff.temperature, 0.2); // from session
        assert_eq!(eff.max_tokens, 400); // from request
        assert_eq!(eff.context_columns, 4); // from global
        assert_eq!(eff.history_window, 8); // from session
    }

    #[test]
    fn defaults_apply_when_nothing_is_set() {
        let eff = resolve_effective_settings(
            &GlobalConfigDefaults::default(),
            &SessionSettings::default(),
            &RequestOverrides::default(),
        );
        assert_eq!(eff.model, DEFAULT_MODEL);
        assert_eq!(eff.temperature, DEFAULT_TEMPERATURE);
        assert_eq!(eff.max_tokens, DEFAULT_MAX_TOKENS);
        assert_eq!(eff.context_columns, DEFAULT_CONTEXT_COLUMNS);
        assert_eq!(eff.history_window, DEFAULT_HISTORY_WINDOW);
    }

    #[test]
    fn generation_params_are_clamped() {
        let request = RequestOverrides {
            model: None,
            generation: Some(GenerationParams { temperature: Some(2.5), max_tokens: Some(10) }),
            prompt_limits: None,
        };
        let eff = resolve_effective_settings(
            &GlobalConfigDefaults::default(),
            &SessionSettings::default(),
            &request,
        );
        assert_eq!(eff.temperature, 1.0);
        assert_eq!(eff.max_tokens, 50);
    }

    #[test]
    fn patch_merges_field_wise() {
        let mut settings = SessionSettings {
            default_model: Some("m1".into()),
            generation: Some(GenerationParams { temperature: Some(0.3), max_tokens: Some(100) }),
            prompt_limits: None,
        };
        settings.apply_patch(SessionSettingsPatch {
            default_model: None,
            generation: Some(GenerationParams { temperature: None, max_tokens: Some(500) }),
            prompt_limits: Some(PromptLimits { context_columns: Some(3), history_window: None }),
        });
        assert_eq!(settings.default_model.as_deref(), Some("m1"));
        let r#gen = settings.generation.unwrap();
        assert_eq!(r#gen.temperature, Some(0.3));
        assert_eq!(r#gen.max_tokens, Some(500));
        assert_eq!(settings.prompt_limits.unwrap().context_columns, Some(3));
    }
}
