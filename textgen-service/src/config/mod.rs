use service_core::config::{self as core_config, get_env, get_optional_env};
use service_core::error::AppError;
use std::path::PathBuf;

/// Hugging Face model served when `TEXTGEN_MODEL_ID` is not set.
pub const DEFAULT_MODEL_ID: &str = "google/flan-t5-small";

/// Default generation length of the FLAN-T5 checkpoints.
const DEFAULT_MAX_NEW_TOKENS: usize = 20;

const DEFAULT_MAX_QUEUE_DEPTH: usize = 64;

#[derive(Debug, Clone)]
pub struct TextgenConfig {
    pub common: core_config::Config,
    pub model: ModelSettings,
    pub inference: InferenceSettings,
}

#[derive(Debug, Clone)]
pub struct ModelSettings {
    /// Hub repository id, e.g. `google/flan-t5-small`.
    pub model_id: String,
    pub revision: String,
    /// Load `config.json`, `tokenizer.json` and `model.safetensors` from this
    /// directory instead of the hub.
    pub model_dir: Option<PathBuf>,
    /// Upper bound on generated tokens, not counting the decoder start token.
    pub max_new_tokens: usize,
    pub use_cpu: bool,
}

#[derive(Debug, Clone)]
pub struct InferenceSettings {
    /// Generation calls allowed to run at once.
    pub max_concurrency: usize,
    /// Requests allowed to wait for a slot before new ones are rejected.
    pub max_queue_depth: usize,
}

impl Default for ModelSettings {
    fn default() -> Self {
        Self {
            model_id: DEFAULT_MODEL_ID.to_string(),
            revision: "main".to_string(),
            model_dir: None,
            max_new_tokens: DEFAULT_MAX_NEW_TOKENS,
            use_cpu: true,
        }
    }
}

impl Default for InferenceSettings {
    fn default() -> Self {
        Self {
            max_concurrency: default_concurrency(),
            max_queue_depth: DEFAULT_MAX_QUEUE_DEPTH,
        }
    }
}

fn default_concurrency() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}

impl TextgenConfig {
    pub fn load() -> Result<Self, AppError> {
        let common_config = core_config::Config::load()?;
        let is_prod = core_config::is_prod();

        Ok(TextgenConfig {
            common: common_config,
            model: ModelSettings {
                model_id: get_env("TEXTGEN_MODEL_ID", Some(DEFAULT_MODEL_ID), is_prod)?,
                revision: get_env("TEXTGEN_MODEL_REVISION", Some("main"), is_prod)?,
                model_dir: get_optional_env("TEXTGEN_MODEL_DIR").map(PathBuf::from),
                max_new_tokens: parse_env(
                    "TEXTGEN_MAX_NEW_TOKENS",
                    DEFAULT_MAX_NEW_TOKENS,
                    is_prod,
                )?,
                use_cpu: parse_env("TEXTGEN_USE_CPU", true, is_prod)?,
            },
            inference: InferenceSettings {
                max_concurrency: parse_env(
                    "TEXTGEN_MAX_CONCURRENCY",
                    default_concurrency(),
                    is_prod,
                )?
                .max(1),
                max_queue_depth: parse_env(
                    "TEXTGEN_MAX_QUEUE_DEPTH",
                    DEFAULT_MAX_QUEUE_DEPTH,
                    is_prod,
                )?,
            },
        })
    }

    /// Configuration for tests: random port, default model settings.
    pub fn for_tests() -> Self {
        let mut common = core_config::Config::default();
        common.port = 0;

        Self {
            common,
            model: ModelSettings::default(),
            inference: InferenceSettings::default(),
        }
    }
}

fn parse_env<T>(key: &str, default: T, is_prod: bool) -> Result<T, AppError>
where
    T: std::str::FromStr + ToString,
    T::Err: std::fmt::Display,
{
    let raw = get_env(key, Some(&default.to_string()), is_prod)?;
    raw.trim().parse().map_err(|e: T::Err| {
        AppError::ConfigError(anyhow::anyhow!("{} has invalid value '{}': {}", key, raw, e))
    })
}
