//! Text generator abstractions and implementations.
//!
//! The HTTP layer only sees [`TextGenerator`]; the real T5 model and the
//! mock used in tests both sit behind it.

pub mod mock;
pub mod t5;

use thiserror::Error;

pub use mock::MockTextGenerator;
pub use t5::T5Generator;

/// Error type for generator operations.
#[derive(Error, Debug)]
pub enum GenerationError {
    #[error("Model load failed: {0}")]
    ModelLoad(String),

    #[error("Tokenizer error: {0}")]
    Tokenizer(String),

    #[error("Inference failed: {0}")]
    Inference(String),
}

impl From<candle_core::Error> for GenerationError {
    fn from(err: candle_core::Error) -> Self {
        GenerationError::Inference(err.to_string())
    }
}

/// A loaded text-to-text model.
///
/// Implementations are immutable after construction and shared across
/// requests. `generate` blocks for the whole inference pass, so callers on an
/// async runtime must move it off the reactor (see `InferencePool`).
pub trait TextGenerator: Send + Sync {
    /// Run one generation pass with the model's fixed generation settings.
    fn generate(&self, text: &str) -> Result<String, GenerationError>;

    /// Identifier of the loaded model, for logs.
    fn model_id(&self) -> &str;
}
