pub mod generator;
pub mod inference_pool;

pub use generator::{GenerationError, MockTextGenerator, T5Generator, TextGenerator};
pub use inference_pool::InferencePool;
