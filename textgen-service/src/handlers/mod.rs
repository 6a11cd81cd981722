//! HTTP handlers for the text generation service.

pub mod generate;

pub use generate::{generate, welcome};
