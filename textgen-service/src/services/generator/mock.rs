//! Mock generator for testing.

use super::{GenerationError, TextGenerator};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Behavior {
    Echo,
    Fail,
    Panic,
}

/// Mock text generator for testing.
pub struct MockTextGenerator {
    behavior: Behavior,
    delay: Option<Duration>,
    calls: AtomicUsize,
}

impl MockTextGenerator {
    /// Answers every prompt with `Mock response for: <prompt>`.
    pub fn new() -> Self {
        Self {
            behavior: Behavior::Echo,
            delay: None,
            calls: AtomicUsize::new(0),
        }
    }

    /// Fails every call with an inference error.
    pub fn failing() -> Self {
        Self {
            behavior: Behavior::Fail,
            ..Self::new()
        }
    }

    /// Panics inside every call.
    pub fn panicking() -> Self {
        Self {
            behavior: Behavior::Panic,
            ..Self::new()
        }
    }

    /// Block for `delay` before answering, simulating a slow forward pass.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Number of times `generate` has been invoked.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Default for MockTextGenerator {
    fn default() -> Self {
        Self::new()
    }
}

impl TextGenerator for MockTextGenerator {
    fn generate(&self, text: &str) -> Result<String, GenerationError> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        if let Some(delay) = self.delay {
            std::thread::sleep(delay);
        }

        match self.behavior {
            Behavior::Echo => Ok(format!("Mock response for: {}", text)),
            Behavior::Fail => Err(GenerationError::Inference(
                "Mock generator configured to fail".to_string(),
            )),
            Behavior::Panic => panic!("Mock generator configured to panic"),
        }
    }

    fn model_id(&self) -> &str {
        "mock"
    }
}
