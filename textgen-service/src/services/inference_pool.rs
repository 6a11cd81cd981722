//! Bounded execution of blocking generation calls.
//!
//! At most `max_concurrency` calls run at once on Tokio's blocking pool and at
//! most `max_queue_depth` more wait for a slot. Anything beyond that is
//! rejected up front with 503 so the accept loop never piles up work.

use crate::services::generator::{GenerationError, TextGenerator};
use metrics::{counter, gauge, histogram};
use service_core::error::AppError;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;

/// Seconds a rejected client is told to wait before retrying.
const RETRY_AFTER_SECS: u64 = 1;

pub const IN_FLIGHT_GAUGE: &str = "textgen_inference_in_flight";

#[derive(Clone)]
pub struct InferencePool {
    generator: Arc<dyn TextGenerator>,
    permits: Arc<Semaphore>,
    admitted: Arc<AtomicUsize>,
    max_concurrency: usize,
    capacity: usize,
}

/// Releases an admission slot on drop.
struct Admission {
    admitted: Arc<AtomicUsize>,
}

impl Drop for Admission {
    fn drop(&mut self) {
        self.admitted.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Tracks one running call in the in-flight gauge, including on unwind.
struct InFlight;

impl InFlight {
    fn enter() -> Self {
        gauge!(IN_FLIGHT_GAUGE).increment(1.0);
        InFlight
    }
}

impl Drop for InFlight {
    fn drop(&mut self) {
        gauge!(IN_FLIGHT_GAUGE).decrement(1.0);
    }
}

type CallResult = std::thread::Result<Result<String, GenerationError>>;

impl InferencePool {
    pub fn new(
        generator: Arc<dyn TextGenerator>,
        max_concurrency: usize,
        max_queue_depth: usize,
    ) -> Self {
        let max_concurrency = max_concurrency.max(1);
        Self {
            generator,
            permits: Arc::new(Semaphore::new(max_concurrency)),
            admitted: Arc::new(AtomicUsize::new(0)),
            max_concurrency,
            capacity: max_concurrency + max_queue_depth,
        }
    }

    pub fn model_id(&self) -> &str {
        self.generator.model_id()
    }

    /// Calls currently executing on the blocking pool.
    pub fn in_flight(&self) -> usize {
        self.max_concurrency - self.permits.available_permits()
    }

    /// Calls executing plus calls waiting for a slot.
    pub fn admitted(&self) -> usize {
        self.admitted.load(Ordering::SeqCst)
    }

    fn admit(&self) -> Result<Admission, AppError> {
        let capacity = self.capacity;
        self.admitted
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| {
                (n < capacity).then_some(n + 1)
            })
            .map_err(|current| {
                counter!("textgen_requests_rejected_total").increment(1);
                tracing::warn!(admitted = current, capacity, "Inference queue full");
                AppError::ServiceUnavailable(Some(RETRY_AFTER_SECS))
            })?;

        Ok(Admission {
            admitted: self.admitted.clone(),
        })
    }

    /// Run one generation call.
    ///
    /// Failures and panics inside the generator surface as
    /// `AppError::InternalError`; the shared generator stays usable. Nothing is
    /// retried.
    pub async fn generate(&self, text: String) -> Result<String, AppError> {
        let admission = self.admit()?;

        let permit = self
            .permits
            .clone()
            .acquire_owned()
            .await
            .map_err(|e| AppError::InternalError(anyhow::Error::new(e)))?;

        let generator = self.generator.clone();

        // Everything that must happen once per call lives in the blocking task:
        // the request future may be dropped on disconnect, the task is not.
        let result = tokio::task::spawn_blocking(move || {
            let _admission = admission;
            let _permit = permit;
            let _in_flight = InFlight::enter();

            let started = Instant::now();
            let outcome: CallResult =
                panic::catch_unwind(AssertUnwindSafe(|| generator.generate(&text)));
            record_outcome(
                generator.model_id(),
                text.chars().count(),
                started.elapsed(),
                &outcome,
            );
            outcome
        })
        .await;

        match result {
            Ok(Ok(Ok(output))) => Ok(output),
            Ok(Ok(Err(e))) => Err(AppError::InternalError(anyhow::Error::new(e))),
            Ok(Err(_)) => Err(AppError::InternalError(anyhow::anyhow!(
                "generation panicked"
            ))),
            Err(join_error) => Err(AppError::InternalError(anyhow::anyhow!(
                "generation task aborted: {}",
                join_error
            ))),
        }
    }
}

fn record_outcome(model_id: &str, input_chars: usize, elapsed: Duration, outcome: &CallResult) {
    histogram!("textgen_inference_duration_seconds").record(elapsed.as_secs_f64());
    let elapsed_ms = elapsed.as_millis() as u64;

    match outcome {
        Ok(Ok(output)) => {
            counter!("textgen_inference_total", "outcome" => "ok").increment(1);
            tracing::info!(
                model_id,
                input_chars,
                output_chars = output.chars().count(),
                elapsed_ms,
                "Generation completed"
            );
        }
        // Logged at warn; the 500 response logs the error itself.
        Ok(Err(e)) => {
            counter!("textgen_inference_total", "outcome" => "error").increment(1);
            tracing::warn!(model_id, input_chars, error = %e, elapsed_ms, "Generation failed");
        }
        Err(_) => {
            counter!("textgen_inference_total", "outcome" => "panic").increment(1);
            tracing::warn!(model_id, input_chars, elapsed_ms, "Generation panicked");
        }
    }
}
