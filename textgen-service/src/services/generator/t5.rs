//! FLAN-T5 (and other T5 checkpoints) via candle.

use super::{GenerationError, TextGenerator};
use crate::config::ModelSettings;
use candle_core::{DType, Device, Tensor};
use candle_nn::VarBuilder;
use candle_transformers::generation::LogitsProcessor;
use candle_transformers::models::t5;
use hf_hub::api::sync::ApiBuilder;
use hf_hub::{Repo, RepoType};
use std::path::{Path, PathBuf};
use std::time::Instant;
use tokenizers::Tokenizer;

const CONFIG_FILE: &str = "config.json";
const TOKENIZER_FILE: &str = "tokenizer.json";
const WEIGHTS_FILE: &str = "model.safetensors";

struct ModelFiles {
    config: PathBuf,
    tokenizer: PathBuf,
    weights: PathBuf,
}

/// A T5 encoder-decoder with its tokenizer, loaded once for the process.
pub struct T5Generator {
    model_id: String,
    model: t5::T5ForConditionalGeneration,
    config: t5::Config,
    tokenizer: Tokenizer,
    device: Device,
    max_new_tokens: usize,
}

impl T5Generator {
    /// Resolve, download if needed, and load the configured model.
    ///
    /// Blocks on network and disk I/O.
    pub fn load(settings: &ModelSettings) -> Result<Self, GenerationError> {
        let started = Instant::now();

        let files = match &settings.model_dir {
            Some(dir) => local_files(dir)?,
            None => hub_files(&settings.model_id, &settings.revision)?,
        };

        let device = if settings.use_cpu {
            Device::Cpu
        } else {
            Device::cuda_if_available(0)
                .map_err(|e| GenerationError::ModelLoad(format!("selecting device: {}", e)))?
        };

        let raw_config = std::fs::read_to_string(&files.config).map_err(|e| {
            GenerationError::ModelLoad(format!("reading {}: {}", files.config.display(), e))
        })?;
        let config: t5::Config = serde_json::from_str(&raw_config)
            .map_err(|e| GenerationError::ModelLoad(format!("parsing {}: {}", CONFIG_FILE, e)))?;

        let tokenizer = Tokenizer::from_file(&files.tokenizer)
            .map_err(|e| GenerationError::ModelLoad(format!("loading tokenizer: {}", e)))?;

        // SAFETY: the weights file is not modified while mapped.
        let vb = unsafe {
            VarBuilder::from_mmaped_safetensors(&[files.weights.as_path()], DType::F32, &device)
        }
        .map_err(|e| GenerationError::ModelLoad(format!("mapping weights: {}", e)))?;

        let model = t5::T5ForConditionalGeneration::load(vb, &config)
            .map_err(|e| GenerationError::ModelLoad(format!("building model: {}", e)))?;

        tracing::info!(
            model_id = %settings.model_id,
            device = ?device,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Loaded T5 model"
        );

        Ok(Self {
            model_id: settings.model_id.clone(),
            model,
            config,
            tokenizer,
            device,
            max_new_tokens: settings.max_new_tokens,
        })
    }

    fn decoder_start_token(&self) -> u32 {
        self.config
            .decoder_start_token_id
            .unwrap_or(self.config.pad_token_id) as u32
    }
}

impl TextGenerator for T5Generator {
    fn generate(&self, text: &str) -> Result<String, GenerationError> {
        let encoding = self
            .tokenizer
            .encode(text, true)
            .map_err(|e| GenerationError::Tokenizer(e.to_string()))?;
        let input_ids = Tensor::new(encoding.get_ids(), &self.device)?.unsqueeze(0)?;

        // Weights are reference counted; the clone only owns a fresh KV cache.
        let mut model = self.model.clone();
        model.clear_kv_cache();

        let encoder_output = model.encode(&input_ids)?;

        // Greedy decoding.
        let mut logits_processor = LogitsProcessor::new(0, None, None);
        let mut output_ids = vec![self.decoder_start_token()];

        for step in 0..self.max_new_tokens {
            let decoder_ids = if step == 0 || !self.config.use_cache {
                Tensor::new(output_ids.as_slice(), &self.device)?.unsqueeze(0)?
            } else {
                let last = output_ids[output_ids.len() - 1];
                Tensor::new(&[last], &self.device)?.unsqueeze(0)?
            };

            let logits = model.decode(&decoder_ids, &encoder_output)?.squeeze(0)?;
            let next = logits_processor.sample(&logits)?;
            if next as usize == self.config.eos_token_id {
                break;
            }
            output_ids.push(next);
        }

        self.tokenizer
            .decode(&output_ids[1..], true)
            .map_err(|e| GenerationError::Tokenizer(e.to_string()))
    }

    fn model_id(&self) -> &str {
        &self.model_id
    }
}

fn hub_files(model_id: &str, revision: &str) -> Result<ModelFiles, GenerationError> {
    let api = ApiBuilder::new()
        .with_progress(false)
        .build()
        .map_err(|e| GenerationError::ModelLoad(format!("hub client: {}", e)))?;
    let repo = api.repo(Repo::with_revision(
        model_id.to_string(),
        RepoType::Model,
        revision.to_string(),
    ));

    let fetch = |name: &str| {
        repo.get(name)
            .map_err(|e| GenerationError::ModelLoad(format!("fetching {}/{}: {}", model_id, name, e)))
    };

    Ok(ModelFiles {
        config: fetch(CONFIG_FILE)?,
        tokenizer: fetch(TOKENIZER_FILE)?,
        weights: fetch(WEIGHTS_FILE)?,
    })
}

fn local_files(dir: &Path) -> Result<ModelFiles, GenerationError> {
    let file = |name: &str| {
        let path = dir.join(name);
        if path.is_file() {
            Ok(path)
        } else {
            Err(GenerationError::ModelLoad(format!(
                "{} not found in {}",
                name,
                dir.display()
            )))
        }
    };

    Ok(ModelFiles {
        config: file(CONFIG_FILE)?,
        tokenizer: file(TOKENIZER_FILE)?,
        weights: file(WEIGHTS_FILE)?,
    })
}
