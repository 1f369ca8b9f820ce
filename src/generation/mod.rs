// Answer generation: the language model boundary and the correction loop

pub mod correction;
pub mod gemini;


pub use correction::{
    ConfidenceCheck, CorrectionLoop, CorrectionOutcome, IdenticalPrompt, LoopState, RetryStrategy,
};
pub use gemini::GeminiClient;

use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use crate::Result;
use crate::config::{Config, GenerationProvider};
use crate::ollama::OllamaClient;

/// An opaque prompt to text function
pub trait LanguageModel: Send + Sync {
    fn generate(&self, prompt: &str) -> Result<String>;
}

pub const PROMPT_TEMPLATE: &str = "You are a helpful code assistant. Answer the question based ONLY on the context below.
If the context is insufficient or irrelevant, say \"I cannot answer confidently based on available context.\"

Context:
{context}

Question: {question}

Answer:";

/// Fill [`PROMPT_TEMPLATE`] with the context and question verbatim
#[inline]
pub fn build_prompt(context: &str, question: &str) -> String {
    // The template's `{context}` precedes the question, so neither insert is re-expanded
    PROMPT_TEMPLATE
        .replacen("{question}", question, 1)
        .replacen("{context}", context, 1)
}

/// Construct the language model selected by `[generation]`
#[inline]
pub fn build_language_model(config: &Config) -> Result<Arc<dyn LanguageModel>> {
    let generation = &config.generation;
    let timeout = Duration::from_secs(generation.timeout_seconds);

    match generation.provider {
        GenerationProvider::Ollama => {
            info!("Using Ollama model {} for answers", generation.model);
            let client = OllamaClient::new(&config.ollama)?
                .with_timeout(timeout)
                .with_generation_model(generation.model.clone());
            Ok(Arc::new(client))
        }
        GenerationProvider::Gemini => {
            info!("Using Gemini model {} for answers", generation.model);
            Ok(Arc::new(GeminiClient::from_config(generation)?))
        }
    }
}
