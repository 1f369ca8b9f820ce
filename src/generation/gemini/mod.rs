
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};
use url::Url;

use super::LanguageModel;
use crate::config::GenerationConfig;
use crate::http::{build_agent, model_error};
use crate::{RagError, Result};

/// Client for the Gemini `generateContent` endpoint
#[derive(Debug, Clone)]
pub struct GeminiClient {
    endpoint: Url,
    api_key: String,
    agent: ureq::Agent,
}

#[derive(Debug, Serialize)]
struct GenerateContentRequest<'a> {
    contents: Vec<Content<'a>>,
}

#[derive(Debug, Serialize)]
struct Content<'a> {
    parts: Vec<Part<'a>>,
}

#[derive(Debug, Serialize)]
struct Part<'a> {
    text: &'a str,
}

#[derive(Debug, Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Debug, Deserialize)]
struct CandidatePart {
    text: Option<String>,
}

impl GeminiClient {
    #[inline]
    pub fn new(base_url: &str, model: &str, api_key: String, timeout: Duration) -> Result<Self> {
        let endpoint = Url::parse(base_url)
            .and_then(|base| base.join(&format!("v1beta/models/{model}:generateContent")))
            .map_err(|e| RagError::Config(format!("Invalid Gemini URL {base_url}: {e}")))?;

        Ok(Self {
            endpoint,
            api_key,
            agent: build_agent(timeout),
        })
    }

    /// Build a client from `[generation]`, reading the key from the
    /// configured environment variable.
    #[inline]
    pub fn from_config(config: &GenerationConfig) -> Result<Self> {
        let api_key = std::env::var(&config.api_key_env)
            .ok()
            .filter(|key| !key.trim().is_empty())
            .ok_or_else(|| {
                RagError::Config(format!(
                    "Gemini API key not found. Set the {} environment variable",
                    config.api_key_env
                ))
            })?;

        Self::new(
            &config.gemini_base_url,
            &config.model,
            api_key,
            Duration::from_secs(config.timeout_seconds),
        )
    }

    #[inline]
    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }
}

impl LanguageModel for GeminiClient {
    fn generate(&self, prompt: &str) -> Result<String> {
        let request = GenerateContentRequest {
            contents: vec![Content {
                parts: vec![Part { text: prompt }],
            }],
        };
        let request_json = serde_json::to_string(&request)
            .map_err(|e| RagError::Other(anyhow::anyhow!("Failed to serialize request: {e}")))?;

        debug!("Sending prompt to {} (length: {})", self.endpoint, prompt.len());

        let response_text = self
            .agent
            .post(self.endpoint.as_str())
            .header("Content-Type", "application/json")
            .header("x-goog-api-key", &self.api_key)
            .send(&request_json)
            .and_then(|mut resp| resp.body_mut().read_to_string())
            .map_err(|e| {
                warn!("Gemini request failed: {}", e);
                model_error(&e, "Gemini request")
            })?;

        let response: GenerateContentResponse = serde_json::from_str(&response_text)
            .map_err(|e| RagError::ModelInvocation(format!("Invalid Gemini response: {}", e)))?;

        let text: String = response
            .candidates
            .into_iter()
            .next()
            .and_then(|candidate| candidate.content)
            .map(|content| {
                content
                    .parts
                    .into_iter()
                    .filter_map(|part| part.text)
                    .collect()
            })
            .ok_or_else(|| {
                RagError::ModelInvocation("Gemini returned no candidates".to_string())
            })?;

        if text.trim().is_empty() {
            return Err(RagError::ModelInvocation(
                "Gemini returned an empty answer".to_string(),
            ));
        }

        Ok(text)
    }
}
