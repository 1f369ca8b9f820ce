
use fancy_regex::Regex;
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::{LanguageModel, build_prompt};
use crate::Result;
use crate::config::CorrectionConfig;
use crate::config::settings::{DEFAULT_FALLBACK_ANSWER, DEFAULT_LOW_CONFIDENCE_PHRASES};

/// Where an answer stands in the correction loop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    Generating,
    Evaluating,
    Accepted,
    Retrying,
    Exhausted,
}

/// Produces the prompt for an attempt. Attempt 0 is the first call.
pub trait RetryStrategy: Send + Sync {
    fn prompt(&self, attempt: u32, question: &str, context: &str) -> String;
}

impl<F> RetryStrategy for F
where
    F: Fn(u32, &str, &str) -> String + Send + Sync,
{
    fn prompt(&self, attempt: u32, question: &str, context: &str) -> String {
        self(attempt, question, context)
    }
}

/// Sends the same templated prompt on every attempt
#[derive(Debug, Clone, Copy, Default)]
pub struct IdenticalPrompt;

impl RetryStrategy for IdenticalPrompt {
    fn prompt(&self, _attempt: u32, question: &str, context: &str) -> String {
        build_prompt(context, question)
    }
}

/// Decides whether an answer signals low confidence
#[derive(Debug, Clone)]
pub struct ConfidenceCheck {
    phrases: Vec<String>,
    patterns: Vec<Regex>,
}

impl Default for ConfidenceCheck {
    fn default() -> Self {
        Self::from_phrases(DEFAULT_LOW_CONFIDENCE_PHRASES.iter().copied())
    }
}

impl ConfidenceCheck {
    #[inline]
    pub fn from_phrases<I, S>(phrases: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            phrases: phrases
                .into_iter()
                .map(|p| p.as_ref().to_lowercase())
                .filter(|p| !p.is_empty())
                .collect(),
            patterns: Vec::new(),
        }
    }

    /// Patterns that fail to compile are dropped with a warning
    #[inline]
    pub fn with_patterns<I, S>(mut self, patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for pattern in patterns {
            match Regex::new(pattern.as_ref()) {
                Ok(regex) => self.patterns.push(regex),
                Err(e) => warn!("Ignoring invalid pattern '{}': {}", pattern.as_ref(), e),
            }
        }
        self
    }

    #[inline]
    pub fn from_config(config: &CorrectionConfig) -> Self {
        Self::from_phrases(&config.low_confidence_phrases)
            .with_patterns(&config.low_confidence_patterns)
    }

    #[inline]
    pub fn is_low_confidence(&self, answer: &str) -> bool {
        let lowered = answer.to_lowercase();
        if let Some(phrase) = self.phrases.iter().find(|p| lowered.contains(p.as_str())) {
            debug!("Answer matched low-confidence phrase '{}'", phrase);
            return true;
        }

        self.patterns.iter().any(|regex| match regex.is_match(answer) {
            Ok(matched) => matched,
            Err(e) => {
                warn!("Pattern '{}' failed to evaluate: {}", regex.as_str(), e);
                false
            }
        })
    }
}

/// Result of running the loop for one question
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CorrectionOutcome {
    pub answer: String,
    /// `Accepted` or `Exhausted`
    pub state: LoopState,
    pub retry_count: u32,
    pub invocations: u32,
}

/// Bounded retry loop around a language model.
///
/// Each attempt asks the [`RetryStrategy`] for a prompt, calls the model and
/// trims the reply. A reply that trips the [`ConfidenceCheck`] is retried
/// until `max_retries` retries have been spent, after which the fallback
/// answer is returned. Model errors are returned as soon as they occur.
pub struct CorrectionLoop {
    model: Arc<dyn LanguageModel>,
    check: ConfidenceCheck,
    strategy: Box<dyn RetryStrategy>,
    max_retries: u32,
    fallback_answer: String,
}

impl std::fmt::Debug for CorrectionLoop {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CorrectionLoop")
            .field("check", &self.check)
            .field("max_retries", &self.max_retries)
            .field("fallback_answer", &self.fallback_answer)
            .finish_non_exhaustive()
    }
}

impl CorrectionLoop {
    #[inline]
    pub fn new(model: Arc<dyn LanguageModel>) -> Self {
        Self {
            model,
            check: ConfidenceCheck::default(),
            strategy: Box::new(IdenticalPrompt),
            max_retries: 2,
            fallback_answer: DEFAULT_FALLBACK_ANSWER.to_string(),
        }
    }

    #[inline]
    pub fn from_config(model: Arc<dyn LanguageModel>, config: &CorrectionConfig) -> Self {
        Self::new(model)
            .with_check(ConfidenceCheck::from_config(config))
            .with_max_retries(config.max_retries)
            .with_fallback_answer(config.fallback_answer.clone())
    }

    #[inline]
    pub fn with_check(mut self, check: ConfidenceCheck) -> Self {
        self.check = check;
        self
    }

    #[inline]
    pub fn with_strategy(mut self, strategy: impl RetryStrategy + 'static) -> Self {
        self.strategy = Box::new(strategy);
        self
    }

    #[inline]
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    #[inline]
    pub fn with_fallback_answer(mut self, fallback_answer: String) -> Self {
        self.fallback_answer = fallback_answer;
        self
    }

    #[inline]
    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    /// Where an evaluated answer sends the loop next
    #[inline]
    pub fn next_state(&self, answer: &str, retry_count: u32) -> LoopState {
        if !self.check.is_low_confidence(answer) {
            LoopState::Accepted
        } else if retry_count < self.max_retries {
            LoopState::Retrying
        } else {
            LoopState::Exhausted
        }
    }

    /// Drive the loop from `Generating` until it is `Accepted` or `Exhausted`
    #[inline]
    pub fn run(&self, question: &str, context: &str) -> Result<CorrectionOutcome> {
        let mut state = LoopState::Generating;
        let mut answer = String::new();
        let mut retry_count = 0;
        let mut invocations = 0;

        loop {
            state = match state {
                LoopState::Generating => {
                    let prompt = self.strategy.prompt(retry_count, question, context);
                    debug!(
                        "Generating answer (attempt {}/{})",
                        retry_count + 1,
                        self.max_retries + 1
                    );
                    invocations += 1;
                    answer = self.model.generate(&prompt)?.trim().to_string();
                    LoopState::Evaluating
                }
                LoopState::Evaluating => self.next_state(&answer, retry_count),
                LoopState::Retrying => {
                    retry_count += 1;
                    info!(
                        "Low-confidence answer, retrying ({}/{})",
                        retry_count, self.max_retries
                    );
                    LoopState::Generating
                }
                LoopState::Accepted => {
                    info!("Answer accepted after {} retries", retry_count);
                    return Ok(CorrectionOutcome {
                        answer,
                        state,
                        retry_count,
                        invocations,
                    });
                }
                LoopState::Exhausted => {
                    warn!(
                        "Still low confidence after {} retries, returning fallback",
                        retry_count
                    );
                    return Ok(CorrectionOutcome {
                        answer: self.fallback_answer.clone(),
                        state,
                        retry_count,
                        invocations,
                    });
                }
            };
        }
    }
}
