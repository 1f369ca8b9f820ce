// Deterministic stand-ins for the model boundaries

use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::database::{ChunkMetadata, IndexedRecord};
use crate::embeddings::Embedder;
use crate::generation::LanguageModel;
use crate::{RagError, Result};

/// Embeds text by folding its bytes into a fixed number of buckets
#[derive(Debug)]
pub(crate) struct HashEmbedder {
    pub dimension: usize,
}

impl HashEmbedder {
    pub(crate) fn new(dimension: usize) -> Self {
        Self { dimension }
    }
}

impl Embedder for HashEmbedder {
    fn encode(&self, text: &str) -> Result<Vec<f32>> {
        let mut vector = vec![0.0_f32; self.dimension];
        for (i, byte) in text.bytes().enumerate() {
            vector[(i + byte as usize) % self.dimension] += f32::from(byte) / 255.0;
        }
        Ok(vector)
    }
}

/// Records every text it is asked to embed
#[derive(Debug, Default)]
pub(crate) struct RecordingEmbedder {
    pub inputs: Mutex<Vec<String>>,
    pub batch_calls: AtomicUsize,
    pub dimension: usize,
}

impl RecordingEmbedder {
    pub(crate) fn new(dimension: usize) -> Self {
        Self {
            dimension,
            ..Self::default()
        }
    }

    pub(crate) fn inputs(&self) -> Vec<String> {
        self.inputs.lock().expect("lock is not poisoned").clone()
    }
}

impl Embedder for RecordingEmbedder {
    fn encode(&self, text: &str) -> Result<Vec<f32>> {
        self.inputs
            .lock()
            .expect("lock is not poisoned")
            .push(text.to_string());
        HashEmbedder::new(self.dimension).encode(text)
    }

    fn encode_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        self.batch_calls.fetch_add(1, Ordering::SeqCst);
        texts.iter().map(|text| self.encode(text)).collect()
    }
}

/// Replies with queued answers, repeating the last one once the queue runs dry
#[derive(Debug, Default)]
pub(crate) struct ScriptedModel {
    answers: Mutex<VecDeque<String>>,
    last: Mutex<String>,
    pub prompts: Mutex<Vec<String>>,
    pub calls: AtomicUsize,
}

impl ScriptedModel {
    pub(crate) fn new<I, S>(answers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            answers: Mutex::new(answers.into_iter().map(Into::into).collect()),
            ..Self::default()
        }
    }

    pub(crate) fn always(answer: &str) -> Self {
        Self::new([answer])
    }

    pub(crate) fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub(crate) fn prompts(&self) -> Vec<String> {
        self.prompts.lock().expect("lock is not poisoned").clone()
    }
}

impl LanguageModel for ScriptedModel {
    fn generate(&self, prompt: &str) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.prompts
            .lock()
            .expect("lock is not poisoned")
            .push(prompt.to_string());

        let mut last = self.last.lock().expect("lock is not poisoned");
        if let Some(next) = self.answers.lock().expect("lock is not poisoned").pop_front() {
            *last = next;
        }
        Ok(last.clone())
    }
}

/// Fails every call the way an unreachable model server would
#[derive(Debug, Default)]
pub(crate) struct FailingModel {
    pub calls: AtomicUsize,
}

impl LanguageModel for FailingModel {
    fn generate(&self, _prompt: &str) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(RagError::ModelInvocation(
            "connection refused".to_string(),
        ))
    }
}

/// A record for `filename` chunk `index` with the given embedding
pub(crate) fn record(filename: &str, index: usize, embedding: Vec<f32>) -> IndexedRecord {
    IndexedRecord {
        id: IndexedRecord::record_id(filename, index),
        embedding,
        document: format!("{filename} chunk {index}"),
        metadata: ChunkMetadata {
            filename: filename.to_string(),
            filepath: format!("/repo/{filename}"),
            chunk_index: index as u64,
            language: crate::ingest::language_for(filename),
            start_line: index as u64 * 10,
            end_line: index as u64 * 10 + 9,
        },
    }
}
