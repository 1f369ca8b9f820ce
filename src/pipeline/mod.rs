// End-to-end question answering over an ingested codebase


use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info};

use crate::config::{Config, IngestConfig};
use crate::database::{Database, VectorIndex, VectorStore};
use crate::embeddings::EmbeddingGateway;
use crate::generation::{CorrectionLoop, LanguageModel, build_language_model};
use crate::ingest::{IngestReport, IngestionPipeline};
use crate::ollama::OllamaClient;
use crate::retrieval::{INVALID_QUERY_MESSAGE, RetrievalOutcome, Retriever, format_context};
use crate::{RagError, Result};

const DEFAULT_TOP_K: usize = 3;

/// One question and everything produced while answering it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversationTurn {
    pub question: String,
    /// Formatted context handed to the model, empty for an invalid question
    pub context: String,
    pub answer: String,
    pub retry_count: u32,
}

/// The pieces every command needs: embeddings, vectors and the ledger
pub struct Components {
    pub gateway: EmbeddingGateway,
    pub store: Arc<dyn VectorIndex>,
    pub ledger: Database,
}

impl Components {
    /// Connect to Ollama for embeddings and open both stores under the base
    /// directory.
    #[inline]
    pub async fn open(config: &Config) -> Result<Self> {
        let embedder = OllamaClient::new(&config.ollama)?;
        let gateway = EmbeddingGateway::new(Arc::new(embedder))
            .with_dimension(config.ollama.embedding_dimension as usize);
        let store: Arc<dyn VectorIndex> = Arc::new(VectorStore::new(config).await?);
        let ledger = Database::initialize_from_config_dir(&config.base_dir)
            .await
            .map_err(|e| RagError::Database(format!("{e:#}")))?;

        Ok(Self {
            gateway,
            store,
            ledger,
        })
    }

    #[inline]
    pub fn ingestion(&self, config: &Config) -> IngestionPipeline {
        IngestionPipeline::new(self.gateway.clone(), self.store.clone(), &config.ingest)
            .with_ledger(self.ledger.clone())
            .with_batch_size(config.ollama.batch_size as usize)
    }
}

/// Retrieval, generation and ingestion wired over shared handles.
///
/// Handles are injected; [`RagPipeline::from_config`] builds the production
/// set.
pub struct RagPipeline {
    gateway: EmbeddingGateway,
    store: Arc<dyn VectorIndex>,
    retriever: Retriever,
    correction: CorrectionLoop,
    ingest_config: IngestConfig,
    embed_batch_size: Option<usize>,
    ledger: Option<Database>,
    top_k: usize,
}

impl RagPipeline {
    #[inline]
    pub fn new(
        gateway: EmbeddingGateway,
        store: Arc<dyn VectorIndex>,
        model: Arc<dyn LanguageModel>,
    ) -> Self {
        Self {
            retriever: Retriever::new(gateway.clone(), store.clone()),
            correction: CorrectionLoop::new(model),
            gateway,
            store,
            ingest_config: IngestConfig::default(),
            embed_batch_size: None,
            ledger: None,
            top_k: DEFAULT_TOP_K,
        }
    }

    #[inline]
    pub async fn from_config(config: &Config) -> Result<Self> {
        let Components {
            gateway,
            store,
            ledger,
        } = Components::open(config).await?;
        let model = build_language_model(config)?;

        Ok(Self::new(gateway, store, model.clone())
            .with_correction(CorrectionLoop::from_config(model, &config.correction))
            .with_ingest_config(config.ingest.clone())
            .with_embed_batch_size(config.ollama.batch_size as usize)
            .with_ledger(ledger)
            .with_top_k(config.retrieval.top_k))
    }

    #[inline]
    pub fn with_correction(mut self, correction: CorrectionLoop) -> Self {
        self.correction = correction;
        self
    }

    #[inline]
    pub fn with_ingest_config(mut self, config: IngestConfig) -> Self {
        self.ingest_config = config;
        self
    }

    #[inline]
    pub fn with_embed_batch_size(mut self, batch_size: usize) -> Self {
        self.embed_batch_size = Some(batch_size);
        self
    }

    #[inline]
    pub fn with_ledger(mut self, ledger: Database) -> Self {
        self.ledger = Some(ledger);
        self
    }

    #[inline]
    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = top_k;
        self
    }

    #[inline]
    pub fn top_k(&self) -> usize {
        self.top_k
    }

    #[inline]
    pub fn store(&self) -> &Arc<dyn VectorIndex> {
        &self.store
    }

    #[inline]
    pub fn ledger(&self) -> Option<&Database> {
        self.ledger.as_ref()
    }

    /// Answer `question` from the `top_k` closest chunks
    #[inline]
    pub async fn ask(&self, question: &str) -> Result<ConversationTurn> {
        self.ask_with_top_k(question, self.top_k).await
    }

    #[inline]
    pub async fn ask_with_top_k(&self, question: &str, top_k: usize) -> Result<ConversationTurn> {
        let result = match self.retriever.retrieve(question, top_k).await? {
            RetrievalOutcome::InvalidQuery => {
                debug!("Rejected blank question");
                return Ok(ConversationTurn {
                    question: question.to_string(),
                    context: String::new(),
                    answer: INVALID_QUERY_MESSAGE.to_string(),
                    retry_count: 0,
                });
            }
            RetrievalOutcome::Results(result) => result,
        };

        info!("Answering with {} retrieved chunks", result.len());
        let context = format_context(Some(&result));
        let outcome = self.correction.run(question, &context)?;

        Ok(ConversationTurn {
            question: question.to_string(),
            context,
            answer: outcome.answer,
            retry_count: outcome.retry_count,
        })
    }

    /// Index every eligible file under `root`
    #[inline]
    pub async fn ingest(&self, root: &Path) -> Result<IngestReport> {
        let mut pipeline =
            IngestionPipeline::new(self.gateway.clone(), self.store.clone(), &self.ingest_config);
        if let Some(batch_size) = self.embed_batch_size {
            pipeline = pipeline.with_batch_size(batch_size);
        }
        if let Some(ledger) = &self.ledger {
            pipeline = pipeline.with_ledger(ledger.clone());
        }
        pipeline.ingest(root).await
    }
}
