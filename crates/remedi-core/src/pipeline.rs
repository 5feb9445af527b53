//! The fixed retrieve-then-generate pipeline: typed stages wired at
//! construction time, no runtime-composable chain graphs.

use std::sync::Arc;

use remedi_llm::{LlmError, LlmProvider};
use remedi_memory::{ScoredPassage, VectorStore, VectorStoreError};

use crate::prompt;

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("query embedding failed: {0}")]
    Embed(#[source] LlmError),
    #[error("passage search failed: {0}")]
    Search(#[from] VectorStoreError),
    #[error("answer generation failed: {0}")]
    Generate(#[source] LlmError),
}

#[derive(Debug, Clone)]
pub struct RetrieverConfig {
    pub collection: String,
    pub top_k: u64,
}

impl Default for RetrieverConfig {
    fn default() -> Self {
        Self {
            collection: "medical_articles".into(),
            top_k: 3,
        }
    }
}

/// Similarity retrieval with a fixed configuration: embed the query, search
/// the collection, return the top-k passages in rank order. No filtering,
/// no re-ranking, no deduplication.
pub struct Retriever {
    store: Arc<dyn VectorStore>,
    embedder: Arc<dyn LlmProvider>,
    config: RetrieverConfig,
}

impl Retriever {
    #[must_use]
    pub fn new(
        store: Arc<dyn VectorStore>,
        embedder: Arc<dyn LlmProvider>,
        config: RetrieverConfig,
    ) -> Self {
        Self {
            store,
            embedder,
            config,
        }
    }

    /// Fetch the passages most similar to `query`.
    ///
    /// # Errors
    ///
    /// Returns an error if embedding the query or searching the index fails.
    pub async fn retrieve(&self, query: &str) -> Result<Vec<ScoredPassage>, PipelineError> {
        let vector = self
            .embedder
            .embed(query)
            .await
            .map_err(PipelineError::Embed)?;

        let passages = self
            .store
            .search(&self.config.collection, vector, self.config.top_k)
            .await?;

        tracing::debug!(
            count = passages.len(),
            collection = %self.config.collection,
            "retrieved context passages"
        );
        Ok(passages)
    }
}

/// The answer produced for one turn, with the passages that grounded it.
#[derive(Debug)]
pub struct PipelineAnswer {
    pub text: String,
    pub passages: Vec<ScoredPassage>,
}

/// Orchestrates one conversation turn: retrieve context for the query,
/// assemble the prompt around the transcript, generate the answer.
pub struct ChatPipeline {
    retriever: Retriever,
    generator: Arc<dyn LlmProvider>,
}

impl ChatPipeline {
    #[must_use]
    pub fn new(retriever: Retriever, generator: Arc<dyn LlmProvider>) -> Self {
        Self {
            retriever,
            generator,
        }
    }

    /// Answer one turn. `query` is the latest user utterance (what retrieval
    /// ranks against); `transcript` is the rendered conversation the model
    /// continues from.
    ///
    /// # Errors
    ///
    /// Propagates retrieval and generation failures unmodified; generation is
    /// never attempted when retrieval fails.
    pub async fn answer(
        &self,
        query: &str,
        transcript: &str,
    ) -> Result<PipelineAnswer, PipelineError> {
        let passages = self.retriever.retrieve(query).await?;
        let messages = prompt::assemble(&passages, transcript);

        let text = self
            .generator
            .chat(&messages)
            .await
            .map_err(PipelineError::Generate)?;

        Ok(PipelineAnswer { text, passages })
    }
}
