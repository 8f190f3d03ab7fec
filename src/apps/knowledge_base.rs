use crate::apps::DEFAULT_TOP_K;
use crate::chunking::ChunkingConfig;
use crate::corpus::load_csv_records;
use crate::embeddings::{Embedder, Embedding, EmbeddingInput};
use crate::error::Result;
use crate::index::{DistanceMetric, VectorIndex};
use crate::rag::{index_records, ChunkMetadata};
use crate::retrieval::Retriever;
use crate::session::Session;
use std::path::{Path, PathBuf};

pub const DEFAULT_KNOWLEDGE_BASE: &str = "knowledge_base.csv";

/// One matching chunk of the knowledge base
#[derive(Debug, Clone, PartialEq)]
pub struct SearchResult {
    pub content: String,
    /// Distance to the question, lower is closer
    pub score: f32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SearchOutcome {
    pub results: Vec<SearchResult>,
    pub query_embedding: Embedding,
}

/// Semantic search over a CSV knowledge base
pub struct KnowledgeBaseApp<E> {
    embedder: E,
    corpus: PathBuf,
    chunking: ChunkingConfig,
    session: Session<ChunkMetadata>,
    top_k: usize,
}

impl<E: Embedder> KnowledgeBaseApp<E> {
    pub fn new<P: AsRef<Path>>(embedder: E, corpus: P) -> Self {
        KnowledgeBaseApp {
            embedder,
            corpus: corpus.as_ref().to_path_buf(),
            chunking: ChunkingConfig::character(300, 0),
            session: Session::new(),
            top_k: DEFAULT_TOP_K,
        }
    }

    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = top_k;
        self
    }

    pub fn with_chunking(mut self, chunking: ChunkingConfig) -> Self {
        self.chunking = chunking;
        self
    }

    pub async fn prepare(&mut self) -> Result<()> {
        self.chunking.validate()?;
        let embedder = &self.embedder;
        let corpus = &self.corpus;
        let chunking = &self.chunking;
        self.session
            .ensure_built(|| build_knowledge_index(embedder, corpus, chunking))
            .await?;
        Ok(())
    }

    pub async fn search(&mut self, question: &str) -> Result<SearchOutcome> {
        let embedder = &self.embedder;
        let corpus = &self.corpus;
        let chunking = &self.chunking;
        let index = self
            .session
            .ensure_built(|| build_knowledge_index(embedder, corpus, chunking))
            .await?;

        let retrieval = Retriever::new(embedder, index)
            .retrieve_with_embedding(&EmbeddingInput::text(question), self.top_k)
            .await?;

        let results = retrieval
            .matches
            .iter()
            .map(|n| SearchResult {
                content: n.metadata.text.clone(),
                score: n.distance,
            })
            .collect();
        Ok(SearchOutcome {
            results,
            query_embedding: retrieval.query_embedding,
        })
    }
}

async fn build_knowledge_index<E: Embedder>(
    embedder: &E,
    corpus: &Path,
    chunking: &ChunkingConfig,
) -> Result<VectorIndex<ChunkMetadata>> {
    let records = load_csv_records(corpus)?;
    index_records(embedder, &records, chunking, DistanceMetric::Euclidean).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::apps::test_support::VocabularyEmbedder;
    use crate::error::AppError;
    use std::fs;
    use tempfile::TempDir;

    fn write_csv(dir: &TempDir) -> PathBuf {
        let path = dir.path().join("knowledge_base.csv");
        fs::write(
            &path,
            "topic,answer\n\
             vacation,Employees get 25 vacation days per year\n\
             laptop,Request a laptop through the IT portal\n\
             expenses,Submit expenses within 30 days\n",
        )
        .unwrap();
        path
    }

    #[tokio::test]
    async fn test_search_returns_closest_rows() {
        let dir = TempDir::new().unwrap();
        let mut app = KnowledgeBaseApp::new(
            VocabularyEmbedder::new(&["vacation", "laptop", "expenses"]),
            write_csv(&dir),
        )
        .with_top_k(2);

        app.prepare().await.unwrap();
        let outcome = app.search("How many vacation days do I have?").await.unwrap();

        assert_eq!(outcome.results.len(), 2);
        assert!(outcome.results[0].content.contains("topic: vacation"));
        assert!(outcome.results[0].score <= outcome.results[1].score);
        assert_eq!(outcome.query_embedding.dimension(), 4);
    }

    #[tokio::test]
    async fn test_same_question_same_results() {
        let dir = TempDir::new().unwrap();
        let mut app = KnowledgeBaseApp::new(
            VocabularyEmbedder::new(&["vacation", "laptop", "expenses"]),
            write_csv(&dir),
        );
        let first = app.search("laptop request").await.unwrap();
        let second = app.search("laptop request").await.unwrap();
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_empty_csv_is_construction_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("empty.csv");
        fs::write(&path, "topic,answer\n").unwrap();

        let mut app = KnowledgeBaseApp::new(VocabularyEmbedder::new(&["vacation"]), &path);
        let err = app.prepare().await.unwrap_err();
        assert!(matches!(err, AppError::EmptyIndex { .. }));
    }
}
