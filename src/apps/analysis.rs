use crate::apps::DEFAULT_TOP_K;
use crate::chunking::ChunkingConfig;
use crate::corpus::load_json_records;
use crate::embeddings::{Embedder, EmbeddingInput};
use crate::error::{AppError, Result};
use crate::generation::{GenerationConfig, Generator, Prompt};
use crate::index::{DistanceMetric, VectorIndex};
use crate::rag::{format_context, index_records, ChunkMetadata};
use crate::retrieval::Retriever;
use crate::session::Session;
use log::info;
use std::path::{Path, PathBuf};

/// Which kind of document the analysis app works on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnalysisKind {
    Logs,
    Invoices,
}

impl AnalysisKind {
    /// Instruction prompt for a single entry, without retrieved context
    pub fn prompt(&self, entry: &str) -> String {
        match self {
            AnalysisKind::Logs => format!(
                "{}\n\nAnalyze the log and determine if there are any issues. If so, provide a summary and suggest actions.",
                entry
            ),
            AnalysisKind::Invoices => format!(
                "Invoice Details:\n{}\n\nExtract key information and provide a summary.",
                entry
            ),
        }
    }

    /// Field of a corpus record holding the text to index
    pub fn default_content_key(&self) -> &'static str {
        match self {
            AnalysisKind::Logs => "log",
            AnalysisKind::Invoices => "invoice_id",
        }
    }

    pub fn default_corpus(&self) -> &'static str {
        match self {
            AnalysisKind::Logs => "logs.json",
            AnalysisKind::Invoices => "invoices.json",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            AnalysisKind::Logs => "log entry",
            AnalysisKind::Invoices => "invoice",
        }
    }
}

/// JSON corpus the app indexes for related entries
#[derive(Debug, Clone)]
pub struct CorpusSource {
    pub path: PathBuf,
    pub content_key: String,
}

/// A previously indexed entry similar to the analysed one
#[derive(Debug, Clone, PartialEq)]
pub struct RelatedEntry {
    pub text: String,
    pub distance: f32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Analysis {
    pub related: Vec<RelatedEntry>,
    pub text: String,
}

/// Log and invoice analysis: related corpus entries are retrieved and handed
/// to the model together with the entry under analysis
pub struct AnalysisApp<E, G> {
    kind: AnalysisKind,
    embedder: E,
    generator: G,
    generation: GenerationConfig,
    chunking: ChunkingConfig,
    corpus: Option<CorpusSource>,
    session: Session<ChunkMetadata>,
    top_k: usize,
}

impl<E: Embedder, G: Generator> AnalysisApp<E, G> {
    pub fn new(kind: AnalysisKind, embedder: E, generator: G) -> Self {
        AnalysisApp {
            kind,
            embedder,
            generator,
            generation: GenerationConfig::analysis(),
            chunking: ChunkingConfig::recursive(8000, 0),
            corpus: None,
            session: Session::new(),
            top_k: DEFAULT_TOP_K,
        }
    }

    pub fn with_corpus<P: AsRef<Path>>(mut self, path: P, content_key: impl Into<String>) -> Self {
        self.corpus = Some(CorpusSource {
            path: path.as_ref().to_path_buf(),
            content_key: content_key.into(),
        });
        self
    }

    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = top_k;
        self
    }

    pub fn with_generation(mut self, generation: GenerationConfig) -> Self {
        self.generation = generation;
        self
    }

    pub fn kind(&self) -> AnalysisKind {
        self.kind
    }

    /// Build the corpus index up front so setup problems surface before the
    /// first entry is analysed
    pub async fn prepare(&mut self) -> Result<()> {
        self.generation.validate()?;
        self.chunking.validate()?;
        if let Some(corpus) = &self.corpus {
            let embedder = &self.embedder;
            let chunking = &self.chunking;
            self.session
                .ensure_built(|| build_corpus_index(embedder, corpus, chunking))
                .await?;
        }
        Ok(())
    }

    pub async fn analyze(&mut self, entry: &str) -> Result<Analysis> {
        let entry = entry.trim();
        if entry.is_empty() {
            return Err(AppError::input(format!("the {} is empty", self.kind.label())));
        }
        self.generation.validate()?;

        let (related, context) = match &self.corpus {
            Some(corpus) => {
                let embedder = &self.embedder;
                let chunking = &self.chunking;
                let index = self
                    .session
                    .ensure_built(|| build_corpus_index(embedder, corpus, chunking))
                    .await?;
                let matches = Retriever::new(embedder, index)
                    .retrieve(&EmbeddingInput::text(entry), self.top_k)
                    .await?;

                let context = format_context(&matches);
                let related = matches
                    .iter()
                    .map(|n| RelatedEntry {
                        text: n.metadata.text.clone(),
                        distance: n.distance,
                    })
                    .collect();
                (related, Some(context))
            }
            None => (Vec::new(), None),
        };

        let text = match context.filter(|c| !c.is_empty()) {
            Some(context) => format!(
                "Similar entries seen before:\n{}\n\n{}",
                context,
                self.kind.prompt(entry)
            ),
            None => self.kind.prompt(entry),
        };

        let text = self.generator.generate(&Prompt::new(text), &self.generation).await?;
        Ok(Analysis { related, text })
    }
}

async fn build_corpus_index<E: Embedder>(
    embedder: &E,
    corpus: &CorpusSource,
    chunking: &ChunkingConfig,
) -> Result<VectorIndex<ChunkMetadata>> {
    let records = load_json_records(&corpus.path, &corpus.content_key)?;
    info!("Loaded {} records from {}", records.len(), corpus.path.display());
    index_records(embedder, &records, chunking, DistanceMetric::Euclidean).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::apps::test_support::{RecordingGenerator, VocabularyEmbedder};
    use std::fs;
    use tempfile::TempDir;

    fn write_logs(dir: &TempDir) -> PathBuf {
        let path = dir.path().join("logs.json");
        fs::write(
            &path,
            r#"[
                {"log": "ERROR disk usage at 97% on /var", "host": "db-1"},
                {"log": "INFO user login succeeded", "host": "web-1"},
                {"log": "WARN disk latency high", "host": "db-2"}
            ]"#,
        )
        .unwrap();
        path
    }

    #[test]
    fn test_prompts() {
        assert_eq!(
            AnalysisKind::Invoices.prompt("INV-1"),
            "Invoice Details:\nINV-1\n\nExtract key information and provide a summary."
        );
        assert!(AnalysisKind::Logs
            .prompt("boom")
            .starts_with("boom\n\nAnalyze the log"));
    }

    #[tokio::test]
    async fn test_analyze_without_corpus_sends_plain_prompt() {
        let mut app = AnalysisApp::new(
            AnalysisKind::Invoices,
            VocabularyEmbedder::new(&["invoice"]),
            RecordingGenerator::new("summary"),
        );
        let analysis = app.analyze("INV-42 total 100 EUR").await.unwrap();

        assert_eq!(analysis.text, "summary");
        assert!(analysis.related.is_empty());
        let prompts = app.generator.prompts.borrow();
        assert_eq!(prompts[0].text, AnalysisKind::Invoices.prompt("INV-42 total 100 EUR"));
    }

    #[tokio::test]
    async fn test_analyze_adds_related_entries() {
        let dir = TempDir::new().unwrap();
        let path = write_logs(&dir);
        let mut app = AnalysisApp::new(
            AnalysisKind::Logs,
            VocabularyEmbedder::new(&["disk", "login", "error"]),
            RecordingGenerator::new("disk is filling up"),
        )
        .with_corpus(&path, "log")
        .with_top_k(2);

        app.prepare().await.unwrap();
        let analysis = app.analyze("ERROR disk usage at 99%").await.unwrap();

        assert_eq!(analysis.related.len(), 2);
        assert!(analysis.related[0].text.contains("disk usage at 97%"));
        assert!(analysis.related.iter().all(|r| !r.text.contains("login")));
        let prompts = app.generator.prompts.borrow();
        assert!(prompts[0].text.starts_with("Similar entries seen before:\n"));
        assert!(prompts[0].text.ends_with("If so, provide a summary and suggest actions."));
    }

    #[tokio::test]
    async fn test_corpus_indexed_once_per_session() {
        let dir = TempDir::new().unwrap();
        let path = write_logs(&dir);
        let mut app = AnalysisApp::new(
            AnalysisKind::Logs,
            VocabularyEmbedder::new(&["disk", "login"]),
            RecordingGenerator::new("ok"),
        )
        .with_corpus(&path, "log");

        app.prepare().await.unwrap();
        let after_build = app.embedder.calls.get();
        assert_eq!(after_build, 3);

        app.analyze("disk full").await.unwrap();
        app.analyze("login failed").await.unwrap();
        // one query embedding per analysis, no rebuild
        assert_eq!(app.embedder.calls.get(), after_build + 2);
    }

    #[tokio::test]
    async fn test_missing_corpus_fails_at_prepare() {
        let mut app = AnalysisApp::new(
            AnalysisKind::Logs,
            VocabularyEmbedder::new(&["disk"]),
            RecordingGenerator::new("ok"),
        )
        .with_corpus("does-not-exist.json", "log");

        let err = app.prepare().await.unwrap_err();
        assert!(matches!(err, AppError::Io { .. }));
        assert!(app.generator.prompts.borrow().is_empty());
    }

    #[tokio::test]
    async fn test_blank_entry_rejected() {
        let mut app = AnalysisApp::new(
            AnalysisKind::Logs,
            VocabularyEmbedder::new(&["disk"]),
            RecordingGenerator::new("ok"),
        );
        let err = app.analyze("   ").await.unwrap_err();
        assert!(matches!(err, AppError::InputValidation { .. }));
    }

    #[tokio::test]
    async fn test_invalid_generation_config_rejected_before_generation() {
        let mut config = GenerationConfig::analysis();
        config.temperature = -1.0;
        let mut app = AnalysisApp::new(
            AnalysisKind::Logs,
            VocabularyEmbedder::new(&["disk"]),
            RecordingGenerator::new("ok"),
        )
        .with_generation(config);

        let err = app.analyze("disk full").await.unwrap_err();
        assert!(matches!(err, AppError::InvalidConfig { .. }));
        assert!(app.generator.prompts.borrow().is_empty());
    }
}
