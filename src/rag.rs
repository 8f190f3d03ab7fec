use crate::chunking::{chunk_records, over_token_limit, total_tokens, ChunkingConfig};
use crate::corpus::{list_images, read_image, Record};
use crate::embeddings::{Embedder, EmbeddingInput, MAX_INPUT_TOKENS};
use crate::error::{AppError, Result};
use crate::index::{DistanceMetric, IndexEntry, Neighbor, VectorIndex};
use log::{info, warn};
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};

/// What an indexed text chunk points back to
#[derive(Debug, Clone, PartialEq)]
pub struct ChunkMetadata {
    pub text: String,
    pub record_index: usize,
    pub record: Map<String, Value>,
}

/// What an indexed image points back to
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageMetadata {
    pub path: PathBuf,
    pub media_type: String,
}

/// Chunk records, embed every chunk and build an index over them.
///
/// A corpus that yields no chunks fails here instead of producing an index
/// that can never answer.
pub async fn index_records<E: Embedder>(
    embedder: &E,
    records: &[Record],
    chunking: &ChunkingConfig,
    metric: DistanceMetric,
) -> Result<VectorIndex<ChunkMetadata>> {
    let chunks = chunk_records(records, chunking)?;
    info!(
        "Split {} records into {} chunks (~{} tokens)",
        records.len(),
        chunks.len(),
        total_tokens(&chunks)
    );
    for chunk in over_token_limit(&chunks, MAX_INPUT_TOKENS) {
        warn!(
            "Chunk from record {} has ~{} tokens, over the embedding limit of {}",
            chunk.record_index, chunk.token_count, MAX_INPUT_TOKENS
        );
    }

    if chunks.is_empty() {
        return Err(AppError::EmptyIndex {
            reason: "the corpus produced no text to index".to_string(),
        });
    }

    let inputs: Vec<EmbeddingInput> = chunks
        .iter()
        .map(|chunk| EmbeddingInput::text(chunk.text.clone()))
        .collect();
    let embeddings = embedder.embed_all(&inputs).await?;

    let entries = chunks
        .into_iter()
        .zip(embeddings)
        .map(|(chunk, embedding)| {
            let record = records
                .get(chunk.record_index)
                .map(|r| r.metadata.clone())
                .unwrap_or_default();
            IndexEntry::new(
                embedding.values,
                ChunkMetadata {
                    text: chunk.text,
                    record_index: chunk.record_index,
                    record,
                },
            )
        })
        .collect();

    VectorIndex::build(entries, metric)
}

/// Embed every image of a directory and build an index over them.
///
/// A missing directory or one without images is a construction failure.
pub async fn index_images<E: Embedder, P: AsRef<Path>>(
    embedder: &E,
    dir: P,
    metric: DistanceMetric,
) -> Result<VectorIndex<ImageMetadata>> {
    let dir = dir.as_ref();
    let images = list_images(dir)?;
    if images.is_empty() {
        return Err(AppError::EmptyIndex {
            reason: format!("no images found in '{}'", dir.display()),
        });
    }

    let mut entries = Vec::with_capacity(images.len());
    for image in images {
        let (bytes, _) = read_image(&image.path)?;
        let embedding = embedder.embed(&EmbeddingInput::image(bytes)).await?;
        entries.push(IndexEntry::new(
            embedding.values,
            ImageMetadata {
                path: image.path,
                media_type: image.media_type,
            },
        ));
    }
    info!("Embedded {} images from {}", entries.len(), dir.display());

    VectorIndex::build(entries, metric)
}

/// Join retrieved chunks into a context block for a prompt
pub fn format_context(neighbors: &[Neighbor<'_, ChunkMetadata>]) -> String {
    neighbors
        .iter()
        .map(|n| n.metadata.text.trim())
        .collect::<Vec<_>>()
        .join("\n\n")
}
