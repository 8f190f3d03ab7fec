use crate::apps::DEFAULT_TOP_K;
use crate::corpus::read_image;
use crate::embeddings::{Embedder, EmbeddingInput};
use crate::error::{AppError, Result};
use crate::index::DistanceMetric;
use crate::rag::{index_images, ImageMetadata};
use crate::retrieval::Retriever;
use crate::session::Session;
use std::path::{Path, PathBuf};

pub const DEFAULT_IMAGE_DIR: &str = "./images";

/// An indexed image close to the query
#[derive(Debug, Clone, PartialEq)]
pub struct ImageHit {
    pub path: PathBuf,
    pub media_type: String,
    pub distance: f32,
}

/// Find images of a directory by description, by example, or both
pub struct ImageSearchApp<E> {
    embedder: E,
    dir: PathBuf,
    session: Session<ImageMetadata>,
    top_k: usize,
}

impl<E: Embedder> ImageSearchApp<E> {
    pub fn new<P: AsRef<Path>>(embedder: E, dir: P) -> Self {
        ImageSearchApp {
            embedder,
            dir: dir.as_ref().to_path_buf(),
            session: Session::new(),
            top_k: DEFAULT_TOP_K,
        }
    }

    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = top_k;
        self
    }

    /// Index the image directory; a missing or image-less directory fails here
    pub async fn prepare(&mut self) -> Result<usize> {
        let embedder = &self.embedder;
        let dir = &self.dir;
        let index = self
            .session
            .ensure_built(|| index_images(embedder, dir, DistanceMetric::Euclidean))
            .await?;
        Ok(index.len())
    }

    pub async fn search(&mut self, text: Option<&str>, image: Option<&Path>) -> Result<Vec<ImageHit>> {
        let query = image_query(text, image)?;

        let embedder = &self.embedder;
        let dir = &self.dir;
        let index = self
            .session
            .ensure_built(|| index_images(embedder, dir, DistanceMetric::Euclidean))
            .await?;

        let matches = Retriever::new(embedder, index)
            .retrieve(&query, self.top_k)
            .await?;
        Ok(matches
            .into_iter()
            .map(|n| ImageHit {
                path: n.metadata.path.clone(),
                media_type: n.metadata.media_type.clone(),
                distance: n.distance,
            })
            .collect())
    }
}

/// Text, image or both fused into one query
fn image_query(text: Option<&str>, image: Option<&Path>) -> Result<EmbeddingInput> {
    let text = text.map(str::trim).filter(|t| !t.is_empty());
    let mut query = EmbeddingInput::default();
    if let Some(text) = text {
        query.text = Some(text.to_string());
    }
    if let Some(path) = image {
        let (bytes, _) = read_image(path)?;
        query = query.with_image(bytes);
    }
    if query.text.is_none() && query.image.is_none() {
        return Err(AppError::input("enter a search term or choose an image"));
    }
    Ok(query)
}
