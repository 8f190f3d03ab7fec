use crate::embeddings::{Embedder, Embedding, EmbeddingInput};
use crate::error::Result;
use crate::index::{Neighbor, VectorIndex};
use log::debug;

/// Pairs an index with the embedder that built it, so queries always land in
/// the same embedding space as the stored vectors
pub struct Retriever<'a, E, M> {
    embedder: &'a E,
    index: &'a VectorIndex<M>,
}

/// Query results together with the vector they were computed from
#[derive(Debug)]
pub struct Retrieval<'a, M> {
    pub query_embedding: Embedding,
    pub matches: Vec<Neighbor<'a, M>>,
}

impl<'a, E: Embedder, M> Retriever<'a, E, M> {
    pub fn new(embedder: &'a E, index: &'a VectorIndex<M>) -> Self {
        Retriever { embedder, index }
    }

    /// Embed the query and return its `k` nearest entries
    pub async fn retrieve(&self, query: &EmbeddingInput, k: usize) -> Result<Vec<Neighbor<'a, M>>> {
        Ok(self.retrieve_with_embedding(query, k).await?.matches)
    }

    /// Same as `retrieve`, also handing back the query vector
    pub async fn retrieve_with_embedding(
        &self,
        query: &EmbeddingInput,
        k: usize,
    ) -> Result<Retrieval<'a, M>> {
        query.validate()?;
        let query_embedding = self.embedder.embed(query).await?;
        let matches = self.index.query(&query_embedding.values, k)?;
        debug!("Retrieved {} matches (k = {})", matches.len(), k);
        Ok(Retrieval {
            query_embedding,
            matches,
        })
    }
}
