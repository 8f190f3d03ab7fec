use crate::error::Result;
use crate::index::VectorIndex;
use log::info;
use std::future::Future;

/// Per-session state: the index is built on first use and then reused until
/// the session ends
pub struct Session<M> {
    index: Option<VectorIndex<M>>,
}

impl<M> Default for Session<M> {
    fn default() -> Self {
        Session { index: None }
    }
}

impl<M> Session<M> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_built(&self) -> bool {
        self.index.is_some()
    }

    /// Return the session index, running `build` only if there is none yet.
    ///
    /// A failed build leaves the session empty, so the next call retries.
    pub async fn ensure_built<F, Fut>(&mut self, build: F) -> Result<&VectorIndex<M>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<VectorIndex<M>>>,
    {
        let index = match self.index.take() {
            Some(index) => index,
            None => {
                info!("Building session index...");
                let index = build().await?;
                info!(
                    "Session index ready with {} entries ({} dimensions, {:?} distance)",
                    index.len(),
                    index.dimension().unwrap_or(0),
                    index.metric()
                );
                index
            }
        };
        Ok(self.index.insert(index))
    }
}
