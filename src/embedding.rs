//! Embedding vector generation.
//!
//! Modeled as an optional capability with no default implementation: nothing
//! elsewhere in the engine requires it, and no provider currently produces
//! vectors. The trait exists so a future adapter can plug into `CanonicalBook`
//! persistence without the store or fetcher needing to change.

use crate::error::EngineResult;
use async_trait::async_trait;
use uuid::Uuid;

#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    fn dimensions(&self) -> usize;

    /// Produce an embedding for a book from its title/description/categories.
    async fn embed(&self, book_id: Uuid, text: &str) -> EngineResult<Vec<f32>>;
}
