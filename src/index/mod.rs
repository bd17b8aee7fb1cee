//! Search index access.
//!
//! The indexer talks to the search service only through [`IndexStore`]. Two
//! implementations ship with the crate:
//! - [`ElasticIndexStore`]: Elasticsearch-compatible REST API
//! - [`MemoryIndexStore`]: in-process, for tests and dry runs

mod elastic;
mod memory;

use async_trait::async_trait;

pub use elastic::ElasticIndexStore;
pub use memory::MemoryIndexStore;

use crate::decode::ExtractedDocument;
use crate::Result;

/// Operations the indexer needs from a search index service.
#[async_trait]
pub trait IndexStore: Send + Sync {
    /// Check whether an index exists.
    async fn index_exists(&self, index: &str) -> Result<bool>;

    /// Create an index for [`ExtractedDocument`] records.
    async fn create_index(&self, index: &str) -> Result<()>;

    /// Write documents keyed by their id.
    ///
    /// Returns `false` if the service rejected any document in the batch.
    async fn bulk_write(&self, index: &str, docs: &[ExtractedDocument]) -> Result<bool>;

    /// Remove documents by id. Returns the number actually removed.
    async fn remove_by_id(&self, index: &str, ids: &[String]) -> Result<u64>;

    /// Persist buffered writes.
    async fn flush(&self, index: &str) -> Result<()>;

    /// Make recent writes visible to searches.
    async fn refresh(&self, index: &str) -> Result<()>;
}
