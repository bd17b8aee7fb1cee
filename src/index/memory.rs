//! In-memory index store.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use async_trait::async_trait;
use parking_lot::RwLock;

use super::IndexStore;
use crate::decode::ExtractedDocument;
use crate::error::IndexError;
use crate::Result;

/// Index store backed by a map per index.
///
/// Write and delete failures can be injected to exercise error paths.
#[derive(Debug, Default)]
pub struct MemoryIndexStore {
    indexes: RwLock<HashMap<String, HashMap<String, ExtractedDocument>>>,
    reject_writes: AtomicBool,
    fail_removals: AtomicBool,
    bulk_calls: AtomicU64,
    flushes: AtomicU64,
}

impl MemoryIndexStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent bulk write report failure.
    pub fn reject_writes(&self, reject: bool) {
        self.reject_writes.store(reject, Ordering::SeqCst);
    }

    /// Make every subsequent removal return an error.
    pub fn fail_removals(&self, fail: bool) {
        self.fail_removals.store(fail, Ordering::SeqCst);
    }

    /// Copy of a stored document.
    #[must_use]
    pub fn document(&self, index: &str, id: &str) -> Option<ExtractedDocument> {
        self.indexes.read().get(index)?.get(id).cloned()
    }

    /// Number of documents in an index (0 if absent).
    #[must_use]
    pub fn count(&self, index: &str) -> usize {
        self.indexes.read().get(index).map_or(0, HashMap::len)
    }

    /// Number of bulk write calls received.
    #[must_use]
    pub fn bulk_calls(&self) -> u64 {
        self.bulk_calls.load(Ordering::SeqCst)
    }

    /// Number of flushes received.
    #[must_use]
    pub fn flushes(&self) -> u64 {
        self.flushes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl IndexStore for MemoryIndexStore {
    async fn index_exists(&self, index: &str) -> Result<bool> {
        Ok(self.indexes.read().contains_key(index))
    }

    async fn create_index(&self, index: &str) -> Result<()> {
        self.indexes.write().entry(index.to_string()).or_default();
        Ok(())
    }

    async fn bulk_write(&self, index: &str, docs: &[ExtractedDocument]) -> Result<bool> {
        self.bulk_calls.fetch_add(1, Ordering::SeqCst);
        if self.reject_writes.load(Ordering::SeqCst) {
            return Ok(false);
        }
        let mut indexes = self.indexes.write();
        let target = indexes
            .get_mut(index)
            .ok_or_else(|| IndexError::Missing(index.to_string()))?;
        for doc in docs {
            target.insert(doc.id.clone(), doc.clone());
        }
        Ok(true)
    }

    async fn remove_by_id(&self, index: &str, ids: &[String]) -> Result<u64> {
        if self.fail_removals.load(Ordering::SeqCst) {
            return Err(IndexError::Transport("injected removal failure".to_string()).into());
        }
        let mut indexes = self.indexes.write();
        let Some(target) = indexes.get_mut(index) else {
            return Ok(0);
        };
        let removed = ids.iter().filter(|id| target.remove(*id).is_some()).count();
        Ok(removed as u64)
    }

    async fn flush(&self, _index: &str) -> Result<()> {
        self.flushes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn refresh(&self, _index: &str) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use std::path::Path;

    fn doc(path: &str) -> ExtractedDocument {
        ExtractedDocument::new(Path::new(path), "x".to_string(), BTreeMap::new())
    }

    #[tokio::test]
    async fn test_create_and_write() {
        let store = MemoryIndexStore::new();
        assert!(!store.index_exists("docs").await.unwrap());

        store.create_index("docs").await.unwrap();
        let a = doc("/a.pdf");
        assert!(store.bulk_write("docs", &[a.clone()]).await.unwrap());

        assert!(store.index_exists("docs").await.unwrap());
        assert_eq!(store.count("docs"), 1);
        assert_eq!(store.document("docs", &a.id), Some(a));
    }

    #[tokio::test]
    async fn test_write_to_missing_index_fails() {
        let store = MemoryIndexStore::new();
        let err = store.bulk_write("nope", &[doc("/a.pdf")]).await.unwrap_err();
        assert!(err.to_string().contains("does not exist"));
    }

    #[tokio::test]
    async fn test_rejected_writes() {
        let store = MemoryIndexStore::new();
        store.create_index("docs").await.unwrap();
        store.reject_writes(true);

        assert!(!store.bulk_write("docs", &[doc("/a.pdf")]).await.unwrap());
        assert_eq!(store.count("docs"), 0);
        assert_eq!(store.bulk_calls(), 1);
    }

    #[tokio::test]
    async fn test_remove_by_id_counts_removed() {
        let store = MemoryIndexStore::new();
        store.create_index("docs").await.unwrap();
        let a = doc("/a.pdf");
        store.bulk_write("docs", &[a.clone()]).await.unwrap();

        let removed = store
            .remove_by_id("docs", &[a.id.clone(), "unknown".to_string()])
            .await
            .unwrap();

        assert_eq!(removed, 1);
        assert_eq!(store.count("docs"), 0);
        assert_eq!(store.remove_by_id("missing-index", &[a.id]).await.unwrap(), 0);
    }
}
