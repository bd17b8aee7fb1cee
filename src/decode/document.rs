//! Extracted document record and identity hashing.

use std::collections::BTreeMap;
use std::path::Path;

use blake3::Hasher;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A decoded document, ready for change detection and indexing.
///
/// `id` is the path hash and doubles as the index document id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractedDocument {
    pub id: String,
    pub content_hash: String,
    pub original_path: String,
    pub file_name: String,
    pub extension: String,
    pub size_bytes: u64,
    pub created_at: Option<DateTime<Utc>>,
    pub modified_at: Option<DateTime<Utc>>,
    pub metadata: BTreeMap<String, String>,
    pub content: String,
}

impl ExtractedDocument {
    /// Build a document for `path` with the given content and metadata.
    ///
    /// Computes the path hash and content hash; filesystem fields start empty and
    /// can be filled with [`Self::with_file_info`].
    #[must_use]
    pub fn new(path: &Path, content: String, metadata: BTreeMap<String, String>) -> Self {
        let content_hash = content_hash(&content, &metadata);
        Self {
            id: path_hash(path),
            content_hash,
            original_path: path.to_string_lossy().to_string(),
            file_name: path
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_default(),
            extension: path
                .extension()
                .map(|e| e.to_string_lossy().to_lowercase())
                .unwrap_or_default(),
            size_bytes: 0,
            created_at: None,
            modified_at: None,
            metadata,
            content,
        }
    }

    /// Attach size and timestamps from filesystem metadata.
    ///
    /// These fields are not part of the content hash.
    #[must_use]
    pub fn with_file_info(mut self, meta: &std::fs::Metadata) -> Self {
        self.size_bytes = meta.len();
        self.created_at = meta.created().ok().map(DateTime::<Utc>::from);
        self.modified_at = meta.modified().ok().map(DateTime::<Utc>::from);
        self
    }
}

/// Stable identity of a file: blake3 hex digest of its path string.
#[must_use]
pub fn path_hash(path: &Path) -> String {
    blake3::hash(path.to_string_lossy().as_bytes())
        .to_hex()
        .to_string()
}

/// Digest over extracted content and metadata.
///
/// Fields are length-prefixed so distinct (key, value, content) splits never collide.
#[must_use]
pub fn content_hash(content: &str, metadata: &BTreeMap<String, String>) -> String {
    let mut hasher = Hasher::new();
    for (key, value) in metadata {
        update_field(&mut hasher, key);
        update_field(&mut hasher, value);
    }
    update_field(&mut hasher, content);
    hasher.finalize().to_hex().to_string()
}

fn update_field(hasher: &mut Hasher, field: &str) {
    hasher.update(&(field.len() as u64).to_le_bytes());
    hasher.update(field.as_bytes());
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_path_hash_is_stable() {
        let a = path_hash(Path::new("/share/a.docx"));
        let b = path_hash(Path::new("/share/a.docx"));
        let c = path_hash(Path::new("/share/b.docx"));
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(a.len(), 64);
    }

    #[test]
    fn test_content_hash_covers_metadata() {
        let mut meta = BTreeMap::new();
        let plain = content_hash("body", &meta);
        meta.insert("author".to_string(), "kim".to_string());
        let with_author = content_hash("body", &meta);
        assert_ne!(plain, with_author);
        assert_eq!(with_author, content_hash("body", &meta));
    }

    #[test]
    fn test_content_hash_field_boundaries() {
        let mut left = BTreeMap::new();
        left.insert("a".to_string(), "bc".to_string());
        let mut right = BTreeMap::new();
        right.insert("ab".to_string(), "c".to_string());
        assert_ne!(content_hash("", &left), content_hash("", &right));
    }

    #[test]
    fn test_new_fills_identity() {
        let doc = ExtractedDocument::new(
            Path::new("/share/Plan.DOCX"),
            "text".to_string(),
            BTreeMap::new(),
        );
        assert_eq!(doc.id, path_hash(Path::new("/share/Plan.DOCX")));
        assert_eq!(doc.file_name, "Plan.DOCX");
        assert_eq!(doc.extension, "docx");
        assert_eq!(doc.original_path, "/share/Plan.DOCX");
    }

    #[test]
    fn test_serializes_camel_case() {
        let doc = ExtractedDocument::new(Path::new("/a.pdf"), String::new(), BTreeMap::new());
        let json = serde_json::to_value(&doc).unwrap();
        assert!(json.get("contentHash").is_some());
        assert!(json.get("originalPath").is_some());
    }
}
