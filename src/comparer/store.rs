//! Change-detection store for incremental indexing.
//!
//! Maps path hashes to the content hash last seen for that file. The map lives in
//! memory during a run and is mirrored to a single snapshot file between runs:
//!
//! ```text
//! DocumentHash;PathHash;OriginalPath
//! ```
//!
//! Fields are not escaped; a path containing `;` produces a line that is dropped
//! on the next load. Paths containing a line break are never recorded.

use std::fs::{self, File};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

use crate::decode::ExtractedDocument;
use crate::error::ComparerError;
use crate::kind::DocumentKind;
use crate::Result;

const FIELD_SEPARATOR: char = ';';

/// Document hash of an entry whose last write failed. Never equals a content hash.
const UNWRITTEN_HASH: &str = "";

/// One tracked file.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ComparerEntry {
    pub path_hash: String,
    pub document_hash: String,
    pub original_path: String,
}

impl ComparerEntry {
    /// Parse one snapshot line. Returns `None` unless there are exactly three fields.
    #[must_use]
    pub fn parse_line(line: &str) -> Option<Self> {
        let mut fields = line.split(FIELD_SEPARATOR);
        let document_hash = fields.next()?;
        let path_hash = fields.next()?;
        let original_path = fields.next()?;
        if fields.next().is_some() {
            return None;
        }
        Some(Self {
            path_hash: path_hash.to_string(),
            document_hash: document_hash.to_string(),
            original_path: original_path.to_string(),
        })
    }

    /// Whether `original_path` fits on one snapshot line.
    #[must_use]
    pub fn is_recordable(original_path: &str) -> bool {
        !original_path.contains(['\n', '\r'])
    }

    /// Render as one snapshot line, without the trailing newline.
    #[must_use]
    pub fn to_line(&self) -> String {
        format!(
            "{}{FIELD_SEPARATOR}{}{FIELD_SEPARATOR}{}",
            self.document_hash, self.path_hash, self.original_path
        )
    }
}

/// Persistent path-hash to content-hash map for one document kind.
#[derive(Debug)]
pub struct ComparerStore {
    path: PathBuf,
    entries: DashMap<String, ComparerEntry>,
}

impl ComparerStore {
    /// Snapshot file name for a kind.
    #[must_use]
    pub fn file_name(kind: DocumentKind) -> String {
        format!("{kind}_comparer.txt")
    }

    /// Open the store for `kind` under `directory`.
    ///
    /// Creates the directory and an empty snapshot file if absent, then loads the
    /// snapshot. Malformed lines, including lines that are not valid UTF-8, are
    /// dropped.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory or file cannot be created or read.
    pub fn open(directory: impl AsRef<Path>, kind: DocumentKind) -> Result<Self> {
        let directory = directory.as_ref();
        fs::create_dir_all(directory).map_err(|e| ComparerError::access(directory, e))?;

        let path = directory.join(Self::file_name(kind));
        let file = fs::OpenOptions::new()
            .read(true)
            .append(true)
            .create(true)
            .open(&path)
            .map_err(|e| ComparerError::access(&path, e))?;

        let entries = DashMap::new();
        let mut dropped = 0usize;
        for raw in BufReader::new(file).split(b'\n') {
            let raw = raw.map_err(|e| ComparerError::access(&path, e))?;
            let Ok(line) = String::from_utf8(raw) else {
                dropped += 1;
                continue;
            };
            let line = line.trim_end_matches('\r');
            if line.is_empty() {
                continue;
            }
            match ComparerEntry::parse_line(line) {
                Some(entry) => {
                    entries.insert(entry.path_hash.clone(), entry);
                }
                None => dropped += 1,
            }
        }

        tracing::debug!(
            path = %path.display(),
            entries = entries.len(),
            dropped,
            "Comparer store loaded"
        );

        Ok(Self { path, entries })
    }

    /// Pass new or changed documents through, drop unchanged ones.
    ///
    /// New documents are inserted and changed documents have their hash replaced
    /// before returning. The per-key update is atomic, so this is safe to call from
    /// any number of concurrent pipeline workers.
    #[must_use]
    pub fn filter_existing_unchanged(&self, doc: ExtractedDocument) -> Option<ExtractedDocument> {
        match self.entries.entry(doc.id.clone()) {
            Entry::Vacant(slot) => {
                slot.insert(ComparerEntry {
                    path_hash: doc.id.clone(),
                    document_hash: doc.content_hash.clone(),
                    original_path: doc.original_path.clone(),
                });
                tracing::trace!(path = %doc.original_path, "New document");
                Some(doc)
            }
            Entry::Occupied(mut slot) => {
                if slot.get().document_hash == doc.content_hash {
                    return None;
                }
                let entry = slot.get_mut();
                entry.document_hash.clone_from(&doc.content_hash);
                entry.original_path.clone_from(&doc.original_path);
                tracing::trace!(path = %doc.original_path, "Changed document");
                Some(doc)
            }
        }
    }

    /// Mark entries as not written, keeping their paths.
    ///
    /// The next processing run sees the files as changed and resends them, and
    /// cleanup still finds them if they are deleted in the meantime. Returns how
    /// many entries were present.
    pub fn invalidate<S: AsRef<str>>(&self, path_hashes: &[S]) -> usize {
        path_hashes
            .iter()
            .filter(|h| {
                self.entries.get_mut(h.as_ref()).is_some_and(|mut entry| {
                    entry.document_hash = UNWRITTEN_HASH.to_string();
                    true
                })
            })
            .count()
    }

    /// Write the whole map to the snapshot file, replacing its previous content.
    ///
    /// The snapshot is written to a sibling temporary file and renamed over the
    /// old one. Entries whose path contains a line break are left out.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written.
    pub fn persist(&self) -> Result<()> {
        let tmp = self.path.with_extension("txt.tmp");
        let access = |e: std::io::Error| ComparerError::access(&self.path, e);

        {
            let file = File::create(&tmp).map_err(access)?;
            let mut writer = BufWriter::new(file);
            for entry in &self.entries {
                let entry = entry.value();
                if !ComparerEntry::is_recordable(&entry.original_path) {
                    tracing::warn!(
                        path = ?entry.original_path,
                        "Path contains a line break, not recorded"
                    );
                    continue;
                }
                writeln!(writer, "{}", entry.to_line()).map_err(access)?;
            }
            writer.flush().map_err(access)?;
            writer.get_ref().sync_all().map_err(access)?;
        }
        fs::rename(&tmp, &self.path).map_err(access)?;

        tracing::debug!(
            path = %self.path.display(),
            entries = self.entries.len(),
            "Comparer store persisted"
        );
        Ok(())
    }

    /// Forget every entry and delete the snapshot file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be removed.
    pub fn reset(&self) -> Result<()> {
        self.entries.clear();
        match fs::remove_file(&self.path) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(ComparerError::access(&self.path, e).into()),
        }
        tracing::info!(path = %self.path.display(), "Comparer store reset");
        Ok(())
    }

    /// Remove entries by path hash. Returns how many were present.
    pub fn remove<S: AsRef<str>>(&self, path_hashes: &[S]) -> usize {
        path_hashes
            .iter()
            .filter(|h| self.entries.remove(h.as_ref()).is_some())
            .count()
    }

    /// Look up one entry.
    #[must_use]
    pub fn get(&self, path_hash: &str) -> Option<ComparerEntry> {
        self.entries.get(path_hash).map(|e| e.value().clone())
    }

    /// Copy of all entries.
    #[must_use]
    pub fn entries(&self) -> Vec<ComparerEntry> {
        self.entries.iter().map(|e| e.value().clone()).collect()
    }

    /// Number of tracked files.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no files are tracked.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Snapshot file location.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use std::collections::HashSet;
    use std::sync::Arc;
    use tempfile::TempDir;

    fn doc(id: &str, hash: &str, path: &str) -> ExtractedDocument {
        let mut doc = ExtractedDocument::new(Path::new(path), String::new(), BTreeMap::new());
        doc.id = id.to_string();
        doc.content_hash = hash.to_string();
        doc
    }

    fn entry(hash: &str, id: &str, path: &str) -> ComparerEntry {
        ComparerEntry {
            path_hash: id.to_string(),
            document_hash: hash.to_string(),
            original_path: path.to_string(),
        }
    }

    #[test]
    fn test_open_creates_directory_and_file() {
        let tmp = TempDir::new().unwrap();
        let dir = tmp.path().join("nested/comparer");

        let store = ComparerStore::open(&dir, DocumentKind::Word).unwrap();

        assert!(store.is_empty());
        assert!(dir.join("word_comparer.txt").is_file());
        assert_eq!(store.path(), dir.join("word_comparer.txt"));
    }

    #[test]
    fn test_open_drops_malformed_lines() {
        let tmp = TempDir::new().unwrap();
        fs::write(
            tmp.path().join("pdf_comparer.txt"),
            b"h1;p1;/a.pdf\nbroken line\nh2;p2\nh3;p3;/c;d.pdf\n\nh4;p4;/d.pdf\r\nh5;p5;/e\xff.pdf\n",
        )
        .unwrap();

        let store = ComparerStore::open(tmp.path(), DocumentKind::Pdf).unwrap();

        assert_eq!(store.len(), 2);
        assert_eq!(store.get("p1"), Some(entry("h1", "p1", "/a.pdf")));
        assert_eq!(store.get("p4"), Some(entry("h4", "p4", "/d.pdf")));
        assert!(store.get("p3").is_none());
        assert!(store.get("p5").is_none());
    }

    #[test]
    fn test_invalid_utf8_line_does_not_hide_the_rest() {
        let tmp = TempDir::new().unwrap();
        fs::write(
            tmp.path().join("word_comparer.txt"),
            b"h1;p1;/a\xff.docx\nh2;p2;/b.docx\n",
        )
        .unwrap();

        let store = ComparerStore::open(tmp.path(), DocumentKind::Word).unwrap();

        assert_eq!(store.entries(), vec![entry("h2", "p2", "/b.docx")]);
    }

    #[test]
    fn test_new_document_is_inserted() {
        let tmp = TempDir::new().unwrap();
        let store = ComparerStore::open(tmp.path(), DocumentKind::Word).unwrap();

        let out = store.filter_existing_unchanged(doc("p1", "h1", "/a.docx"));

        assert!(out.is_some());
        assert_eq!(store.get("p1"), Some(entry("h1", "p1", "/a.docx")));
    }

    #[test]
    fn test_unchanged_document_is_dropped() {
        let tmp = TempDir::new().unwrap();
        let store = ComparerStore::open(tmp.path(), DocumentKind::Word).unwrap();
        let _ = store.filter_existing_unchanged(doc("p1", "h1", "/a.docx"));
        let before = store.entries();

        let out = store.filter_existing_unchanged(doc("p1", "h1", "/a.docx"));

        assert!(out.is_none());
        assert_eq!(store.entries(), before);
    }

    #[test]
    fn test_changed_document_replaces_hash() {
        let tmp = TempDir::new().unwrap();
        let store = ComparerStore::open(tmp.path(), DocumentKind::Word).unwrap();
        let _ = store.filter_existing_unchanged(doc("p1", "h1", "/a.docx"));

        let out = store.filter_existing_unchanged(doc("p1", "h9", "/a.docx"));

        assert_eq!(out.map(|d| d.content_hash), Some("h9".to_string()));
        assert_eq!(store.len(), 1);
        assert_eq!(store.get("p1").unwrap().document_hash, "h9");
    }

    #[test]
    fn test_persist_then_open_round_trips() {
        let tmp = TempDir::new().unwrap();
        let store = ComparerStore::open(tmp.path(), DocumentKind::Excel).unwrap();
        for i in 0..10 {
            let _ = store.filter_existing_unchanged(doc(
                &format!("p{i}"),
                &format!("h{i}"),
                &format!("/share/{i}.xlsx"),
            ));
        }
        store.persist().unwrap();

        let reopened = ComparerStore::open(tmp.path(), DocumentKind::Excel).unwrap();

        let before: HashSet<_> = store.entries().into_iter().collect();
        let after: HashSet<_> = reopened.entries().into_iter().collect();
        assert_eq!(before, after);
        assert!(!tmp.path().join("excel_comparer.txt.tmp").exists());
    }

    #[test]
    fn test_persist_overwrites_previous_snapshot() {
        let tmp = TempDir::new().unwrap();
        fs::write(
            tmp.path().join("word_comparer.txt"),
            "h1;p1;/a.docx\nh2;p2;/b.docx\n",
        )
        .unwrap();
        let store = ComparerStore::open(tmp.path(), DocumentKind::Word).unwrap();
        assert_eq!(store.remove(&["p2"]), 1);

        store.persist().unwrap();

        let content = fs::read_to_string(tmp.path().join("word_comparer.txt")).unwrap();
        assert_eq!(content, "h1;p1;/a.docx\n");
    }

    #[test]
    fn test_reset_clears_map_and_file() {
        let tmp = TempDir::new().unwrap();
        let store = ComparerStore::open(tmp.path(), DocumentKind::Word).unwrap();
        let _ = store.filter_existing_unchanged(doc("p1", "h1", "/a.docx"));
        store.persist().unwrap();

        store.reset().unwrap();

        assert!(store.is_empty());
        assert!(!store.path().exists());
        // Resetting twice is fine.
        store.reset().unwrap();
    }

    #[test]
    fn test_remove_counts_present_entries() {
        let tmp = TempDir::new().unwrap();
        let store = ComparerStore::open(tmp.path(), DocumentKind::Word).unwrap();
        let _ = store.filter_existing_unchanged(doc("p1", "h1", "/a.docx"));

        assert_eq!(store.remove(&["p1", "missing"]), 1);
        assert!(store.is_empty());
    }

    #[test]
    fn test_invalidate_keeps_path_and_forces_resend() {
        let tmp = TempDir::new().unwrap();
        let store = ComparerStore::open(tmp.path(), DocumentKind::Word).unwrap();
        let _ = store.filter_existing_unchanged(doc("p1", "h1", "/a.docx"));

        assert_eq!(store.invalidate(&["p1", "missing"]), 1);

        let kept = store.get("p1").unwrap();
        assert_eq!(kept.original_path, "/a.docx");
        assert_ne!(kept.document_hash, "h1");
        assert!(store
            .filter_existing_unchanged(doc("p1", "h1", "/a.docx"))
            .is_some());
    }

    #[test]
    fn test_invalidated_entry_survives_reload() {
        let tmp = TempDir::new().unwrap();
        let store = ComparerStore::open(tmp.path(), DocumentKind::Word).unwrap();
        let _ = store.filter_existing_unchanged(doc("p1", "h1", "/a.docx"));
        store.invalidate(&["p1"]);
        store.persist().unwrap();

        let reopened = ComparerStore::open(tmp.path(), DocumentKind::Word).unwrap();

        assert_eq!(reopened.get("p1"), store.get("p1"));
    }

    #[test]
    fn test_persist_skips_paths_with_line_breaks() {
        let tmp = TempDir::new().unwrap();
        let store = ComparerStore::open(tmp.path(), DocumentKind::Word).unwrap();
        let _ = store.filter_existing_unchanged(doc("p1", "h1", "/a.docx"));
        let _ = store.filter_existing_unchanged(doc("p2", "h2", "/odd\nh9;p9;/b.docx"));

        store.persist().unwrap();

        let content = fs::read_to_string(store.path()).unwrap();
        assert_eq!(content, "h1;p1;/a.docx\n");
        assert!(ComparerEntry::is_recordable("/share/a;b.docx"));
        assert!(!ComparerEntry::is_recordable("/share/a\r.docx"));
    }

    #[test]
    fn test_concurrent_filtering() {
        let tmp = TempDir::new().unwrap();
        let store = Arc::new(ComparerStore::open(tmp.path(), DocumentKind::Word).unwrap());

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let store = Arc::clone(&store);
                std::thread::spawn(move || {
                    (0..100)
                        .filter(|i| {
                            store
                                .filter_existing_unchanged(doc(
                                    &format!("p{i}"),
                                    "h",
                                    &format!("/{i}.docx"),
                                ))
                                .is_some()
                        })
                        .count()
                })
            })
            .collect();

        let passed: usize = handles.into_iter().map(|h| h.join().unwrap()).sum();

        // Each path passes exactly once no matter which thread saw it first.
        assert_eq!(passed, 100);
        assert_eq!(store.len(), 100);
    }

    #[test]
    fn test_line_format() {
        let e = entry("h1", "p1", "/a.docx");
        assert_eq!(e.to_line(), "h1;p1;/a.docx");
        assert_eq!(ComparerEntry::parse_line(&e.to_line()), Some(e));
        assert!(ComparerEntry::parse_line("a;b;c;d").is_none());
    }
}
