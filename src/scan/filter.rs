//! Extension and exclude-substring file filtering.

use std::path::Path;

/// File filter for one document kind.
#[derive(Debug, Clone)]
pub struct FileFilter {
    extension: String,
    excludes: Vec<String>,
}

impl FileFilter {
    /// Create a filter accepting `extension` (with or without the leading dot,
    /// case-insensitive) and rejecting any path containing one of `excludes`.
    pub fn new<S: AsRef<str>>(extension: &str, excludes: &[S]) -> Self {
        Self {
            extension: extension.trim_start_matches('.').to_lowercase(),
            excludes: excludes
                .iter()
                .map(|s| s.as_ref().to_string())
                .filter(|s| !s.is_empty())
                .collect(),
        }
    }

    /// Check if a path should be indexed.
    ///
    /// Only inspects the path string; callers are responsible for skipping
    /// directories.
    #[must_use]
    pub fn matches(&self, path: &Path) -> bool {
        self.has_extension(path) && !self.is_excluded(path)
    }

    /// Check if a path carries the configured extension.
    #[must_use]
    pub fn has_extension(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|e| e.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case(&self.extension))
    }

    /// Check if a path contains any exclude substring.
    #[must_use]
    pub fn is_excluded(&self, path: &Path) -> bool {
        let path_str = path.to_string_lossy();
        self.excludes.iter().any(|ex| path_str.contains(ex.as_str()))
    }

    /// The normalized extension this filter accepts.
    #[must_use]
    pub fn extension(&self) -> &str {
        &self.extension
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extension_match_is_case_insensitive() {
        let filter = FileFilter::new::<&str>("docx", &[]);
        assert!(filter.matches(Path::new("/share/report.docx")));
        assert!(filter.matches(Path::new("/share/REPORT.DOCX")));
        assert!(!filter.matches(Path::new("/share/report.doc")));
        assert!(!filter.matches(Path::new("/share/docx")));
    }

    #[test]
    fn test_leading_dot_is_ignored() {
        let filter = FileFilter::new::<&str>(".PDF", &[]);
        assert_eq!(filter.extension(), "pdf");
        assert!(filter.matches(Path::new("a.pdf")));
    }

    #[test]
    fn test_exclude_substrings() {
        let filter = FileFilter::new("docx", &["~$", "/archive/"]);
        assert!(filter.matches(Path::new("/share/plan.docx")));
        assert!(!filter.matches(Path::new("/share/~$plan.docx")));
        assert!(!filter.matches(Path::new("/share/archive/old.docx")));
    }

    #[test]
    fn test_empty_excludes_are_dropped() {
        let filter = FileFilter::new("docx", &[""]);
        assert!(filter.matches(Path::new("/share/plan.docx")));
    }
}
