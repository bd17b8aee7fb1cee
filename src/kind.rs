//! Document kinds and job identities.
//!
//! Every job is identified by a [`JobKey`]: the kind of document it handles and
//! whether it indexes (`Processing`) or reconciles (`Cleanup`).

use std::fmt;

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

/// The closed set of document kinds handled by the indexer.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum DocumentKind {
    Word,
    Excel,
    #[value(name = "powerpoint")]
    PowerPoint,
    Pdf,
    Msg,
    Eml,
}

impl DocumentKind {
    /// All kinds, in registry order.
    pub const ALL: [Self; 6] = [
        Self::Word,
        Self::Excel,
        Self::PowerPoint,
        Self::Pdf,
        Self::Msg,
        Self::Eml,
    ];

    /// Stable lowercase name used in file names, index names and logs.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Word => "word",
            Self::Excel => "excel",
            Self::PowerPoint => "powerpoint",
            Self::Pdf => "pdf",
            Self::Msg => "msg",
            Self::Eml => "eml",
        }
    }

    /// Default file extension scanned for this kind (without the dot).
    #[must_use]
    pub const fn default_extension(self) -> &'static str {
        match self {
            Self::Word => "docx",
            Self::Excel => "xlsx",
            Self::PowerPoint => "pptx",
            Self::Pdf => "pdf",
            Self::Msg => "msg",
            Self::Eml => "eml",
        }
    }

    /// Position of this kind in [`Self::ALL`].
    #[must_use]
    pub const fn index(self) -> usize {
        self as usize
    }
}

impl fmt::Display for DocumentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What a job does with its document kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum JobRole {
    /// Scan, decode, filter and index documents.
    Processing,
    /// Remove index entries for files that disappeared.
    Cleanup,
}

impl JobRole {
    /// Stable lowercase name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Processing => "processing",
            Self::Cleanup => "cleanup",
        }
    }

    /// The role that must not run concurrently with this one.
    #[must_use]
    pub const fn opposing(self) -> Self {
        match self {
            Self::Processing => Self::Cleanup,
            Self::Cleanup => Self::Processing,
        }
    }

    const fn index(self) -> usize {
        self as usize
    }
}

impl fmt::Display for JobRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identity of a job: one document kind, one role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct JobKey {
    pub kind: DocumentKind,
    pub role: JobRole,
}

impl JobKey {
    /// Number of distinct keys.
    pub const COUNT: usize = DocumentKind::ALL.len() * 2;

    #[must_use]
    pub const fn processing(kind: DocumentKind) -> Self {
        Self {
            kind,
            role: JobRole::Processing,
        }
    }

    #[must_use]
    pub const fn cleanup(kind: DocumentKind) -> Self {
        Self {
            kind,
            role: JobRole::Cleanup,
        }
    }

    /// The paired job for the same document kind.
    #[must_use]
    pub const fn opposing(self) -> Self {
        Self {
            kind: self.kind,
            role: self.role.opposing(),
        }
    }

    /// Dense slot used by array-backed registries.
    #[must_use]
    pub const fn slot(self) -> usize {
        self.kind.index() * 2 + self.role.index()
    }
}

impl fmt::Display for JobKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.kind, self.role)
    }
}
