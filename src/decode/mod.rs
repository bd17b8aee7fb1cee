//! Document decoding.
//!
//! A [`DocumentDecoder`] turns one file into an [`ExtractedDocument`] or a
//! [`DecodeError`]. Decoders are synchronous and run on the blocking pool.

mod document;
mod raw;

use std::path::Path;
use std::sync::Arc;

pub use document::{content_hash, path_hash, ExtractedDocument};
pub use raw::{MailDecoder, RawFileDecoder, DEFAULT_MAX_BYTES};

use crate::error::DecodeError;
use crate::kind::DocumentKind;

/// Decodes files of one document kind.
pub trait DocumentDecoder: Send + Sync {
    /// Decode the file at `path`.
    ///
    /// # Errors
    ///
    /// Returns a [`DecodeError`] if the file cannot be read or is not a valid
    /// document of this kind.
    fn decode(&self, path: &Path) -> Result<ExtractedDocument, DecodeError>;
}

/// The built-in decoder for a document kind.
#[must_use]
pub fn decoder_for(kind: DocumentKind) -> Arc<dyn DocumentDecoder> {
    match kind {
        DocumentKind::Eml => Arc::new(MailDecoder::default()),
        DocumentKind::Word
        | DocumentKind::Excel
        | DocumentKind::PowerPoint
        | DocumentKind::Pdf
        | DocumentKind::Msg => Arc::new(RawFileDecoder::default()),
    }
}
