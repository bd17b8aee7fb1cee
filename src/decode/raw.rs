//! Built-in decoders.
//!
//! Format-specific parsing (Word, Excel, PowerPoint, PDF, Outlook) lives outside
//! this crate. These decoders extract what can be read without a format library.

use std::collections::BTreeMap;
use std::path::Path;

use super::document::ExtractedDocument;
use super::DocumentDecoder;
use crate::error::DecodeError;

/// Files larger than this are rejected by default.
pub const DEFAULT_MAX_BYTES: u64 = 64 * 1024 * 1024;

/// Headers copied into metadata by [`MailDecoder`].
const MAIL_HEADERS: &[&str] = &["subject", "from", "to", "cc", "date", "message-id"];

/// Decodes any file as lossy UTF-8 text.
#[derive(Debug, Clone)]
pub struct RawFileDecoder {
    max_bytes: u64,
}

impl Default for RawFileDecoder {
    fn default() -> Self {
        Self {
            max_bytes: DEFAULT_MAX_BYTES,
        }
    }
}

impl RawFileDecoder {
    #[must_use]
    pub const fn with_max_bytes(max_bytes: u64) -> Self {
        Self { max_bytes }
    }
}

impl DocumentDecoder for RawFileDecoder {
    fn decode(&self, path: &Path) -> Result<ExtractedDocument, DecodeError> {
        let (bytes, meta) = read_bounded(path, self.max_bytes)?;
        let content = printable_text(&bytes);
        Ok(ExtractedDocument::new(path, content, BTreeMap::new()).with_file_info(&meta))
    }
}

/// Decodes RFC 822 mail files: common headers become metadata, the body becomes
/// content.
#[derive(Debug, Clone, Default)]
pub struct MailDecoder {
    raw: RawFileDecoder,
}

impl DocumentDecoder for MailDecoder {
    fn decode(&self, path: &Path) -> Result<ExtractedDocument, DecodeError> {
        let (bytes, meta) = read_bounded(path, self.raw.max_bytes)?;
        let text = String::from_utf8_lossy(&bytes);
        let (metadata, body) = split_mail(&text);
        if metadata.is_empty() {
            return Err(DecodeError::format(path, "no mail headers found"));
        }
        Ok(ExtractedDocument::new(path, body.to_string(), metadata).with_file_info(&meta))
    }
}

fn read_bounded(path: &Path, max_bytes: u64) -> Result<(Vec<u8>, std::fs::Metadata), DecodeError> {
    let meta = std::fs::metadata(path).map_err(|e| DecodeError::read(path, e))?;
    if meta.len() > max_bytes {
        return Err(DecodeError::format(
            path,
            format!("file is {} bytes, limit is {max_bytes}", meta.len()),
        ));
    }
    let bytes = std::fs::read(path).map_err(|e| DecodeError::read(path, e))?;
    Ok((bytes, meta))
}

/// Lossy UTF-8 with control characters (other than whitespace) replaced by spaces.
fn printable_text(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes)
        .chars()
        .map(|c| if c.is_control() && !c.is_whitespace() { ' ' } else { c })
        .collect()
}

/// Split a mail message into selected headers and body.
///
/// Folded header lines (starting with whitespace) continue the previous header.
fn split_mail(text: &str) -> (BTreeMap<String, String>, &str) {
    let mut metadata = BTreeMap::new();
    let mut current: Option<String> = None;
    let mut offset = 0;

    for line in text.split_inclusive('\n') {
        offset += line.len();
        let trimmed = line.trim_end_matches(['\r', '\n']);
        if trimmed.is_empty() {
            return (metadata, &text[offset..]);
        }
        if trimmed.starts_with([' ', '\t']) {
            if let Some(value) = current.as_ref().and_then(|k| metadata.get_mut(k)) {
                value.push(' ');
                value.push_str(trimmed.trim());
            }
            continue;
        }
        current = None;
        if let Some((name, value)) = trimmed.split_once(':') {
            let name = name.trim().to_lowercase();
            if MAIL_HEADERS.contains(&name.as_str()) {
                metadata.insert(name.clone(), value.trim().to_string());
                current = Some(name);
            }
        }
    }

    (metadata, "")
}
