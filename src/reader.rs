use std::path::Path;

use chardetng::EncodingDetector;
use encoding_rs::Encoding;
use tracing::debug;

use crate::error::{DocToolError, Result};

/// Artifact reader: loads build artifacts (log, toc, source) as text.
///
/// UTF-8 and UTF-16 BOMs are honoured; files without one are decoded as UTF-8
/// when valid, otherwise with the detected legacy encoding. Content with NUL
/// bytes or malformed sequences is reported as undecodable.
#[derive(Clone, Default)]
pub struct ArtifactReader;

impl ArtifactReader {
    pub fn new() -> Self {
        Self
    }

    pub async fn read_text(&self, path: &Path) -> Result<String> {
        let bytes = match tokio::fs::read(path).await {
            Ok(b) => b,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(DocToolError::MissingArtifact {
                    path: path.to_path_buf(),
                });
            }
            Err(e) => return Err(e.into()),
        };
        decode(path, &bytes)
    }
}

pub fn decode(path: &Path, bytes: &[u8]) -> Result<String> {
    let (encoding, bom_len) = detect_from_prefix(bytes);
    let body = &bytes[bom_len..];

    let is_utf16 = encoding == encoding_rs::UTF_16LE || encoding == encoding_rs::UTF_16BE;
    if !is_utf16 && body.contains(&0) {
        return Err(DocToolError::Encoding {
            path: path.to_path_buf(),
            reason: "binary content (NUL byte)".to_string(),
        });
    }

    debug!(path = %path.display(), encoding = encoding.name(), "decoding artifact");
    encoding
        .decode_without_bom_handling_and_without_replacement(body)
        .map(|cow| cow.into_owned())
        .ok_or_else(|| DocToolError::Encoding {
            path: path.to_path_buf(),
            reason: format!("malformed {} data", encoding.name()),
        })
}

fn detect_from_prefix(bytes: &[u8]) -> (&'static Encoding, usize) {
    if bytes.starts_with(&[0xEF, 0xBB, 0xBF]) {
        return (encoding_rs::UTF_8, 3);
    }
    if bytes.starts_with(&[0xFF, 0xFE]) {
        return (encoding_rs::UTF_16LE, 2);
    }
    if bytes.starts_with(&[0xFE, 0xFF]) {
        return (encoding_rs::UTF_16BE, 2);
    }
    if std::str::from_utf8(bytes).is_ok() {
        return (encoding_rs::UTF_8, 0);
    }

    let mut detector = EncodingDetector::new();
    detector.feed(bytes, true);
    (detector.guess(None, true), 0)
}
