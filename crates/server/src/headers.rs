//! Codec for the resumable-upload request headers.
//!
//! `Upload-Metadata` carries comma-separated `key base64value` pairs,
//! `Upload-Concat` marks a session as a fragment or as the final
//! concatenation, and `Upload-Checksum` carries an expected digest for
//! one chunk.

use std::collections::HashMap;

use axum::http::HeaderName;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;

use dockhand_store::Concat;

pub const UPLOAD_OFFSET: HeaderName = HeaderName::from_static("upload-offset");
pub const UPLOAD_LENGTH: HeaderName = HeaderName::from_static("upload-length");
pub const UPLOAD_METADATA: HeaderName = HeaderName::from_static("upload-metadata");
pub const UPLOAD_CONCAT: HeaderName = HeaderName::from_static("upload-concat");
pub const UPLOAD_CHECKSUM: HeaderName = HeaderName::from_static("upload-checksum");

/// Errors from parsing upload headers. All map to a 400 response.
#[derive(Debug, thiserror::Error)]
pub enum HeaderError {
    #[error("invalid Upload-Metadata pair: {0:?}")]
    InvalidMetadata(String),

    #[error("invalid base64 in {0:?}")]
    InvalidBase64(String),

    #[error("metadata value for {0:?} is not UTF-8")]
    InvalidUtf8(String),

    #[error("invalid Upload-Concat header: {0:?}")]
    InvalidConcat(String),

    #[error("invalid Upload-Checksum header: {0:?}")]
    InvalidChecksum(String),

    #[error("unsupported checksum algorithm: {0:?}")]
    UnsupportedAlgorithm(String),
}

/// Parses an `Upload-Metadata` header into a key/value map.
///
/// Each pair is `key base64value`; a key with no value is allowed and
/// maps to the empty string.
pub fn parse_upload_metadata(raw: &str) -> Result<HashMap<String, String>, HeaderError> {
    let mut metadata = HashMap::new();
    for pair in raw.split(',') {
        let pair = pair.trim();
        if pair.is_empty() {
            continue;
        }

        let mut parts = pair.splitn(2, ' ');
        let key = parts
            .next()
            .filter(|k| !k.is_empty())
            .ok_or_else(|| HeaderError::InvalidMetadata(pair.to_string()))?;

        let value = match parts.next() {
            None | Some("") => String::new(),
            Some(encoded) => {
                let bytes = BASE64
                    .decode(encoded)
                    .map_err(|_| HeaderError::InvalidBase64(key.to_string()))?;
                String::from_utf8(bytes).map_err(|_| HeaderError::InvalidUtf8(key.to_string()))?
            }
        };
        metadata.insert(key.to_string(), value);
    }
    Ok(metadata)
}

/// Encodes a metadata map as an `Upload-Metadata` header value.
pub fn encode_upload_metadata(metadata: &HashMap<String, String>) -> String {
    let mut pairs: Vec<String> = metadata
        .iter()
        .map(|(k, v)| {
            if v.is_empty() {
                k.clone()
            } else {
                format!("{k} {}", BASE64.encode(v))
            }
        })
        .collect();
    pairs.sort();
    pairs.join(",")
}

/// Parses an `Upload-Concat` header.
///
/// `partial` marks a fragment; `final;<ref> <ref> ...` lists the
/// fragments to concatenate, where each reference is an upload URL or a
/// bare id (the last path segment is the id).
pub fn parse_upload_concat(raw: &str) -> Result<Concat, HeaderError> {
    let raw = raw.trim();
    if raw == "partial" {
        return Ok(Concat::Partial);
    }

    let Some(refs) = raw.strip_prefix("final;") else {
        return Err(HeaderError::InvalidConcat(raw.to_string()));
    };

    let parts: Vec<String> = refs
        .split_whitespace()
        .map(|r| r.rsplit('/').next().unwrap_or(r).to_string())
        .collect();
    if parts.is_empty() {
        return Err(HeaderError::InvalidConcat(raw.to_string()));
    }
    Ok(Concat::Final { parts })
}

/// Parses an `Upload-Checksum` header (`sha256 <base64digest>`) into a
/// hex digest. Only SHA-256 is supported.
pub fn parse_upload_checksum(raw: &str) -> Result<String, HeaderError> {
    let mut parts = raw.trim().splitn(2, ' ');
    let algorithm = parts.next().unwrap_or_default();
    if !algorithm.eq_ignore_ascii_case("sha256") {
        return Err(HeaderError::UnsupportedAlgorithm(algorithm.to_string()));
    }

    let encoded = parts
        .next()
        .ok_or_else(|| HeaderError::InvalidChecksum(raw.to_string()))?;
    let digest = BASE64
        .decode(encoded)
        .map_err(|_| HeaderError::InvalidBase64("Upload-Checksum".to_string()))?;
    Ok(hex::encode(digest))
}
