//! Required-field access for client-negotiated upload metadata.

use std::collections::HashMap;

use crate::CommitError;

/// Reads a required metadata field.
///
/// There is no defaulting: `filename`, `destination` and `overwrite` are
/// all mandatory before a session can be finalized, and a missing key is
/// a malformed negotiation from the client, unrecoverable for that
/// session.
pub fn read_field<'a>(
    metadata: &'a HashMap<String, String>,
    key: &str,
) -> Result<&'a str, CommitError> {
    metadata
        .get(key)
        .map(String::as_str)
        .ok_or_else(|| CommitError::MissingMetadata(key.to_string()))
}
