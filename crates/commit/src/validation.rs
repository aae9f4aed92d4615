use std::path::{Component, Path};

use crate::CommitError;

/// Validates that a destination path stays inside the user's root.
///
/// Rejects:
/// - Empty paths
/// - Absolute paths
/// - Parent directory traversal (`..`)
/// - Windows prefix components (`C:`, `\\server`)
pub fn validate_destination(destination: &str) -> Result<(), CommitError> {
    if destination.is_empty() {
        return Err(CommitError::InvalidDestination("empty path".into()));
    }

    let path = Path::new(destination);

    if path.is_absolute() {
        return Err(CommitError::InvalidDestination(format!(
            "absolute path not allowed: {destination}"
        )));
    }

    for component in path.components() {
        match component {
            Component::ParentDir => {
                return Err(CommitError::InvalidDestination(format!(
                    "parent directory traversal not allowed: {destination}"
                )));
            }
            Component::Prefix(_) | Component::RootDir => {
                return Err(CommitError::InvalidDestination(format!(
                    "path prefix not allowed: {destination}"
                )));
            }
            Component::CurDir | Component::Normal(_) => {}
        }
    }

    Ok(())
}
