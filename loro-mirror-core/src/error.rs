//! Error types for the mirror engine.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, MirrorError>;

/// Errors that can occur while diffing or applying state to a Loro document.
#[derive(Error, Debug)]
pub enum MirrorError {
    #[error("State validation failed: {}", .0.join("; "))]
    Validation(Vec<String>),

    #[error("Container not found in document: {0}")]
    ContainerNotFound(String),

    #[error("Unknown container kind: {0}")]
    UnknownContainerKind(String),

    #[error("Invalid list index {index} for container {container} (len {len})")]
    InvalidListIndex {
        container: String,
        index: usize,
        len: usize,
    },

    #[error("Movable list {0} requires an id selector")]
    MissingIdSelector(String),

    #[error("List item at index {index} in {container} has no id")]
    MissingItemId { container: String, index: usize },

    #[error("Duplicate item id '{id}' in {container}")]
    DuplicateItemId { container: String, id: String },

    #[error("Invalid change for {container}: {reason}")]
    InvalidChange { container: String, reason: String },

    #[error("Loro error: {0}")]
    Loro(#[from] loro::LoroError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_error_joins_messages() {
        let err = MirrorError::Validation(vec!["a: is required".into(), "b: expected number".into()]);
        assert_eq!(
            err.to_string(),
            "State validation failed: a: is required; b: expected number"
        );
    }

    #[test]
    fn test_invalid_index_message() {
        let err = MirrorError::InvalidListIndex {
            container: "cid:root-items:List".into(),
            index: 4,
            len: 2,
        };
        assert!(err.to_string().contains("index 4"));
    }
}
