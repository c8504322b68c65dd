use thiserror::Error;

/// Domain-level errors shared across the asset graph crates.
#[derive(Error, Debug)]
pub enum AssetGraphError {
    #[error("Malformed identity: {0}")]
    MalformedIdentity(String),

    #[error("Invalid labels for {id}: expected at least 2, got {labels:?}")]
    InvalidLabels { id: String, labels: Vec<String> },

    #[error("Unknown direction: {0}")]
    UnknownDirection(String),
}

pub type Result<T> = std::result::Result<T, AssetGraphError>;
