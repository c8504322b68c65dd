use assetgraph_core::AssetGraphError;
use assetgraph_graph::GraphError;
use assetgraph_search::SearchError;

/// Errors surfaced by the domain services.
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error(transparent)]
    Domain(#[from] AssetGraphError),

    #[error(transparent)]
    Graph(#[from] GraphError),

    #[error(transparent)]
    Search(#[from] SearchError),
}

impl ServiceError {
    /// Whether the stored entity has an incomplete type chain.
    pub fn is_invalid_labels(&self) -> bool {
        match self {
            Self::Domain(AssetGraphError::InvalidLabels { .. }) => true,
            Self::Graph(e) => e.is_invalid_labels(),
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, ServiceError>;
