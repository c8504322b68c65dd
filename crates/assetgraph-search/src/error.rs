use assetgraph_graph::GraphError;

/// Errors from building, parsing, or running a search.
#[derive(Debug, thiserror::Error)]
pub enum SearchError {
    #[error("Search filter field must not be empty")]
    EmptyField,

    #[error("Search filter on {field:?} has an empty value")]
    EmptyValue { field: String },

    #[error("Search filter on {field:?} must have a string, number, or boolean value")]
    UnsupportedValue { field: String },

    #[error("Search filter name {0:?} must not contain ':' or ','")]
    ReservedCharacter(String),

    #[error("Traversal hop relation must not be empty")]
    EmptyRelation,

    #[error("Traversal hop on {relation:?} needs an in/out direction")]
    InvalidHopDirection { relation: String },

    #[error("Search request needs at least one type or filter")]
    EmptyRequest,

    #[error("Unknown search parameter: {0}")]
    UnknownParameter(String),

    #[error("Malformed search filter: {0:?}")]
    MalformedFilter(String),

    #[error("Failed to decode search parameter {name}: {reason}")]
    Decode { name: String, reason: String },

    #[error(transparent)]
    Graph(#[from] GraphError),
}

pub type Result<T> = std::result::Result<T, SearchError>;
