//! assetgraph-search: declarative search over the asset graph.
//!
//! - `SearchRequest` and its builder
//! - the query string and multi-value map wire forms, and their parsers
//! - `SearchDao`, which compiles a request into a single read traversal

pub mod dao;
pub mod error;
pub mod model;
pub mod wire;

pub use dao::{SearchDao, SearchResults};
pub use error::SearchError;
pub use model::{Operator, SearchFilter, SearchRequest, SearchRequestBuilder, TraversalHop};
