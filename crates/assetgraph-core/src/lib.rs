//! assetgraph-core: Shared domain model for the asset graph.
//!
//! This crate provides the foundational pieces used by every other crate:
//! - The `Node` entity with its type chain, attributes, and materialized links
//! - Entity categories and edge directions
//! - The identity scheme mapping natural keys to graph vertex ids
//! - Common error types

pub mod error;
pub mod identity;
pub mod types;

pub use error::AssetGraphError;
pub use types::{Attributes, Category, Direction, DirectionalRelations, Links, Node};
