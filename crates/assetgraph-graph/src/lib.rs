//! Graph access layer for the asset graph.
//!
//! Every read and write against the backing graph engine flows through this
//! crate: DAOs compose one traversal per operation, submit it through a
//! scoped connection, and hand the flat projection back to the assembler to
//! rebuild typed `Node`s.

pub mod assembler;
pub mod client;
pub mod devices;
pub mod engine;
pub mod groups;
pub mod relations;

#[cfg(any(test, feature = "test-util"))]
pub mod mock;

pub use client::{GraphClient, GraphConfig, GraphError};
pub use devices::{DevicesDao, GetOptions};
pub use engine::{ConnectionScope, GraphEngine, Traversal, TraversalKind, TraversalSession};
pub use groups::GroupsDao;
pub use relations::{Page, RelatedQuery};
