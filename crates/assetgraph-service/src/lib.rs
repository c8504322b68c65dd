//! assetgraph-service: domain services over the asset graph.
//!
//! - `DevicesService`, `GroupsService`, `SearchService` wrapping the DAOs
//! - `DeviceItem` / `GroupItem` resource models
//! - configuration loading for the `assetgraph` binary

pub mod config;
pub mod devices;
pub mod error;
pub mod groups;
pub mod models;
pub mod search;

pub use devices::DevicesService;
pub use error::ServiceError;
pub use groups::GroupsService;
pub use models::{DeviceItem, GroupItem};
pub use search::SearchService;
