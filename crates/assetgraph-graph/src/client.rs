//! Neo4j connection management and the Bolt-backed graph engine.

use async_trait::async_trait;
use neo4rs::{BoltList, BoltMap, BoltNull, BoltString, BoltType, ConfigBuilder, Graph, Query};
use serde::Deserialize;
use serde_json::Value;

use assetgraph_core::types::Category;
use assetgraph_core::AssetGraphError;

use crate::engine::{quote_identifier, GraphEngine, Traversal, TraversalKind, TraversalSession, RESULT_COLUMN};

/// Errors from graph operations.
#[derive(Debug, thiserror::Error)]
pub enum GraphError {
    #[error("Neo4j connection error: {0}")]
    Connection(String),

    #[error("Neo4j query error: {0}")]
    Query(#[from] neo4rs::Error),

    #[error("Graph engine error: {0}")]
    Engine(String),

    #[error("Unexpected traversal result: {0}")]
    Decode(String),

    #[error("Invalid graph identifier: {0:?}")]
    InvalidIdentifier(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error(transparent)]
    Domain(#[from] AssetGraphError),
}

impl GraphError {
    /// Whether this error reports a vertex with an incomplete type chain.
    pub fn is_invalid_labels(&self) -> bool {
        matches!(self, Self::Domain(AssetGraphError::InvalidLabels { .. }))
    }
}

impl From<serde_json::Error> for GraphError {
    fn from(e: serde_json::Error) -> Self {
        Self::Decode(e.to_string())
    }
}

/// Configuration for connecting to Neo4j.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GraphConfig {
    pub uri: String,
    pub user: String,
    pub password: String,
    pub max_connections: u32,
    pub fetch_size: usize,
    /// Accept a single `::`-joined label as a type chain when a vertex has
    /// no stored chain. Deprecated compatibility path for records written by
    /// older engines; not expected to be reached in normal operation.
    pub legacy_label_fallback: bool,
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self {
            uri: "bolt://localhost:7687".to_string(),
            user: "neo4j".to_string(),
            password: "assetgraph-dev".to_string(),
            max_connections: 16,
            fetch_size: 256,
            legacy_label_fallback: true,
        }
    }
}

/// Thread-safe Neo4j graph client with connection pooling.
///
/// Clone is cheap (inner Arc).
#[derive(Clone)]
pub struct GraphClient {
    graph: Graph,
}

impl GraphClient {
    /// Connect to Neo4j with the given configuration.
    pub async fn connect(config: &GraphConfig) -> Result<Self, GraphError> {
        let neo_config = ConfigBuilder::default()
            .uri(&config.uri)
            .user(&config.user)
            .password(&config.password)
            .max_connections(config.max_connections as usize)
            .fetch_size(config.fetch_size)
            .build()
            .map_err(|e| GraphError::Connection(e.to_string()))?;

        let graph = Graph::connect(neo_config)
            .await
            .map_err(|e| GraphError::Connection(e.to_string()))?;

        tracing::info!(uri = %config.uri, "Connected to Neo4j");
        Ok(Self { graph })
    }

    /// Get a reference to the underlying neo4rs Graph for direct operations.
    pub fn inner(&self) -> &Graph {
        &self.graph
    }

    /// Create the id lookup indexes for every entity category.
    pub async fn ensure_schema(&self) -> Result<(), GraphError> {
        for category in [Category::Device, Category::Group, Category::Component] {
            let label = quote_identifier(category.label())?;
            let cypher = format!(
                "CREATE INDEX {}_id IF NOT EXISTS FOR (n:{label}) ON (n.id)",
                category.label()
            );
            self.graph.run(neo4rs::query(&cypher)).await?;
        }
        tracing::info!("Ensured entity id indexes");
        Ok(())
    }
}

#[async_trait]
impl GraphEngine for GraphClient {
    type Session = Neo4jSession;

    async fn open(&self) -> Result<Neo4jSession, GraphError> {
        Ok(Neo4jSession {
            graph: self.graph.clone(),
        })
    }
}

/// A traversal source over the pooled Neo4j graph.
///
/// Bolt connections are checked out per statement and returned to the pool
/// by neo4rs, so closing the session has nothing left to release.
pub struct Neo4jSession {
    graph: Graph,
}

#[async_trait]
impl TraversalSession for Neo4jSession {
    async fn submit(&mut self, traversal: Traversal) -> Result<Vec<Value>, GraphError> {
        let q = to_query(&traversal);

        match traversal.kind() {
            TraversalKind::Write => {
                self.graph.run(q).await?;
                Ok(Vec::new())
            }
            TraversalKind::Read => {
                let mut stream = self.graph.execute(q).await?;
                let mut rows = Vec::new();
                while let Some(row) = stream.next().await? {
                    let value: Value = row.get(RESULT_COLUMN).map_err(|e| {
                        GraphError::Decode(format!("Failed to deserialize {RESULT_COLUMN}: {e}"))
                    })?;
                    rows.push(value);
                }
                Ok(rows)
            }
        }
    }

    fn close(&mut self) -> Result<(), GraphError> {
        Ok(())
    }
}

/// Build a neo4rs query from a traversal, binding every parameter.
fn to_query(traversal: &Traversal) -> Query {
    traversal
        .params()
        .iter()
        .fold(neo4rs::query(traversal.text()), |q, (name, value)| {
            q.param(name, to_bolt(value))
        })
}

/// Convert a JSON parameter value into its Bolt representation.
fn to_bolt(value: &Value) -> BoltType {
    match value {
        Value::Null => BoltType::Null(BoltNull),
        Value::Bool(b) => BoltType::from(*b),
        Value::Number(n) => match n.as_i64() {
            Some(i) => BoltType::from(i),
            None => BoltType::from(n.as_f64().unwrap_or_default()),
        },
        Value::String(s) => BoltType::String(BoltString::from(s.as_str())),
        Value::Array(items) => {
            let list: Vec<BoltType> = items.iter().map(to_bolt).collect();
            BoltType::List(BoltList::from(list))
        }
        Value::Object(map) => {
            let mut bolt = BoltMap::new();
            for (key, value) in map {
                bolt.put(BoltString::from(key.as_str()), to_bolt(value));
            }
            BoltType::Map(bolt)
        }
    }
}
