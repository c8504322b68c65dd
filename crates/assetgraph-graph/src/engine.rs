//! The graph engine seam: traversal statements, engine/session traits, and
//! the connection scope every DAO operation runs inside.

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde_json::Value;

use crate::client::GraphError;

/// Column every read traversal projects its rows into.
pub const RESULT_COLUMN: &str = "result";

/// Whether a traversal only reads or also mutates the graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TraversalKind {
    Read,
    Write,
}

/// A single composed statement submitted to the engine as one unit.
///
/// Values are always bound as named parameters; only identifiers quoted by
/// [`quote_identifier`] are spliced into the text.
#[derive(Debug, Clone, PartialEq)]
pub struct Traversal {
    kind: TraversalKind,
    text: String,
    params: BTreeMap<String, Value>,
    seq: usize,
}

impl Traversal {
    pub fn read(text: impl Into<String>) -> Self {
        Self::new(TraversalKind::Read, text)
    }

    pub fn write(text: impl Into<String>) -> Self {
        Self::new(TraversalKind::Write, text)
    }

    fn new(kind: TraversalKind, text: impl Into<String>) -> Self {
        Self {
            kind,
            text: text.into(),
            params: BTreeMap::new(),
            seq: 0,
        }
    }

    /// Bind a named parameter, builder style.
    pub fn param(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.bind(name, value);
        self
    }

    pub fn bind(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        self.params.insert(name.into(), value.into());
    }

    /// Bind a value under a fresh `{prefix}{n}` name and return that name.
    pub fn bind_next(&mut self, prefix: &str, value: impl Into<Value>) -> String {
        let name = format!("{prefix}{}", self.seq);
        self.seq += 1;
        self.bind(name.clone(), value);
        name
    }

    /// Append a clause on its own line.
    pub fn push(&mut self, clause: impl AsRef<str>) {
        if !self.text.is_empty() {
            self.text.push('\n');
        }
        self.text.push_str(clause.as_ref());
    }

    pub fn kind(&self) -> TraversalKind {
        self.kind
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn params(&self) -> &BTreeMap<String, Value> {
        &self.params
    }

    pub fn param_value(&self, name: &str) -> Option<&Value> {
        self.params.get(name)
    }
}

/// Quote a label, relationship type, or property key for splicing into a
/// statement.
pub fn quote_identifier(name: &str) -> Result<String, GraphError> {
    if name.is_empty() {
        return Err(GraphError::InvalidIdentifier(name.to_string()));
    }
    Ok(format!("`{}`", name.replace('`', "``")))
}

/// A backing graph engine able to hand out traversal sessions.
#[async_trait]
pub trait GraphEngine: Send + Sync {
    type Session: TraversalSession;

    /// Acquire a traversal source for one operation.
    async fn open(&self) -> Result<Self::Session, GraphError>;
}

/// A traversal source acquired for the duration of one operation.
#[async_trait]
pub trait TraversalSession: Send {
    /// Submit one traversal. Read traversals return one value per row.
    async fn submit(&mut self, traversal: Traversal) -> Result<Vec<Value>, GraphError>;

    /// Release the traversal source.
    fn close(&mut self) -> Result<(), GraphError>;
}

/// Scoped ownership of a traversal session.
///
/// The session is released exactly once when the scope is dropped, on every
/// exit path. A failed release is logged and never replaces the outcome of
/// the operation that ran inside the scope.
pub struct ConnectionScope<S: TraversalSession> {
    session: Option<S>,
    operation: &'static str,
}

impl<S: TraversalSession> ConnectionScope<S> {
    pub async fn open<E>(engine: &E, operation: &'static str) -> Result<Self, GraphError>
    where
        E: GraphEngine<Session = S>,
    {
        let session = engine.open().await?;
        Ok(Self {
            session: Some(session),
            operation,
        })
    }

    /// Open a scope, submit a single traversal, and release the scope.
    pub async fn run<E>(
        engine: &E,
        operation: &'static str,
        traversal: Traversal,
    ) -> Result<Vec<Value>, GraphError>
    where
        E: GraphEngine<Session = S>,
    {
        let mut scope = Self::open(engine, operation).await?;
        scope.submit(traversal).await
    }

    pub async fn submit(&mut self, traversal: Traversal) -> Result<Vec<Value>, GraphError> {
        tracing::trace!(operation = self.operation, traversal = %traversal.text(), "Submitting traversal");
        let session = self
            .session
            .as_mut()
            .ok_or_else(|| GraphError::Engine(format!("{}: session already released", self.operation)))?;
        session.submit(traversal).await
    }

    fn release(&mut self) {
        if let Some(mut session) = self.session.take() {
            if let Err(e) = session.close() {
                tracing::warn!(operation = self.operation, error = %e, "Failed to release traversal source");
            }
        }
    }
}

impl<S: TraversalSession> Drop for ConnectionScope<S> {
    fn drop(&mut self) {
        self.release();
    }
}
