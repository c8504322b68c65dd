//! Recording mock implementation of the graph engine for testing.
//!
//! Captures every submitted traversal and replays queued responses in order.
//! Submissions with nothing queued succeed with no rows.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use serde_json::Value;

use crate::client::GraphError;
use crate::engine::{GraphEngine, Traversal, TraversalSession};

#[derive(Default)]
struct MockState {
    submitted: Vec<Traversal>,
    responses: VecDeque<Result<Vec<Value>, String>>,
    opened: usize,
    closed: usize,
    fail_close: bool,
}

/// In-memory engine that records traversals instead of executing them.
#[derive(Clone, Default)]
pub struct RecordingEngine {
    state: Arc<Mutex<MockState>>,
}

impl RecordingEngine {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Queue the rows returned by the next submission.
    pub fn respond(&self, rows: Vec<Value>) {
        self.state().responses.push_back(Ok(rows));
    }

    /// Queue an engine failure for the next submission.
    pub fn fail(&self, message: &str) {
        self.state().responses.push_back(Err(message.to_string()));
    }

    /// Make every session close report an error.
    pub fn fail_on_close(&self) {
        self.state().fail_close = true;
    }

    pub fn submitted(&self) -> Vec<Traversal> {
        self.state().submitted.clone()
    }

    /// The most recent traversal. Panics if nothing was submitted.
    pub fn last(&self) -> Traversal {
        self.state()
            .submitted
            .last()
            .cloned()
            .expect("no traversal submitted")
    }

    pub fn opened(&self) -> usize {
        self.state().opened
    }

    pub fn closed(&self) -> usize {
        self.state().closed
    }
}

#[async_trait]
impl GraphEngine for RecordingEngine {
    type Session = RecordingSession;

    async fn open(&self) -> Result<RecordingSession, GraphError> {
        self.state().opened += 1;
        Ok(RecordingSession {
            state: Arc::clone(&self.state),
        })
    }
}

pub struct RecordingSession {
    state: Arc<Mutex<MockState>>,
}

impl RecordingSession {
    fn state(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl TraversalSession for RecordingSession {
    async fn submit(&mut self, traversal: Traversal) -> Result<Vec<Value>, GraphError> {
        let mut state = self.state();
        state.submitted.push(traversal);
        match state.responses.pop_front() {
            Some(Ok(rows)) => Ok(rows),
            Some(Err(message)) => Err(GraphError::Engine(message)),
            None => Ok(Vec::new()),
        }
    }

    fn close(&mut self) -> Result<(), GraphError> {
        let mut state = self.state();
        state.closed += 1;
        if state.fail_close {
            return Err(GraphError::Engine("close failed".to_string()));
        }
        Ok(())
    }
}
