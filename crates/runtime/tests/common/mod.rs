#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::json;
use tokio::sync::{mpsc, Semaphore};

use fathom_common::models::QueryResponse;
use fathom_error::{ErrorCode, FathomError};
use fathom_runtime::QueryExecutor;

/// In-memory executor whose behavior per query text is scripted by the test.
///
/// Rows are `[{"query": <text>}]`. A gated query blocks until the test
/// releases it, which lets tests pin a query "in flight".
pub struct ScriptedExecutor {
    calls: Mutex<Vec<String>>,
    gates: Mutex<HashMap<String, Arc<Semaphore>>>,
    failures: Mutex<HashSet<String>>,
    dispatched: mpsc::UnboundedSender<String>,
}

impl ScriptedExecutor {
    pub fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<String>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let executor = Arc::new(Self {
            calls: Mutex::new(Vec::new()),
            gates: Mutex::new(HashMap::new()),
            failures: Mutex::new(HashSet::new()),
            dispatched: tx,
        });
        (executor, rx)
    }

    /// Block every execution of `query` until released through the returned gate.
    pub fn gate(&self, query: &str) -> Gate {
        let semaphore = Arc::new(Semaphore::new(0));
        self.gates
            .lock()
            .insert(query.to_string(), semaphore.clone());
        Gate(semaphore)
    }

    pub fn fail(&self, query: &str) {
        self.failures.lock().insert(query.to_string());
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }

    pub fn call_count(&self, query: &str) -> usize {
        self.calls.lock().iter().filter(|q| *q == query).count()
    }
}

pub struct Gate(Arc<Semaphore>);

impl Gate {
    /// Let `n` blocked (or future) executions through.
    pub fn release(&self, n: usize) {
        self.0.add_permits(n);
    }
}

#[async_trait]
impl QueryExecutor for ScriptedExecutor {
    async fn execute(&self, query: &str) -> fathom_error::Result<serde_json::Value> {
        self.calls.lock().push(query.to_string());
        let _ = self.dispatched.send(query.to_string());

        let gate = self.gates.lock().get(query).cloned();
        if let Some(gate) = gate {
            gate.acquire().await.unwrap().forget();
        }

        if self.failures.lock().contains(query) {
            return Err(FathomError::new(ErrorCode::QueryFailed, "scripted failure"));
        }
        Ok(json!([{ "query": query }]))
    }
}

pub async fn recv(rx: &mut mpsc::UnboundedReceiver<QueryResponse>) -> QueryResponse {
    tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("timed out waiting for a response")
        .expect("response channel closed")
}

/// Assert nothing arrives for a while.
pub async fn assert_silent(rx: &mut mpsc::UnboundedReceiver<QueryResponse>) {
    if let Ok(Some(response)) = tokio::time::timeout(Duration::from_millis(100), rx.recv()).await {
        panic!("unexpected response: {:?}", response);
    }
}

pub async fn next_dispatch(dispatched: &mut mpsc::UnboundedReceiver<String>) -> String {
    tokio::time::timeout(Duration::from_secs(5), dispatched.recv())
        .await
        .expect("timed out waiting for a dispatch")
        .expect("executor dropped")
}
