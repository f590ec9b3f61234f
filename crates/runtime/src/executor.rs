use async_trait::async_trait;

/// Runs one query against the shared analytical engine.
///
/// A single executor is shared by the whole process. Sessions call it
/// concurrently; each session keeps at most one call in flight, and the
/// implementation is responsible for safe interleaving across sessions.
#[async_trait]
pub trait QueryExecutor: Send + Sync {
    /// Yields the result rows as a JSON array of objects keyed by column name.
    async fn execute(&self, query: &str) -> fathom_error::Result<serde_json::Value>;
}
