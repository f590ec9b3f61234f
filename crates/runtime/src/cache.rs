use moka::future::Cache;
use tracing::debug;

use fathom_common::models::QueryResult;

/// Process-wide query result cache keyed by the literal query text.
///
/// The backing dataset is read-only for the lifetime of the process, so
/// entries have no TTL, no size bound and are never evicted. The first
/// result written for a query text wins; later writes are ignored.
#[derive(Clone)]
pub struct ResultCache {
    entries: Cache<String, QueryResult>,
}

impl Default for ResultCache {
    fn default() -> Self {
        Self::new()
    }
}

impl ResultCache {
    pub fn new() -> Self {
        // No max_capacity and no time_to_live: moka never evicts.
        Self {
            entries: Cache::builder().name("fathom-results").build(),
        }
    }

    pub fn has(&self, query: &str) -> bool {
        self.entries.contains_key(query)
    }

    pub async fn get(&self, query: &str) -> Option<QueryResult> {
        let hit = self.entries.get(query).await;
        if hit.is_some() {
            debug!(target: "cache", query, "Cache hit");
        }
        hit
    }

    /// Store `result` unless the query already has an entry.
    ///
    /// Returns `true` when this call created the entry.
    pub async fn put(&self, query: &str, result: QueryResult) -> bool {
        let entry = self.entries.entry_by_ref(query).or_insert(result).await;
        if entry.is_fresh() {
            debug!(target: "cache", query, "Cached query result");
        }
        entry.is_fresh()
    }

    pub async fn entry_count(&self) -> u64 {
        self.entries.run_pending_tasks().await;
        self.entries.entry_count()
    }
}
