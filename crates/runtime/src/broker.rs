use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::mpsc;

use fathom_common::config::BrokerConfig;
use fathom_common::models::{QueryResponse, QueryResult};

use crate::cache::ResultCache;
use crate::executor::QueryExecutor;
use crate::metrics;
use crate::query_log::QueryLog;
use crate::session::SessionHandle;

/// Tunables for session behavior.
#[derive(Debug, Clone)]
pub struct BrokerSettings {
    /// Delay before each prefetch replay.
    pub prefetch_interval: Duration,
}

impl Default for BrokerSettings {
    fn default() -> Self {
        Self {
            prefetch_interval: Duration::from_millis(5),
        }
    }
}

impl From<&BrokerConfig> for BrokerSettings {
    fn from(config: &BrokerConfig) -> Self {
        Self {
            prefetch_interval: config.prefetch_interval(),
        }
    }
}

/// State shared by every session of one broker.
pub(crate) struct BrokerShared {
    pub(crate) cache: ResultCache,
    pub(crate) log: QueryLog,
    pub(crate) executor: Arc<dyn QueryExecutor>,
    pub(crate) active_sessions: AtomicUsize,
}

impl BrokerShared {
    /// Store the outcome of an engine call.
    ///
    /// Only the first completion of a query text is cached and logged, so the
    /// cache and the log always agree on which queries are known.
    pub(crate) async fn record_completion(&self, query: &str, result: QueryResult) {
        if self.cache.put(query, result).await && self.log.record_if_new(query) {
            metrics::QUERY_LOG_LENGTH.set(self.log.snapshot_len() as i64);
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BrokerStats {
    pub cached_entries: u64,
    pub log_length: usize,
    pub active_sessions: usize,
}

/// Entry point for connecting clients to the shared cache and engine.
pub struct QueryBroker {
    shared: Arc<BrokerShared>,
    settings: BrokerSettings,
    next_id: AtomicU64,
}

impl QueryBroker {
    pub fn new(executor: Arc<dyn QueryExecutor>, settings: BrokerSettings) -> Self {
        Self {
            shared: Arc::new(BrokerShared {
                cache: ResultCache::new(),
                log: QueryLog::new(),
                executor,
                active_sessions: AtomicUsize::new(0),
            }),
            settings,
            next_id: AtomicU64::new(0),
        }
    }

    /// Open a session for a newly connected client.
    ///
    /// The returned receiver yields every response destined for the client,
    /// starting with the prefetch replay of all queries logged so far.
    pub fn connect(&self) -> (SessionHandle, mpsc::UnboundedReceiver<QueryResponse>) {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        SessionHandle::open(id, self.shared.clone(), &self.settings)
    }

    pub fn cache(&self) -> &ResultCache {
        &self.shared.cache
    }

    pub fn query_log(&self) -> &QueryLog {
        &self.shared.log
    }

    pub fn settings(&self) -> &BrokerSettings {
        &self.settings
    }

    pub async fn stats(&self) -> BrokerStats {
        BrokerStats {
            cached_entries: self.shared.cache.entry_count().await,
            log_length: self.shared.log.snapshot_len(),
            active_sessions: self.shared.active_sessions.load(Ordering::Relaxed),
        }
    }
}
