//! Replay of previously computed results to a newly connected client.
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use fathom_common::models::QueryResponse;
use fathom_common::telemetry::QUERIES_TARGET;

use crate::broker::BrokerShared;
use crate::metrics;
use crate::session::ConnectionId;

/// Background task pushing the first `snapshot_len` query log entries to one
/// session, oldest first, one every `interval`.
///
/// Queries logged after the session connected are never replayed to it. The
/// task stops early when the session goes away.
pub struct PrefetchReplayer {
    task: JoinHandle<()>,
    snapshot_len: usize,
}

impl PrefetchReplayer {
    pub(crate) fn spawn(
        id: ConnectionId,
        shared: Arc<BrokerShared>,
        snapshot_len: usize,
        interval: Duration,
        responses: mpsc::UnboundedSender<QueryResponse>,
    ) -> Self {
        let task = tokio::spawn(replay(id, shared, snapshot_len, interval, responses));
        Self { task, snapshot_len }
    }

    pub fn snapshot_len(&self) -> usize {
        self.snapshot_len
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    pub fn stop(&self) {
        self.task.abort();
    }
}

impl Drop for PrefetchReplayer {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn replay(
    id: ConnectionId,
    shared: Arc<BrokerShared>,
    snapshot_len: usize,
    interval: Duration,
    responses: mpsc::UnboundedSender<QueryResponse>,
) {
    for index in 0..snapshot_len {
        tokio::time::sleep(interval).await;

        let Some(query) = shared.log.at(index) else {
            break;
        };
        let Some(result) = shared.cache.get(&query).await else {
            warn!(connection_id = id, query = %query, "Logged query missing from cache");
            continue;
        };

        info!(
            target: QUERIES_TARGET,
            connection_id = id,
            query = %query,
            duration_ms = 0u64,
            cache_hit = true,
            prefetch = true,
            success = true,
        );
        if responses
            .send(QueryResponse::prefetch(query.to_string(), result))
            .is_err()
        {
            debug!(connection_id = id, "Client gone, stopping prefetch");
            return;
        }
        metrics::PREFETCH_RESPONSES_TOTAL.inc();
    }

    if snapshot_len > 0 {
        debug!(connection_id = id, replayed = snapshot_len, "Prefetch finished");
    }
}
