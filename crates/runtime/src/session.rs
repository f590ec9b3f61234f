//! Per-connection session state and its query scheduler.
//!
//! Each connected client owns one scheduler task. The task is the only owner
//! of the session's pending queue and cancellation flags, so it needs no
//! locking: submissions, cancellations and executor completions all arrive as
//! events on one inbox and are handled to completion one at a time.
//!
//! The scheduler keeps at most one executor call in flight per session
//! (the executor slot). Sessions do not coordinate with each other; two
//! sessions may run the same novel query concurrently.
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use fathom_common::models::{QueryResponse, QueryResult};
use fathom_common::telemetry::{ERRORS_TARGET, QUERIES_TARGET};
use fathom_error::{ErrorCode, FathomError};

use crate::broker::{BrokerSettings, BrokerShared};
use crate::metrics;
use crate::prefetch::PrefetchReplayer;

pub type ConnectionId = u64;

pub(crate) enum SessionEvent {
    Submit(String),
    Cancel(String),
    Completed {
        query: String,
        elapsed: Duration,
        result: QueryResult,
        success: bool,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Slot {
    Idle,
    Dispatching,
}

/// Handle held by the transport for one connected client.
///
/// Dropping the handle (or calling [`SessionHandle::close`]) stops the
/// scheduler and the prefetch replayer and discards the pending queue. A query
/// already running on the engine still completes and populates the cache.
pub struct SessionHandle {
    id: ConnectionId,
    events: mpsc::UnboundedSender<SessionEvent>,
    scheduler: JoinHandle<()>,
    replayer: PrefetchReplayer,
    shared: Arc<BrokerShared>,
}

impl SessionHandle {
    pub(crate) fn open(
        id: ConnectionId,
        shared: Arc<BrokerShared>,
        settings: &BrokerSettings,
    ) -> (Self, mpsc::UnboundedReceiver<QueryResponse>) {
        let (responses_tx, responses_rx) = mpsc::unbounded_channel();
        let (events_tx, events_rx) = mpsc::unbounded_channel();

        // Only queries logged before this point are replayed.
        let snapshot_len = shared.log.snapshot_len();

        let scheduler = SessionScheduler {
            id,
            connected_at: Instant::now(),
            shared: shared.clone(),
            queue: VecDeque::new(),
            cancelled: HashMap::new(),
            slot: Slot::Idle,
            events: events_tx.clone(),
            responses: responses_tx.clone(),
        };
        let scheduler = tokio::spawn(scheduler.run(events_rx));

        let replayer = PrefetchReplayer::spawn(
            id,
            shared.clone(),
            snapshot_len,
            settings.prefetch_interval,
            responses_tx,
        );

        shared.active_sessions.fetch_add(1, Ordering::Relaxed);
        metrics::ACTIVE_SESSIONS.inc();
        info!(connection_id = id, prefetch = snapshot_len, "Client connected");

        let handle = Self {
            id,
            events: events_tx,
            scheduler,
            replayer,
            shared,
        };
        (handle, responses_rx)
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// Number of logged queries this session replays as prefetch.
    pub fn prefetch_len(&self) -> usize {
        self.replayer.snapshot_len()
    }

    /// Request `query`. Answered from the cache when possible, otherwise queued.
    pub fn submit(&self, query: impl Into<String>) -> fathom_error::Result<()> {
        self.send(SessionEvent::Submit(query.into()))
    }

    /// Mark every pending occurrence of `query` as cancelled.
    ///
    /// Only takes effect for occurrences still queued; a query already running
    /// on the engine is answered anyway.
    pub fn cancel(&self, query: impl Into<String>) -> fathom_error::Result<()> {
        self.send(SessionEvent::Cancel(query.into()))
    }

    pub fn close(self) {}

    fn send(&self, event: SessionEvent) -> fathom_error::Result<()> {
        self.events.send(event).map_err(|_| {
            FathomError::new(ErrorCode::SessionClosed, "Session scheduler has stopped")
                .with_trace_id(self.id.to_string())
        })
    }
}

impl Drop for SessionHandle {
    fn drop(&mut self) {
        self.scheduler.abort();
        self.replayer.stop();
        self.shared.active_sessions.fetch_sub(1, Ordering::Relaxed);
        metrics::ACTIVE_SESSIONS.dec();
        info!(connection_id = self.id, "Client disconnected");
    }
}

struct SessionScheduler {
    id: ConnectionId,
    connected_at: Instant,
    shared: Arc<BrokerShared>,
    queue: VecDeque<String>,
    /// Keyed by query text: one flag covers every queued occurrence.
    /// Holds exactly the texts currently in `queue`.
    cancelled: HashMap<String, bool>,
    slot: Slot,
    events: mpsc::UnboundedSender<SessionEvent>,
    responses: mpsc::UnboundedSender<QueryResponse>,
}

impl SessionScheduler {
    async fn run(mut self, mut inbox: mpsc::UnboundedReceiver<SessionEvent>) {
        while let Some(event) = inbox.recv().await {
            match event {
                SessionEvent::Submit(query) => self.submit(query).await,
                SessionEvent::Cancel(query) => self.cancel(query),
                SessionEvent::Completed {
                    query,
                    elapsed,
                    result,
                    success,
                } => self.complete(query, elapsed, result, success),
            }
        }
    }

    async fn submit(&mut self, query: String) {
        metrics::QUERIES_TOTAL.inc();

        if let Some(result) = self.shared.cache.get(&query).await {
            metrics::CACHE_HITS_TOTAL.inc();
            info!(
                target: QUERIES_TARGET,
                connection_id = self.id,
                query = %query,
                duration_ms = 0u64,
                cache_hit = true,
                prefetch = false,
                success = true,
            );
            self.respond(QueryResponse::cache_hit(query, result));
            return;
        }

        self.cancelled.insert(query.clone(), false);
        self.queue.push_back(query);
        self.drain();
    }

    fn cancel(&mut self, query: String) {
        debug!(connection_id = self.id, query = %query, "Cancel requested");
        // Only queued text has a flag; anything else is in flight, done or unknown.
        if let Some(flag) = self.cancelled.get_mut(&query) {
            *flag = true;
        }
    }

    /// Dispatch the next non-cancelled query if the executor slot is free.
    fn drain(&mut self) {
        if self.slot == Slot::Dispatching {
            return;
        }
        while let Some(query) = self.queue.pop_front() {
            let is_cancelled = if self.queue.contains(&query) {
                self.cancelled.get(&query).copied().unwrap_or(false)
            } else {
                // Last queued occurrence: the flag is no longer needed.
                self.cancelled.remove(&query).unwrap_or(false)
            };
            if is_cancelled {
                metrics::CANCELLED_QUERIES_TOTAL.inc();
                debug!(connection_id = self.id, query = %query, "Dropping cancelled query");
                continue;
            }
            self.dispatch(query);
            return;
        }
    }

    fn dispatch(&mut self, query: String) {
        self.slot = Slot::Dispatching;
        metrics::EXECUTOR_CALLS_TOTAL.inc();

        let shared = self.shared.clone();
        let events = self.events.clone();
        let id = self.id;

        tokio::spawn(async move {
            let started = Instant::now();
            let outcome = shared.executor.execute(&query).await;
            let elapsed = started.elapsed();

            let (result, success) = match outcome {
                Ok(rows) => (Arc::new(rows), true),
                Err(e) => {
                    metrics::EXECUTOR_FAILURES_TOTAL.inc();
                    warn!(
                        target: ERRORS_TARGET,
                        connection_id = id,
                        query = %query,
                        code = %e.code,
                        error = %e,
                        "Engine error"
                    );
                    // Failed queries are answered and cached with a null result.
                    (Arc::new(serde_json::Value::Null), false)
                }
            };

            shared.record_completion(&query, result.clone()).await;

            // The session may be gone by now; the result stays cached.
            let _ = events.send(SessionEvent::Completed {
                query,
                elapsed,
                result,
                success,
            });
        });
    }

    fn complete(&mut self, query: String, elapsed: Duration, result: QueryResult, success: bool) {
        self.slot = Slot::Idle;
        self.drain();

        let query_time_ms = elapsed.as_secs_f64() * 1000.0;
        info!(
            target: QUERIES_TARGET,
            connection_id = self.id,
            query = %query,
            duration_ms = elapsed.as_millis() as u64,
            since_connect_ms = self.connected_at.elapsed().as_millis() as u64,
            cache_hit = false,
            prefetch = false,
            success,
        );
        self.respond(QueryResponse::executed(query, query_time_ms, result));
    }

    fn respond(&self, response: QueryResponse) {
        if self.responses.send(response).is_err() {
            debug!(connection_id = self.id, "Client gone, dropping response");
        }
    }
}
