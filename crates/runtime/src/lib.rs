//! Fathom Runtime: the query broker shared by every connected dashboard.
//!
//! Many clients issue ad-hoc analytical queries against one read-only DuckDB
//! database. The broker makes sure identical work is done once and that one
//! slow client cannot starve the others.
//!
//! # Architecture
//!
//! ```text
//!   client ──submit/cancel──► SessionHandle ──► session scheduler (one per client)
//!                                                   │  cache hit? ──► ResultCache
//!                                                   │  miss ────────► QueryExecutor (DuckDB)
//!                                                   ▼
//!                              ResultCache + QueryLog (process-wide)
//!                                                   ▲
//!   new client ◄──prefetch──── PrefetchReplayer ────┘
//! ```
//!
//! # Query Lifecycle
//!
//! 1. `SessionHandle::submit(sql)` called.
//! 2. **Cache check**: a cached result is answered immediately (`cacheHit = true`).
//! 3. **Queueing**: otherwise the query joins the session's FIFO queue.
//! 4. **Drain**: when the session has nothing in flight, the head of the queue is
//!    popped; cancelled entries are dropped silently.
//! 5. **Execution**: the executor runs the query; the first completion of a
//!    query text is stored in the cache and appended to the query log.
//! 6. **Response**: the result is delivered to the requesting session.
//!
//! A newly connected session replays every query logged before it connected,
//! oldest first, without being asked.

pub mod bootstrap;
pub mod broker;
pub mod cache;
pub mod engine;
pub mod executor;
pub mod metrics;
pub mod prefetch;
pub mod query_log;
pub mod session;

pub use broker::{BrokerSettings, BrokerStats, QueryBroker};
pub use cache::ResultCache;
pub use engine::DuckDbExecutor;
pub use executor::QueryExecutor;
pub use query_log::QueryLog;
pub use session::{ConnectionId, SessionHandle};
