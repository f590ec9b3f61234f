//! Wire models exchanged with dashboard clients.
//!
//! Every frame on the socket is an event envelope `{"event": <name>, "data": <payload>}`.
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Rows produced by the engine: a JSON array of objects keyed by column name.
/// A failed execution is represented by `null`.
pub type QueryResult = Arc<serde_json::Value>;

/// Payload of the `query-response` event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryResponse {
    pub query_str: String,
    /// Milliseconds spent in the engine, `0` when served from cache.
    pub query_time: f64,
    pub result: QueryResult,
    pub cache_hit: bool,
    pub prefetch: bool,
}

impl QueryResponse {
    /// A response answered from the result cache at the client's request.
    pub fn cache_hit(query_str: impl Into<String>, result: QueryResult) -> Self {
        Self {
            query_str: query_str.into(),
            query_time: 0.0,
            result,
            cache_hit: true,
            prefetch: false,
        }
    }

    /// An unsolicited replay of a previously computed result.
    pub fn prefetch(query_str: impl Into<String>, result: QueryResult) -> Self {
        Self {
            prefetch: true,
            ..Self::cache_hit(query_str, result)
        }
    }

    /// A response produced by running the query on the engine.
    pub fn executed(query_str: impl Into<String>, query_time_ms: f64, result: QueryResult) -> Self {
        Self {
            query_str: query_str.into(),
            query_time: query_time_ms,
            result,
            cache_hit: false,
            prefetch: false,
        }
    }
}

/// Events sent by the dashboard.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "kebab-case")]
pub enum ClientEvent {
    Query(String),
    Cancel(String),
}

/// Events pushed to the dashboard.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "kebab-case")]
pub enum ServerEvent {
    QueryResponse(QueryResponse),
}

#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    #[error("frame is not a valid event: {0}")]
    InvalidJson(#[from] serde_json::Error),
}

impl ClientEvent {
    pub fn decode(text: &str) -> Result<Self, FrameError> {
        Ok(serde_json::from_str(text)?)
    }
}

impl ServerEvent {
    pub fn encode(&self) -> Result<String, FrameError> {
        Ok(serde_json::to_string(self)?)
    }
}
