use axum::{extract::State, routing::get, Json, Router};

use fathom_runtime::BrokerStats;

use crate::AppState;

pub fn create_api_router(state: AppState) -> Router {
    Router::new()
        .route("/stats", get(broker_stats))
        .route("/queries", get(list_queries))
        .with_state(state)
}

async fn broker_stats(State(state): State<AppState>) -> Json<BrokerStats> {
    Json(state.broker.stats().await)
}

/// The global query log in completion order.
async fn list_queries(State(state): State<AppState>) -> Json<Vec<String>> {
    let queries = state
        .broker
        .query_log()
        .entries()
        .iter()
        .map(|q| q.to_string())
        .collect();
    Json(queries)
}
