//! Prometheus metrics for the query broker.
use once_cell::sync::Lazy;
use prometheus::{IntCounter, IntGauge, Opts, Registry};

// Global metrics registry
pub static REGISTRY: Lazy<Registry> = Lazy::new(Registry::new);

fn counter(name: &str, help: &str) -> IntCounter {
    let counter = IntCounter::with_opts(Opts::new(name, help)).unwrap();
    REGISTRY.register(Box::new(counter.clone())).unwrap();
    counter
}

fn gauge(name: &str, help: &str) -> IntGauge {
    let gauge = IntGauge::with_opts(Opts::new(name, help)).unwrap();
    REGISTRY.register(Box::new(gauge.clone())).unwrap();
    gauge
}

pub static QUERIES_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    counter("fathom_queries_total", "Total number of queries submitted by clients")
});

pub static CACHE_HITS_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    counter(
        "fathom_cache_hits_total",
        "Submitted queries answered from the result cache",
    )
});

pub static EXECUTOR_CALLS_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    counter("fathom_executor_calls_total", "Queries dispatched to the engine")
});

pub static EXECUTOR_FAILURES_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    counter("fathom_executor_failures_total", "Engine calls that returned an error")
});

pub static PREFETCH_RESPONSES_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    counter(
        "fathom_prefetch_responses_total",
        "Cached results replayed to newly connected clients",
    )
});

pub static CANCELLED_QUERIES_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    counter(
        "fathom_cancelled_queries_total",
        "Queued queries dropped because they were cancelled",
    )
});

pub static ACTIVE_SESSIONS: Lazy<IntGauge> =
    Lazy::new(|| gauge("fathom_active_sessions", "Currently connected clients"));

pub static QUERY_LOG_LENGTH: Lazy<IntGauge> = Lazy::new(|| {
    gauge(
        "fathom_query_log_length",
        "Distinct queries completed since startup",
    )
});

/// Touch every metric so it shows up in the first scrape.
pub fn register_all() {
    Lazy::force(&QUERIES_TOTAL);
    Lazy::force(&CACHE_HITS_TOTAL);
    Lazy::force(&EXECUTOR_CALLS_TOTAL);
    Lazy::force(&EXECUTOR_FAILURES_TOTAL);
    Lazy::force(&PREFETCH_RESPONSES_TOTAL);
    Lazy::force(&CANCELLED_QUERIES_TOTAL);
    Lazy::force(&ACTIVE_SESSIONS);
    Lazy::force(&QUERY_LOG_LENGTH);
}
