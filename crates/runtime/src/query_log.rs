use std::collections::HashSet;
use std::sync::Arc;

use parking_lot::RwLock;

/// Append-only record of every distinct query text whose first execution has
/// completed, in completion order. New sessions replay it as prefetch.
#[derive(Default)]
pub struct QueryLog {
    state: RwLock<LogState>,
}

#[derive(Default)]
struct LogState {
    order: Vec<Arc<str>>,
    seen: HashSet<Arc<str>>,
}

impl QueryLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `query` unless it is already present. Returns `true` if appended.
    pub fn record_if_new(&self, query: &str) -> bool {
        let mut state = self.state.write();
        if state.seen.contains(query) {
            return false;
        }
        let entry: Arc<str> = Arc::from(query);
        state.seen.insert(entry.clone());
        state.order.push(entry);
        true
    }

    pub fn snapshot_len(&self) -> usize {
        self.state.read().order.len()
    }

    pub fn at(&self, index: usize) -> Option<Arc<str>> {
        self.state.read().order.get(index).cloned()
    }

    pub fn entries(&self) -> Vec<Arc<str>> {
        self.state.read().order.clone()
    }
}
