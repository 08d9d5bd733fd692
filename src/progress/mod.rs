//! Run ledger: durable history of batch runs and their per-entry events.

pub mod event;
pub mod store;

pub use event::{EntryEventData, RunEvent, RunStatus};
pub use store::{RunLedger, RunRecord};

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

static RUN_COUNTER: AtomicU64 = AtomicU64::new(1);

pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// Sortable, process-unique run id: `run-{millis}-{pid}-{counter}`.
pub fn new_run_id() -> String {
    let seq = RUN_COUNTER.fetch_add(1, Ordering::Relaxed);
    format!("run-{:013}-{}-{}", now_millis(), std::process::id(), seq)
}
