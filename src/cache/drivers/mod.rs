//! Cache driver implementations

pub mod cluster;
pub mod local;
pub mod shared_memory;

pub use cluster::{ClusterDriver, OptionFailure};
pub use local::LocalDriver;
pub use shared_memory::SharedMemoryDriver;

use super::codec::ReadOutcome;
use super::event_log::{CacheOperation, EventReporter};
use crate::error::CacheResult;

/// Report a completed read; misses are normal outcomes, corruption is not
pub(crate) fn report_read(events: &EventReporter, key: &str, outcome: &ReadOutcome) {
    match outcome {
        ReadOutcome::Hit(_) => {
            events.success(CacheOperation::Read, format!("Read cached recordset {key}"))
        }
        ReadOutcome::Miss => events.success(
            CacheOperation::Read,
            format!("No fresh cached recordset for {key}"),
        ),
        ReadOutcome::Corrupted(message) => events.failure(CacheOperation::Read, message.clone()),
    }
}

/// Report a completed write and turn it into the boolean outcome
pub(crate) fn report_write(
    events: &EventReporter,
    key: &str,
    ttl_seconds: u64,
    result: &CacheResult<()>,
) -> bool {
    let failure = match result {
        Ok(()) => String::new(),
        Err(e) => format!("Failed to cache recordset {key}: {e}"),
    };
    events.pair(
        CacheOperation::Write,
        result.is_ok(),
        format!("Cached recordset {key} for {ttl_seconds}s"),
        failure,
    )
}
