//! Outcome reporting for cache operations
//!
//! Every connect/read/write/flush outcome is handed to an injected [`EventLog`]
//! as a [`LogPair`]: the success flag plus the message to use either way. The
//! drivers never format or route log output themselves.

use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Operation a log pair describes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CacheOperation {
    Connect,
    Authenticate,
    SelectDatabase,
    ClientOption,
    Read,
    Write,
    Flush,
    FlushAll,
    Info,
}

impl CacheOperation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Connect => "connect",
            Self::Authenticate => "authenticate",
            Self::SelectDatabase => "select_database",
            Self::ClientOption => "client_option",
            Self::Read => "read",
            Self::Write => "write",
            Self::Flush => "flush",
            Self::FlushAll => "flush_all",
            Self::Info => "info",
        }
    }
}

impl fmt::Display for CacheOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One reported outcome
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogPair {
    pub service: &'static str,
    pub operation: CacheOperation,
    pub success: bool,
    pub success_message: String,
    pub failure_message: String,
}

impl LogPair {
    /// The message matching the outcome
    pub fn message(&self) -> &str {
        if self.success {
            &self.success_message
        } else {
            &self.failure_message
        }
    }
}

/// Sink for cache outcomes
pub trait EventLog: Send + Sync + fmt::Debug {
    fn record(&self, pair: &LogPair);
}

/// Default sink: forwards outcomes to `tracing`
///
/// Failures are warnings. Successes are `debug` events unless `verbose` is set,
/// in which case they are `info`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingEventLog {
    verbose: bool,
}

impl TracingEventLog {
    pub fn new(verbose: bool) -> Self {
        Self { verbose }
    }
}

impl EventLog for TracingEventLog {
    fn record(&self, pair: &LogPair) {
        match (pair.success, self.verbose) {
            (false, _) => warn!(
                service = pair.service,
                operation = %pair.operation,
                "{}",
                pair.failure_message
            ),
            (true, true) => info!(
                service = pair.service,
                operation = %pair.operation,
                "{}",
                pair.success_message
            ),
            (true, false) => debug!(
                service = pair.service,
                operation = %pair.operation,
                "{}",
                pair.success_message
            ),
        }
    }
}

/// Sink that keeps every outcome in memory
///
/// Used by tests and by hosts that want to inspect cache behavior after the fact.
#[derive(Debug, Default)]
pub struct RecordingEventLog {
    pairs: Mutex<Vec<LogPair>>,
}

impl RecordingEventLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pairs(&self) -> Vec<LogPair> {
        self.pairs.lock().clone()
    }

    pub fn failures(&self) -> Vec<LogPair> {
        self.pairs
            .lock()
            .iter()
            .filter(|p| !p.success)
            .cloned()
            .collect()
    }

    pub fn for_operation(&self, operation: CacheOperation) -> Vec<LogPair> {
        self.pairs
            .lock()
            .iter()
            .filter(|p| p.operation == operation)
            .cloned()
            .collect()
    }

    pub fn last(&self) -> Option<LogPair> {
        self.pairs.lock().last().cloned()
    }

    pub fn clear(&self) {
        self.pairs.lock().clear();
    }
}

impl EventLog for RecordingEventLog {
    fn record(&self, pair: &LogPair) {
        self.pairs.lock().push(pair.clone());
    }
}

/// Driver-side helper binding a sink to one service name
#[derive(Debug, Clone)]
pub(crate) struct EventReporter {
    service: &'static str,
    log: Arc<dyn EventLog>,
}

impl EventReporter {
    pub(crate) fn new(service: &'static str, log: Arc<dyn EventLog>) -> Self {
        Self { service, log }
    }

    /// Record an outcome and hand the success flag back to the caller
    pub(crate) fn pair(
        &self,
        operation: CacheOperation,
        success: bool,
        success_message: impl Into<String>,
        failure_message: impl Into<String>,
    ) -> bool {
        self.log.record(&LogPair {
            service: self.service,
            operation,
            success,
            success_message: success_message.into(),
            failure_message: failure_message.into(),
        });
        success
    }

    pub(crate) fn success(&self, operation: CacheOperation, message: impl Into<String>) {
        self.pair(operation, true, message, String::new());
    }

    pub(crate) fn failure(&self, operation: CacheOperation, message: impl Into<String>) {
        self.pair(operation, false, String::new(), message);
    }

    /// An operation skipped because the backend is not connected
    pub(crate) fn unavailable(&self, operation: CacheOperation, key: Option<&str>) {
        let message = match key {
            Some(key) => format!("Cache unavailable, skipped {operation} of {key}"),
            None => format!("Cache unavailable, skipped {operation}"),
        };
        self.failure(operation, message);
    }
}
