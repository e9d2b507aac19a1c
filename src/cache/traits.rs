//! Cache driver trait definition

use super::codec::ReadOutcome;
use super::options::CacheOperationOptions;
use std::collections::BTreeMap;

/// Backend statistics as reported by a driver; shape is backend-specific
pub type CacheInfo = BTreeMap<String, serde_json::Value>;

/// Contract every cache backend driver satisfies
///
/// Implemented by the local, cluster and shared-memory drivers. All calls are
/// synchronous and bounded by the backend's own timeouts. None of them panic or
/// return errors for expected conditions: a driver that is not connected skips
/// the work, reports the skip to its event log and returns the "no data" value.
pub trait CacheDriver: Send + Sync {
    /// Run the backend handshake
    ///
    /// Returns `true` and keeps the backend handle only if every fatal step
    /// succeeded. A failed connect leaves the driver disconnected.
    fn connect(&mut self) -> bool;

    fn is_connected(&self) -> bool;

    /// Fetch and unpack the entry stored under `key`
    fn read_cache(
        &self,
        key: &str,
        ttl_override: Option<i64>,
        options: Option<&CacheOperationOptions>,
    ) -> ReadOutcome;

    /// Pack and store `payload` under `key`; returns whether the backend took it
    fn write_cache(
        &self,
        key: &str,
        payload: &str,
        ttl_override: Option<i64>,
        options: Option<&CacheOperationOptions>,
    ) -> bool;

    /// Remove a single entry
    fn flush_cache(&self, key: &str, options: Option<&CacheOperationOptions>);

    /// Remove every entry in this driver's namespace
    fn flush_all(&self);

    /// Backend statistics, empty when not connected
    fn info(&self) -> CacheInfo;

    fn service_name(&self) -> &'static str;

    fn service_description(&self) -> &'static str;
}
