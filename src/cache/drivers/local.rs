//! In-process cache driver using Moka
//!
//! The local cache lives inside the current process and is shared by every
//! thread that holds the driver. Entries expire natively through a per-entry
//! Moka expiry policy, and the envelope expiry is still checked on read.
//!
//! When the facility is switched off (`enabled = false` or no capacity), the
//! driver either refuses to connect or, if `allow_degraded` is set, connects
//! without a handle: reads miss, writes return `false`.

use crate::cache::codec::{ReadOutcome, RecordsetCodec};
use crate::cache::drivers::{report_read, report_write};
use crate::cache::event_log::{CacheOperation, EventLog, EventReporter};
use crate::cache::options::{effective_ttl, CacheOperationOptions};
use crate::cache::traits::{CacheDriver, CacheInfo};
use crate::config::{BackendKind, LocalConfig};
use moka::sync::Cache;
use moka::Expiry;
use serde_json::json;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::debug;

const KIND: BackendKind = BackendKind::Local;

/// One stored envelope plus the TTL it was written with
#[derive(Debug, Clone)]
struct LocalEntry {
    blob: Arc<str>,
    ttl: Option<Duration>,
}

/// Expire each entry after its own TTL; `None` keeps it until evicted
struct EntryExpiry;

impl Expiry<String, LocalEntry> for EntryExpiry {
    fn expire_after_create(
        &self,
        _key: &String,
        value: &LocalEntry,
        _created_at: Instant,
    ) -> Option<Duration> {
        value.ttl
    }

    fn expire_after_update(
        &self,
        _key: &String,
        value: &LocalEntry,
        _updated_at: Instant,
        _duration_until_expiry: Option<Duration>,
    ) -> Option<Duration> {
        value.ttl
    }
}

enum LocalState {
    Disconnected,
    /// Connected without a cache handle
    Degraded,
    Ready(Cache<String, LocalEntry>),
}

/// APCu-style in-process cache driver
pub struct LocalDriver {
    config: LocalConfig,
    default_ttl_seconds: u64,
    events: EventReporter,
    state: LocalState,
}

impl std::fmt::Debug for LocalDriver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = match &self.state {
            LocalState::Disconnected => "disconnected",
            LocalState::Degraded => "degraded",
            LocalState::Ready(_) => "ready",
        };
        f.debug_struct("LocalDriver")
            .field("max_capacity", &self.config.max_capacity)
            .field("default_ttl_seconds", &self.default_ttl_seconds)
            .field("state", &state)
            .finish()
    }
}

impl LocalDriver {
    pub fn new(config: LocalConfig, default_ttl_seconds: u64, event_log: Arc<dyn EventLog>) -> Self {
        Self {
            config,
            default_ttl_seconds,
            events: EventReporter::new(KIND.service_name(), event_log),
            state: LocalState::Disconnected,
        }
    }

    /// Connected without a cache handle
    pub fn is_degraded(&self) -> bool {
        matches!(self.state, LocalState::Degraded)
    }

    fn facility_available(&self) -> bool {
        self.config.enabled && self.config.max_capacity > 0
    }

    fn build_cache(&self) -> Cache<String, LocalEntry> {
        Cache::builder()
            .max_capacity(self.config.max_capacity)
            .expire_after(EntryExpiry)
            .build()
    }
}

impl CacheDriver for LocalDriver {
    fn connect(&mut self) -> bool {
        if self.is_connected() {
            return true;
        }

        let available = self.facility_available();
        self.events.pair(
            CacheOperation::Connect,
            available,
            "Loaded the local cache facility",
            "The local cache facility is missing or disabled",
        );

        if available {
            self.state = LocalState::Ready(self.build_cache());
            debug!(
                max_capacity = self.config.max_capacity,
                default_ttl_seconds = self.default_ttl_seconds,
                "Local cache driver connected"
            );
            return true;
        }

        if self.config.allow_degraded {
            self.state = LocalState::Degraded;
            self.events.success(
                CacheOperation::Connect,
                "Local cache connected in degraded mode, nothing will be cached",
            );
            return true;
        }

        false
    }

    fn is_connected(&self) -> bool {
        !matches!(self.state, LocalState::Disconnected)
    }

    fn read_cache(
        &self,
        key: &str,
        ttl_override: Option<i64>,
        options: Option<&CacheOperationOptions>,
    ) -> ReadOutcome {
        let cache = match &self.state {
            LocalState::Ready(cache) => cache,
            LocalState::Degraded | LocalState::Disconnected => {
                self.events.unavailable(CacheOperation::Read, Some(key));
                return ReadOutcome::Miss;
            }
        };

        let ttl = effective_ttl(ttl_override, options, self.default_ttl_seconds);
        let outcome = match cache.get(key) {
            Some(entry) => RecordsetCodec::unpack(key, &entry.blob, ttl),
            None => ReadOutcome::Miss,
        };
        report_read(&self.events, key, &outcome);
        outcome
    }

    fn write_cache(
        &self,
        key: &str,
        payload: &str,
        ttl_override: Option<i64>,
        options: Option<&CacheOperationOptions>,
    ) -> bool {
        let cache = match &self.state {
            LocalState::Ready(cache) => cache,
            LocalState::Degraded | LocalState::Disconnected => {
                self.events.unavailable(CacheOperation::Write, Some(key));
                return false;
            }
        };

        let ttl = effective_ttl(ttl_override, options, self.default_ttl_seconds);
        let result = RecordsetCodec::pack(key, payload, ttl).map(|blob| {
            let entry = LocalEntry {
                blob: Arc::from(blob),
                ttl: (ttl > 0).then(|| Duration::from_secs(ttl)),
            };
            cache.insert(key.to_string(), entry);
        });
        report_write(&self.events, key, ttl, &result)
    }

    fn flush_cache(&self, key: &str, _options: Option<&CacheOperationOptions>) {
        let LocalState::Ready(cache) = &self.state else {
            self.events.unavailable(CacheOperation::Flush, Some(key));
            return;
        };

        let removed = cache.remove(key).is_some();
        self.events.pair(
            CacheOperation::Flush,
            removed,
            format!("Flushed cached recordset {key}"),
            format!("No cached recordset {key} to flush"),
        );
    }

    fn flush_all(&self) {
        let LocalState::Ready(cache) = &self.state else {
            self.events.unavailable(CacheOperation::FlushAll, None);
            return;
        };

        cache.invalidate_all();
        cache.run_pending_tasks();
        self.events
            .success(CacheOperation::FlushAll, "Flushed all local cache entries");
    }

    fn info(&self) -> CacheInfo {
        let mut info = CacheInfo::new();
        match &self.state {
            LocalState::Disconnected => {}
            LocalState::Degraded => {
                info.insert("service".into(), json!(KIND.service_name()));
                info.insert("degraded".into(), json!(true));
            }
            LocalState::Ready(cache) => {
                cache.run_pending_tasks();
                info.insert("service".into(), json!(KIND.service_name()));
                info.insert("degraded".into(), json!(false));
                info.insert("entry_count".into(), json!(cache.entry_count()));
                info.insert("weighted_size".into(), json!(cache.weighted_size()));
                info.insert("max_capacity".into(), json!(self.config.max_capacity));
                info.insert(
                    "default_ttl_seconds".into(),
                    json!(self.default_ttl_seconds),
                );
            }
        }
        info
    }

    fn service_name(&self) -> &'static str {
        KIND.service_name()
    }

    fn service_description(&self) -> &'static str {
        KIND.service_description()
    }
}
