//! Shared-memory segment cache driver
//!
//! The segment is a directory on a memory-backed filesystem (`/dev/shm` by
//! default) shared by every process on the host. Each entry is one file named
//! after the BLAKE3 hash of its key. Writes land in a temp file in the same
//! directory and are renamed into place, so readers never see a partial entry.
//!
//! The segment has no native expiry. Freshness comes from the envelope, and a
//! read that finds an expired entry removes its file unless a concurrent
//! writer has replaced it in the meantime.

use crate::cache::codec::{ReadOutcome, RecordsetCodec};
use crate::cache::drivers::{report_read, report_write};
use crate::cache::event_log::{CacheOperation, EventLog, EventReporter};
use crate::cache::options::{effective_ttl, CacheOperationOptions};
use crate::cache::traits::{CacheDriver, CacheInfo};
use crate::config::{BackendKind, SharedMemoryConfig};
use crate::error::{CacheError, CacheResult};
use serde_json::json;
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::{Builder, NamedTempFile};
use tracing::debug;

const KIND: BackendKind = BackendKind::SharedMemory;
const ENTRY_EXTENSION: &str = "entry";

/// Handle on an attached segment directory
#[derive(Debug, Clone)]
struct Segment {
    root: PathBuf,
}

impl Segment {
    fn open(root: &Path) -> CacheResult<Self> {
        fs::create_dir_all(root)?;
        if !root.is_dir() {
            return Err(CacheError::Unavailable(format!(
                "{} is not a directory",
                root.display()
            )));
        }
        // Probe for write access
        NamedTempFile::new_in(root)?;
        Ok(Self {
            root: root.to_path_buf(),
        })
    }

    fn entry_path(&self, key: &str) -> PathBuf {
        let name = blake3::hash(key.as_bytes()).to_hex();
        self.root.join(format!("{name}.{ENTRY_EXTENSION}"))
    }

    fn read(&self, key: &str) -> CacheResult<Option<Vec<u8>>> {
        match fs::read(self.entry_path(key)) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn write(&self, key: &str, blob: &str) -> CacheResult<()> {
        let mut file = NamedTempFile::new_in(&self.root)?;
        file.write_all(blob.as_bytes())?;
        file.persist(self.entry_path(key))
            .map_err(|e| CacheError::from(e.error))?;
        Ok(())
    }

    /// Remove `key`'s entry if it is still expired, returning whether it was removed
    ///
    /// The entry is first renamed aside, so a write that lands after the
    /// expired blob was read is never deleted. A fresh entry found aside is
    /// linked back unless an even newer write already took its place.
    fn evict_expired(&self, key: &str) -> CacheResult<bool> {
        let entry = self.entry_path(key);
        let aside = Builder::new()
            .suffix(".evict")
            .tempfile_in(&self.root)?;
        match fs::rename(&entry, aside.path()) {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(false),
            Err(e) => return Err(e.into()),
        }

        let bytes = fs::read(aside.path())?;
        if RecordsetCodec::unpack_bytes(key, &bytes, 0).is_miss() {
            return Ok(true);
        }
        match fs::hard_link(aside.path(), &entry) {
            Ok(()) => Ok(false),
            Err(e) if e.kind() == ErrorKind::AlreadyExists => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    /// Returns whether an entry was present
    fn remove(&self, key: &str) -> CacheResult<bool> {
        match fs::remove_file(self.entry_path(key)) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    fn entry_files(&self) -> CacheResult<Vec<(PathBuf, u64)>> {
        let mut files = Vec::new();
        for dir_entry in fs::read_dir(&self.root)? {
            let dir_entry = dir_entry?;
            let path = dir_entry.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some(ENTRY_EXTENSION) {
                continue;
            }
            // Entries removed concurrently are simply skipped
            if let Ok(metadata) = dir_entry.metadata() {
                files.push((path, metadata.len()));
            }
        }
        Ok(files)
    }

    /// Remove every entry file, returning how many were removed
    fn clear(&self) -> CacheResult<usize> {
        let mut removed = 0;
        for (path, _) in self.entry_files()? {
            match fs::remove_file(&path) {
                Ok(()) => removed += 1,
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }
        Ok(removed)
    }
}

/// YAC-style shared-memory driver
#[derive(Debug)]
pub struct SharedMemoryDriver {
    config: SharedMemoryConfig,
    default_ttl_seconds: u64,
    events: EventReporter,
    segment: Option<Segment>,
}

impl SharedMemoryDriver {
    pub fn new(
        config: SharedMemoryConfig,
        default_ttl_seconds: u64,
        event_log: Arc<dyn EventLog>,
    ) -> Self {
        Self {
            config,
            default_ttl_seconds,
            events: EventReporter::new(KIND.service_name(), event_log),
            segment: None,
        }
    }

    pub fn segment_path(&self) -> &Path {
        &self.config.segment_path
    }

    fn store(&self, segment: &Segment, key: &str, payload: &str, ttl: u64) -> CacheResult<()> {
        let blob = RecordsetCodec::pack(key, payload, ttl)?;
        if blob.len() as u64 > self.config.max_value_bytes {
            return Err(CacheError::BackendError(format!(
                "entry of {} bytes exceeds the {} byte limit",
                blob.len(),
                self.config.max_value_bytes
            )));
        }
        segment.write(key, &blob)
    }
}

impl CacheDriver for SharedMemoryDriver {
    fn connect(&mut self) -> bool {
        if self.segment.is_some() {
            return true;
        }

        let path = self.config.segment_path.display().to_string();
        match Segment::open(&self.config.segment_path) {
            Ok(segment) => {
                self.events.success(
                    CacheOperation::Connect,
                    format!("Attached to shared memory segment {path}"),
                );
                debug!(segment = %path, "Shared memory driver connected");
                self.segment = Some(segment);
                true
            }
            Err(e) => {
                self.events.failure(
                    CacheOperation::Connect,
                    format!("Shared memory segment unavailable at {path}: {e}"),
                );
                false
            }
        }
    }

    fn is_connected(&self) -> bool {
        self.segment.is_some()
    }

    fn read_cache(
        &self,
        key: &str,
        ttl_override: Option<i64>,
        options: Option<&CacheOperationOptions>,
    ) -> ReadOutcome {
        let Some(segment) = &self.segment else {
            self.events.unavailable(CacheOperation::Read, Some(key));
            return ReadOutcome::Miss;
        };

        let bytes = match segment.read(key) {
            Ok(Some(bytes)) => bytes,
            Ok(None) => {
                let outcome = ReadOutcome::Miss;
                report_read(&self.events, key, &outcome);
                return outcome;
            }
            Err(e) => {
                self.events.failure(
                    CacheOperation::Read,
                    format!("Failed to read cached recordset {key}: {e}"),
                );
                return ReadOutcome::Miss;
            }
        };

        let ttl = effective_ttl(ttl_override, options, self.default_ttl_seconds);
        let outcome = RecordsetCodec::unpack_bytes(key, &bytes, ttl);
        // A reader-side TTL miss leaves the entry for readers with a longer TTL
        if outcome.is_miss() && RecordsetCodec::unpack_bytes(key, &bytes, 0).is_miss() {
            if let Err(e) = segment.evict_expired(key) {
                debug!(key = key, error = %e, "Failed to remove expired entry");
            }
        }
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
        let Some(segment) = &self.segment else {
            self.events.unavailable(CacheOperation::Write, Some(key));
            return false;
        };

        let ttl = effective_ttl(ttl_override, options, self.default_ttl_seconds);
        let result = self.store(segment, key, payload, ttl);
        report_write(&self.events, key, ttl, &result)
    }

    fn flush_cache(&self, key: &str, _options: Option<&CacheOperationOptions>) {
        let Some(segment) = &self.segment else {
            self.events.unavailable(CacheOperation::Flush, Some(key));
            return;
        };

        match segment.remove(key) {
            Ok(true) => self
                .events
                .success(CacheOperation::Flush, format!("Flushed cached recordset {key}")),
            Ok(false) => self.events.failure(
                CacheOperation::Flush,
                format!("No cached recordset {key} to flush"),
            ),
            Err(e) => self.events.failure(
                CacheOperation::Flush,
                format!("Failed to flush cached recordset {key}: {e}"),
            ),
        }
    }

    fn flush_all(&self) {
        let Some(segment) = &self.segment else {
            self.events.unavailable(CacheOperation::FlushAll, None);
            return;
        };

        match segment.clear() {
            Ok(removed) => self.events.success(
                CacheOperation::FlushAll,
                format!("Flushed {removed} shared memory entries"),
            ),
            Err(e) => self.events.failure(
                CacheOperation::FlushAll,
                format!("Failed to flush the shared memory segment: {e}"),
            ),
        }
    }

    fn info(&self) -> CacheInfo {
        let mut info = CacheInfo::new();
        let Some(segment) = &self.segment else {
            return info;
        };

        match segment.entry_files() {
            Ok(files) => {
                let total_bytes: u64 = files.iter().map(|(_, len)| len).sum();
                info.insert("service".into(), json!(KIND.service_name()));
                info.insert(
                    "segment_path".into(),
                    json!(segment.root.display().to_string()),
                );
                info.insert("entry_count".into(), json!(files.len()));
                info.insert("total_bytes".into(), json!(total_bytes));
                info.insert("max_value_bytes".into(), json!(self.config.max_value_bytes));
            }
            Err(e) => self.events.failure(
                CacheOperation::Info,
                format!("Failed to scan the shared memory segment: {e}"),
            ),
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
