//! Recordset envelope codec
//!
//! Cached payloads are wrapped in a JSON envelope carrying the write time, the
//! expiry time (or `null` for entries cached forever), the payload length and a
//! BLAKE3 checksum. Staleness is decided here rather than by the backend, so
//! every driver gets the same expiry semantics whether or not its backend
//! expires entries natively.

use crate::error::{CacheError, CacheResult};
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Current envelope layout version
pub const ENVELOPE_FORMAT: u32 = 1;

#[derive(Debug, Serialize, Deserialize)]
struct Envelope {
    format: u32,
    key: String,
    written_at_ms: i64,
    expires_at_ms: Option<i64>,
    length: usize,
    checksum: String,
    payload: String,
}

/// A decoded cache entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Recordset {
    payload: String,
    written_at: DateTime<Utc>,
    expires_at: Option<DateTime<Utc>>,
}

impl Recordset {
    pub fn payload(&self) -> &str {
        &self.payload
    }

    pub fn into_payload(self) -> String {
        self.payload
    }

    pub fn written_at(&self) -> DateTime<Utc> {
        self.written_at
    }

    /// `None` for entries cached forever
    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.expires_at
    }

    /// Decode a JSON payload into a typed value
    pub fn decode<T: DeserializeOwned>(&self) -> CacheResult<T> {
        serde_json::from_str(&self.payload).map_err(CacheError::from)
    }
}

/// Result of a cache read
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadOutcome {
    /// Fresh entry found
    Hit(Recordset),
    /// Absent, expired, or cache unavailable
    Miss,
    /// Present but unreadable; carries the diagnostic message
    Corrupted(String),
}

impl ReadOutcome {
    pub fn is_hit(&self) -> bool {
        matches!(self, Self::Hit(_))
    }

    pub fn is_miss(&self) -> bool {
        matches!(self, Self::Miss)
    }

    pub fn recordset(&self) -> Option<&Recordset> {
        match self {
            Self::Hit(rs) => Some(rs),
            _ => None,
        }
    }

    pub fn into_recordset(self) -> Option<Recordset> {
        match self {
            Self::Hit(rs) => Some(rs),
            _ => None,
        }
    }

    /// Empty for hits and misses
    pub fn error_message(&self) -> &str {
        match self {
            Self::Corrupted(message) => message,
            _ => "",
        }
    }

    /// Split into `(recordset, error)`; an empty error with no recordset is a miss
    pub fn into_parts(self) -> (Option<Recordset>, String) {
        match self {
            Self::Hit(rs) => (Some(rs), String::new()),
            Self::Miss => (None, String::new()),
            Self::Corrupted(message) => (None, message),
        }
    }
}

/// Packs payloads into envelopes and unpacks them again
#[derive(Debug, Clone, Copy, Default)]
pub struct RecordsetCodec;

impl RecordsetCodec {
    /// Pack `payload` for `key`; `ttl_seconds == 0` means no expiry
    pub fn pack(key: &str, payload: &str, ttl_seconds: u64) -> CacheResult<String> {
        Self::pack_at(key, payload, ttl_seconds, Utc::now())
    }

    pub fn pack_at(
        key: &str,
        payload: &str,
        ttl_seconds: u64,
        now: DateTime<Utc>,
    ) -> CacheResult<String> {
        let written_at_ms = now.timestamp_millis();
        // Expiry beyond the representable range degrades to "never"
        let expires_at_ms = match ttl_seconds {
            0 => None,
            ttl => Some(written_at_ms.saturating_add(ttl_millis(ttl)))
                .filter(|ms| DateTime::from_timestamp_millis(*ms).is_some()),
        };

        let envelope = Envelope {
            format: ENVELOPE_FORMAT,
            key: key.to_string(),
            written_at_ms,
            expires_at_ms,
            length: payload.len(),
            checksum: checksum(payload),
            payload: payload.to_string(),
        };

        serde_json::to_string(&envelope).map_err(CacheError::from)
    }

    /// Unpack a stored blob read back under `key`
    ///
    /// A positive `ttl_seconds` additionally bounds the entry's age, so a reader
    /// asking for fresher data than the writer promised gets a miss.
    pub fn unpack(key: &str, blob: &str, ttl_seconds: u64) -> ReadOutcome {
        Self::unpack_at(key, blob, ttl_seconds, Utc::now())
    }

    /// Unpack raw bytes from a store that does not guarantee UTF-8
    pub fn unpack_bytes(key: &str, bytes: &[u8], ttl_seconds: u64) -> ReadOutcome {
        match std::str::from_utf8(bytes) {
            Ok(blob) => Self::unpack(key, blob, ttl_seconds),
            Err(_) => ReadOutcome::Corrupted(corrupted_message(key)),
        }
    }

    pub fn unpack_at(key: &str, blob: &str, ttl_seconds: u64, now: DateTime<Utc>) -> ReadOutcome {
        let envelope = match Self::verify(key, blob) {
            Ok(envelope) => envelope,
            Err(reason) => {
                warn!(key = key, reason = %reason, "Cached recordset failed verification");
                return ReadOutcome::Corrupted(corrupted_message(key));
            }
        };

        let Some(written_at) = DateTime::from_timestamp_millis(envelope.written_at_ms) else {
            warn!(key = key, "Cached recordset carries an invalid write time");
            return ReadOutcome::Corrupted(corrupted_message(key));
        };
        let expires_at = match envelope.expires_at_ms.map(DateTime::from_timestamp_millis) {
            None => None,
            Some(Some(at)) => Some(at),
            Some(None) => {
                warn!(key = key, "Cached recordset carries an invalid expiry time");
                return ReadOutcome::Corrupted(corrupted_message(key));
            }
        };

        let now_ms = now.timestamp_millis();
        if envelope.expires_at_ms.is_some_and(|at| now_ms >= at) {
            debug!(key = key, "Cached recordset expired");
            return ReadOutcome::Miss;
        }
        if ttl_seconds > 0 && now_ms.saturating_sub(envelope.written_at_ms) >= ttl_millis(ttl_seconds)
        {
            debug!(
                key = key,
                ttl_seconds = ttl_seconds,
                "Cached recordset older than requested TTL"
            );
            return ReadOutcome::Miss;
        }

        ReadOutcome::Hit(Recordset {
            payload: envelope.payload,
            written_at,
            expires_at,
        })
    }

    fn verify(key: &str, blob: &str) -> Result<Envelope, String> {
        let envelope: Envelope = serde_json::from_str(blob).map_err(|e| e.to_string())?;

        if envelope.format != ENVELOPE_FORMAT {
            return Err(format!("unsupported envelope format {}", envelope.format));
        }
        if envelope.key != key {
            return Err(format!("envelope belongs to key {}", envelope.key));
        }
        if envelope.payload.len() != envelope.length {
            return Err(format!(
                "payload length {} does not match recorded length {}",
                envelope.payload.len(),
                envelope.length
            ));
        }
        if checksum(&envelope.payload) != envelope.checksum {
            return Err("payload checksum mismatch".to_string());
        }
        Ok(envelope)
    }
}

fn checksum(payload: &str) -> String {
    blake3::hash(payload.as_bytes()).to_hex().to_string()
}

fn ttl_millis(ttl_seconds: u64) -> i64 {
    i64::try_from(ttl_seconds)
        .unwrap_or(i64::MAX)
        .saturating_mul(1000)
}

fn corrupted_message(key: &str) -> String {
    format!("cache entry corrupted for {key}")
}
