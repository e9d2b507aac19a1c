//! Per-call cache options

use serde::{Deserialize, Serialize};

/// Per-call override bag merged against the configured defaults
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheOperationOptions {
    /// Explicit TTL for this call; negative values are ignored
    pub ttl_seconds: Option<i64>,
}

impl CacheOperationOptions {
    pub fn with_ttl(ttl_seconds: i64) -> Self {
        Self {
            ttl_seconds: Some(ttl_seconds),
        }
    }
}

/// Resolve the TTL for one call
///
/// Options TTL first, then the positional override, then the configured
/// default. Negative candidates are skipped.
pub fn effective_ttl(
    ttl_override: Option<i64>,
    options: Option<&CacheOperationOptions>,
    default_ttl_seconds: u64,
) -> u64 {
    options
        .and_then(|o| o.ttl_seconds)
        .into_iter()
        .chain(ttl_override)
        .find_map(|ttl| u64::try_from(ttl).ok())
        .unwrap_or(default_ttl_seconds)
}
