//! # Recordset Cache Module
//!
//! Stores serialized query results under caller-computed keys in one of three
//! backends and reads them back with freshness and integrity checks.
//!
//! ## Architecture
//!
//! ```text
//! CacheFacade
//!   └── CacheBackend (enum)              <- One driver per configuration
//!         ├── Local(LocalDriver)         <- moka, in-process
//!         ├── Cluster(ClusterDriver)     <- Redis Cluster via ClusterConnector
//!         └── SharedMemory(SharedMemoryDriver) <- tmpfs segment, host-wide
//! RecordsetCodec                         <- JSON envelope: expiry, length, checksum
//! EventLog                               <- success/failure pairs for every outcome
//! ```
//!
//! ## Design Decisions
//!
//! - **Best-effort**: driver calls never panic or return errors; failures become
//!   `false`, [`ReadOutcome::Miss`] or an empty info map, plus a log pair
//! - **Corruption is distinct from absence**: [`ReadOutcome::Corrupted`] carries a
//!   message, a miss does not
//! - **Blocking calls**: every operation completes before returning, bounded by
//!   the backend's own timeouts

pub mod cluster_client;
pub mod codec;
pub mod drivers;
pub mod event_log;
pub mod facade;
pub mod options;
pub mod traits;

pub use cluster_client::{ClusterConnector, ClusterSession, RedisClusterConnector};
pub use codec::{ReadOutcome, Recordset, RecordsetCodec};
pub use drivers::{ClusterDriver, LocalDriver, OptionFailure, SharedMemoryDriver};
pub use event_log::{CacheOperation, EventLog, LogPair, RecordingEventLog, TracingEventLog};
pub use facade::CacheFacade;
pub use options::{effective_ttl, CacheOperationOptions};
pub use traits::{CacheDriver, CacheInfo};
