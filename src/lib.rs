#![allow(clippy::missing_errors_doc)] // Allow public functions without # Errors sections
#![allow(clippy::must_use_candidate)] // Allow methods without must_use when context is clear

//! # Recordset Cache
//!
//! Backend-agnostic caching of database query results ("recordsets") for data
//! access layers.
//!
//! ## Overview
//!
//! A data-access layer computes a key for a query, then asks the cache for a
//! fresh copy before touching the database. Three interchangeable backends sit
//! behind one contract:
//!
//! - **Local**: an in-process `moka` cache
//! - **Redis Cluster**: a shared cache across hosts
//! - **Shared memory**: a tmpfs segment shared by processes on one host
//!
//! Entries are stored in a JSON envelope carrying expiry, length and checksum
//! metadata so that stale and damaged entries are never returned as hits.
//!
//! ## Module Organization
//!
//! - [`cache`] - Drivers, codec, facade and outcome reporting
//! - [`config`] - Backend configuration and loading
//! - [`error`] - Structured error handling
//! - [`logging`] - `tracing` subscriber setup
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use recordset_cache::{CacheConfiguration, CacheFacade, ReadOutcome};
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! recordset_cache::logging::init_structured_logging();
//!
//! let config = CacheConfiguration::load("config/cache.toml".as_ref())?;
//! let mut cache = CacheFacade::with_tracing(&config)?;
//! cache.connect();
//!
//! match cache.read_cache("select * from orders where id = 7", None, None) {
//!     ReadOutcome::Hit(recordset) => println!("cached: {}", recordset.payload()),
//!     ReadOutcome::Miss => { /* run the query, then write_cache */ }
//!     ReadOutcome::Corrupted(message) => eprintln!("{message}"),
//! }
//! # Ok(())
//! # }
//! ```

pub mod cache;
pub mod config;
pub mod error;
pub mod logging;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

pub use cache::{
    CacheDriver, CacheFacade, CacheInfo, CacheOperation, CacheOperationOptions, EventLog,
    LogPair, ReadOutcome, Recordset, RecordsetCodec, RecordingEventLog, TracingEventLog,
};
pub use config::{BackendKind, CacheConfiguration, ConfigurationError};
pub use error::{CacheError, CacheResult};
