//! Cache facade
//!
//! Uses enum dispatch over the three drivers. The facade owns exactly one
//! driver, chosen by [`CacheConfiguration::backend`], and only forwards to it
//! once it has connected.

use super::cluster_client::{ClusterConnector, RedisClusterConnector};
use super::codec::ReadOutcome;
use super::drivers::{ClusterDriver, LocalDriver, OptionFailure, SharedMemoryDriver};
use super::event_log::{CacheOperation, EventLog, EventReporter, TracingEventLog};
use super::options::CacheOperationOptions;
use super::traits::{CacheDriver, CacheInfo};
use crate::config::{BackendConfig, BackendKind, CacheConfiguration, ConfigResult};
use serde::Serialize;
use std::sync::Arc;
use tracing::info;

/// Internal driver enum for zero-cost dispatch
#[derive(Debug)]
enum CacheBackend {
    Local(LocalDriver),
    /// Boxed to keep the enum small
    Cluster(Box<ClusterDriver>),
    SharedMemory(SharedMemoryDriver),
}

impl CacheBackend {
    fn driver(&self) -> &dyn CacheDriver {
        match self {
            Self::Local(d) => d,
            Self::Cluster(d) => d.as_ref(),
            Self::SharedMemory(d) => d,
        }
    }

    fn driver_mut(&mut self) -> &mut dyn CacheDriver {
        match self {
            Self::Local(d) => d,
            Self::Cluster(d) => d.as_mut(),
            Self::SharedMemory(d) => d,
        }
    }
}

/// Single entry point for recordset caching
///
/// ```no_run
/// use recordset_cache::{CacheConfiguration, CacheFacade};
///
/// let config = CacheConfiguration::local().with_default_ttl(300);
/// let mut cache = CacheFacade::with_tracing(&config)?;
/// if cache.connect() {
///     cache.write_cache("q1", "ROW_DATA", None, None);
///     let (recordset, error) = cache.read_cache("q1", None, None).into_parts();
///     # let _ = (recordset, error);
/// }
/// # Ok::<(), recordset_cache::ConfigurationError>(())
/// ```
#[derive(Debug)]
pub struct CacheFacade {
    backend: CacheBackend,
    kind: BackendKind,
    events: EventReporter,
}

impl CacheFacade {
    /// Build the configured driver, using the Redis Cluster client for cluster backends
    pub fn from_config(
        config: &CacheConfiguration,
        event_log: Arc<dyn EventLog>,
    ) -> ConfigResult<Self> {
        Self::with_cluster_connector(config, Arc::new(RedisClusterConnector::new()), event_log)
    }

    /// Build the configured driver, reporting through `tracing`
    ///
    /// Successful outcomes are logged at `info` when the configuration has
    /// `debug` set.
    pub fn with_tracing(config: &CacheConfiguration) -> ConfigResult<Self> {
        Self::from_config(config, Arc::new(TracingEventLog::new(config.debug)))
    }

    /// Build the configured driver with an explicit cluster connector
    ///
    /// `connector` is only used when the configuration selects the cluster backend.
    pub fn with_cluster_connector(
        config: &CacheConfiguration,
        connector: Arc<dyn ClusterConnector>,
        event_log: Arc<dyn EventLog>,
    ) -> ConfigResult<Self> {
        config.validate()?;

        let ttl = config.default_ttl_seconds;
        let log = Arc::clone(&event_log);
        let backend = match &config.backend {
            BackendConfig::Local(local) => {
                CacheBackend::Local(LocalDriver::new(local.clone(), ttl, log))
            }
            BackendConfig::Cluster(cluster) => CacheBackend::Cluster(Box::new(
                ClusterDriver::new(cluster.clone(), ttl, connector, log),
            )),
            BackendConfig::SharedMemory(shm) => {
                CacheBackend::SharedMemory(SharedMemoryDriver::new(shm.clone(), ttl, log))
            }
        };

        let kind = config.kind();
        info!(
            service = kind.service_name(),
            default_ttl_seconds = ttl,
            "Cache facade created"
        );

        Ok(Self {
            backend,
            kind,
            events: EventReporter::new(kind.service_name(), event_log),
        })
    }

    pub fn kind(&self) -> BackendKind {
        self.kind
    }

    pub fn service_name(&self) -> &'static str {
        self.backend.driver().service_name()
    }

    pub fn service_description(&self) -> &'static str {
        self.backend.driver().service_description()
    }

    /// Connect the driver; returns whether it is usable
    pub fn connect(&mut self) -> bool {
        self.backend.driver_mut().connect()
    }

    pub fn is_connected(&self) -> bool {
        self.backend.driver().is_connected()
    }

    /// Client options the cluster client rejected; always empty for other backends
    pub fn failed_options(&self) -> &[OptionFailure] {
        match &self.backend {
            CacheBackend::Cluster(d) => d.failed_options(),
            CacheBackend::Local(_) | CacheBackend::SharedMemory(_) => &[],
        }
    }

    /// The driver, if it has connected; otherwise logs the skipped operation
    fn connected_driver(&self, operation: CacheOperation, key: Option<&str>) -> Option<&dyn CacheDriver> {
        let driver = self.backend.driver();
        if driver.is_connected() {
            Some(driver)
        } else {
            self.events.unavailable(operation, key);
            None
        }
    }

    pub fn read_cache(
        &self,
        key: &str,
        ttl_override: Option<i64>,
        options: Option<&CacheOperationOptions>,
    ) -> ReadOutcome {
        match self.connected_driver(CacheOperation::Read, Some(key)) {
            Some(driver) => driver.read_cache(key, ttl_override, options),
            None => ReadOutcome::Miss,
        }
    }

    pub fn write_cache(
        &self,
        key: &str,
        payload: &str,
        ttl_override: Option<i64>,
        options: Option<&CacheOperationOptions>,
    ) -> bool {
        match self.connected_driver(CacheOperation::Write, Some(key)) {
            Some(driver) => driver.write_cache(key, payload, ttl_override, options),
            None => false,
        }
    }

    /// Serialize `value` as JSON and cache it
    pub fn write_value<T: Serialize>(
        &self,
        key: &str,
        value: &T,
        ttl_override: Option<i64>,
        options: Option<&CacheOperationOptions>,
    ) -> bool {
        let Some(driver) = self.connected_driver(CacheOperation::Write, Some(key)) else {
            return false;
        };
        match serde_json::to_string(value) {
            Ok(payload) => driver.write_cache(key, &payload, ttl_override, options),
            Err(e) => {
                self.events.failure(
                    CacheOperation::Write,
                    format!("Failed to serialize recordset {key}: {e}"),
                );
                false
            }
        }
    }

    pub fn flush_cache(&self, key: &str, options: Option<&CacheOperationOptions>) {
        if let Some(driver) = self.connected_driver(CacheOperation::Flush, Some(key)) {
            driver.flush_cache(key, options);
        }
    }

    pub fn flush_all(&self) {
        if let Some(driver) = self.connected_driver(CacheOperation::FlushAll, None) {
            driver.flush_all();
        }
    }

    /// Backend statistics; empty before a successful connect
    pub fn info(&self) -> CacheInfo {
        let driver = self.backend.driver();
        if driver.is_connected() {
            driver.info()
        } else {
            CacheInfo::new()
        }
    }
}
