//! Redis Cluster cache driver
//!
//! Connecting runs the full handshake: attach to the seed nodes, authenticate,
//! select the database and apply client options. Attach, authentication and
//! database selection are fatal; a rejected client option is logged, recorded
//! in [`ClusterDriver::failed_options`] and skipped.

use crate::cache::cluster_client::{ClusterConnector, ClusterSession};
use crate::cache::codec::{ReadOutcome, RecordsetCodec};
use crate::cache::drivers::{report_read, report_write};
use crate::cache::event_log::{CacheOperation, EventLog, EventReporter};
use crate::cache::options::{effective_ttl, CacheOperationOptions};
use crate::cache::traits::{CacheDriver, CacheInfo};
use crate::config::{BackendKind, ClusterConfig, ClusterCredential};
use crate::error::CacheResult;
use parking_lot::Mutex;
use serde::Serialize;
use std::sync::Arc;
use tracing::debug;

const KIND: BackendKind = BackendKind::Cluster;

/// A client option the cluster client refused
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OptionFailure {
    pub name: String,
    pub value: String,
    pub reason: String,
}

/// Redis Cluster driver
pub struct ClusterDriver {
    config: ClusterConfig,
    default_ttl_seconds: u64,
    connector: Arc<dyn ClusterConnector>,
    events: EventReporter,
    session: Option<Mutex<Box<dyn ClusterSession>>>,
    failed_options: Vec<OptionFailure>,
}

impl std::fmt::Debug for ClusterDriver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClusterDriver")
            .field("hosts", &self.config.hosts.len())
            .field("database", &self.config.database)
            .field("connector", &self.connector)
            .field("connected", &self.session.is_some())
            .field("failed_options", &self.failed_options)
            .finish()
    }
}

impl ClusterDriver {
    pub fn new(
        config: ClusterConfig,
        default_ttl_seconds: u64,
        connector: Arc<dyn ClusterConnector>,
        event_log: Arc<dyn EventLog>,
    ) -> Self {
        Self {
            config,
            default_ttl_seconds,
            connector,
            events: EventReporter::new(KIND.service_name(), event_log),
            session: None,
            failed_options: Vec::new(),
        }
    }

    /// Client options rejected during the last connect
    pub fn failed_options(&self) -> &[OptionFailure] {
        &self.failed_options
    }

    /// Credential to present, if any
    ///
    /// A configured provider takes precedence over the static credential.
    fn resolve_credential(&self) -> Result<Option<ClusterCredential>, String> {
        match &self.config.auth_provider {
            Some(provider) => provider.produce().map(Some),
            None => Ok(self.config.auth.clone()),
        }
    }

    /// Run the fatal handshake steps, returning the ready session
    fn handshake(&mut self) -> Option<Box<dyn ClusterSession>> {
        let opened = self.connector.open(&self.config);
        let mut session = match opened {
            Ok(session) => {
                self.events
                    .success(CacheOperation::Connect, "Attached to Redis Cluster");
                session
            }
            Err(e) => {
                self.events.failure(
                    CacheOperation::Connect,
                    format!("Failed to attach to Redis Cluster: {e}"),
                );
                return None;
            }
        };

        let credential = match self.resolve_credential() {
            Ok(credential) => credential,
            Err(e) => {
                self.events.failure(
                    CacheOperation::Authenticate,
                    format!("Credential provider failed: {e}"),
                );
                return None;
            }
        };
        if let Some(credential) = credential {
            let result = session.authenticate(&credential);
            if !self.report(
                CacheOperation::Authenticate,
                &result,
                "Authenticated with Redis Cluster",
                "Redis Cluster authentication failed",
            ) {
                return None;
            }
        }

        let database = self.config.database;
        if database > 0 {
            let result = session.select_database(database);
            if !self.report(
                CacheOperation::SelectDatabase,
                &result,
                &format!("Selected database {database}"),
                &format!("Failed to select database {database}"),
            ) {
                return None;
            }
        }

        self.failed_options.clear();
        for option in &self.config.client_options {
            match session.apply_option(option) {
                Ok(()) => self.events.success(
                    CacheOperation::ClientOption,
                    format!("Applied client option {}={}", option.name, option.value),
                ),
                Err(e) => {
                    self.events.failure(
                        CacheOperation::ClientOption,
                        format!(
                            "Failed to apply client option {}={}: {e}",
                            option.name, option.value
                        ),
                    );
                    self.failed_options.push(OptionFailure {
                        name: option.name.clone(),
                        value: option.value.clone(),
                        reason: e.to_string(),
                    });
                }
            }
        }

        Some(session)
    }

    fn report(
        &self,
        operation: CacheOperation,
        result: &CacheResult<()>,
        success: &str,
        failure: &str,
    ) -> bool {
        let failure = match result {
            Ok(()) => String::new(),
            Err(e) => format!("{failure}: {e}"),
        };
        self.events
            .pair(operation, result.is_ok(), success, failure)
    }
}

impl CacheDriver for ClusterDriver {
    fn connect(&mut self) -> bool {
        if self.session.is_some() {
            return true;
        }

        match self.handshake() {
            Some(session) => {
                self.session = Some(Mutex::new(session));
                debug!(
                    hosts = self.config.hosts.len(),
                    database = self.config.database,
                    failed_options = self.failed_options.len(),
                    "Redis Cluster driver connected"
                );
                true
            }
            None => false,
        }
    }

    fn is_connected(&self) -> bool {
        self.session.is_some()
    }

    fn read_cache(
        &self,
        key: &str,
        ttl_override: Option<i64>,
        options: Option<&CacheOperationOptions>,
    ) -> ReadOutcome {
        let Some(session) = &self.session else {
            self.events.unavailable(CacheOperation::Read, Some(key));
            return ReadOutcome::Miss;
        };

        let fetched = session.lock().get(key);
        let outcome = match fetched {
            Ok(Some(blob)) => {
                let ttl = effective_ttl(ttl_override, options, self.default_ttl_seconds);
                RecordsetCodec::unpack(key, &blob, ttl)
            }
            Ok(None) => ReadOutcome::Miss,
            Err(e) => {
                self.events.failure(
                    CacheOperation::Read,
                    format!("Failed to read cached recordset {key}: {e}"),
                );
                return ReadOutcome::Miss;
            }
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
        let Some(session) = &self.session else {
            self.events.unavailable(CacheOperation::Write, Some(key));
            return false;
        };

        let ttl = effective_ttl(ttl_override, options, self.default_ttl_seconds);
        let result = RecordsetCodec::pack(key, payload, ttl)
            .and_then(|blob| session.lock().set(key, &blob, ttl));
        report_write(&self.events, key, ttl, &result)
    }

    fn flush_cache(&self, key: &str, _options: Option<&CacheOperationOptions>) {
        let Some(session) = &self.session else {
            self.events.unavailable(CacheOperation::Flush, Some(key));
            return;
        };

        let asynchronous = self.config.asynchronous_delete;
        let result = session.lock().delete(key, asynchronous);
        match result {
            // UNLINK reclaims memory in the background; the count is not awaited
            Ok(_) if asynchronous => self.events.success(
                CacheOperation::Flush,
                format!("Delete requested for cached recordset {key}"),
            ),
            Ok(0) => self.events.failure(
                CacheOperation::Flush,
                format!("No cached recordset {key} to flush"),
            ),
            Ok(_) => self
                .events
                .success(CacheOperation::Flush, format!("Flushed cached recordset {key}")),
            Err(e) => self.events.failure(
                CacheOperation::Flush,
                format!("Failed to flush cached recordset {key}: {e}"),
            ),
        }
    }

    fn flush_all(&self) {
        let Some(session) = &self.session else {
            self.events.unavailable(CacheOperation::FlushAll, None);
            return;
        };

        let result = session.lock().flush_database();
        self.report(
            CacheOperation::FlushAll,
            &result,
            "Flushed the Redis Cluster database",
            "Failed to flush the Redis Cluster database",
        );
    }

    fn info(&self) -> CacheInfo {
        let Some(session) = &self.session else {
            return CacheInfo::new();
        };

        let result = session.lock().info();
        match result {
            Ok(info) => info,
            Err(e) => {
                self.events.failure(
                    CacheOperation::Info,
                    format!("Failed to read Redis Cluster info: {e}"),
                );
                CacheInfo::new()
            }
        }
    }

    fn service_name(&self) -> &'static str {
        KIND.service_name()
    }

    fn service_description(&self) -> &'static str {
        KIND.service_description()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::event_log::RecordingEventLog;
    use crate::config::ClientOption;
    use crate::test_utils::InMemoryClusterConnector;

    fn cluster_config() -> ClusterConfig {
        ClusterConfig {
            hosts: vec!["redis://10.0.0.1:7000".to_string()],
            ..ClusterConfig::default()
        }
    }

    fn driver_with(
        config: ClusterConfig,
        connector: &InMemoryClusterConnector,
    ) -> (ClusterDriver, Arc<RecordingEventLog>) {
        let log = Arc::new(RecordingEventLog::new());
        let driver = ClusterDriver::new(config, 300, Arc::new(connector.clone()), log.clone());
        (driver, log)
    }

    #[test]
    fn test_connect_attaches() {
        let connector = InMemoryClusterConnector::new();
        let (mut driver, log) = driver_with(cluster_config(), &connector);

        assert!(driver.connect());
        assert!(driver.is_connected());
        assert_eq!(
            log.for_operation(CacheOperation::Connect)[0].message(),
            "Attached to Redis Cluster"
        );
    }

    #[test]
    fn test_attach_failure_is_fatal() {
        let connector = InMemoryClusterConnector::failing_open();
        let (mut driver, log) = driver_with(cluster_config(), &connector);

        assert!(!driver.connect());
        assert!(!driver.is_connected());
        assert!(log.failures()[0]
            .message()
            .starts_with("Failed to attach to Redis Cluster"));
    }

    #[test]
    fn test_wrong_credential_is_fatal() {
        let connector =
            InMemoryClusterConnector::requiring_credential(ClusterCredential::password("right"));
        let config = ClusterConfig {
            auth: Some(ClusterCredential::password("wrong")),
            ..cluster_config()
        };
        let (mut driver, log) = driver_with(config, &connector);

        assert!(!driver.connect());
        let auth = log.for_operation(CacheOperation::Authenticate);
        assert!(!auth[0].success);
    }

    #[test]
    fn test_provider_credential_wins_over_static() {
        let connector = InMemoryClusterConnector::requiring_credential(
            ClusterCredential::user_password("app", "fresh"),
        );
        let config = ClusterConfig {
            auth: Some(ClusterCredential::password("stale")),
            ..cluster_config()
        }
        .with_auth_provider(|| Ok(ClusterCredential::user_password("app", "fresh")));
        let (mut driver, _log) = driver_with(config, &connector);

        assert!(driver.connect());
        assert_eq!(
            connector.authenticated_with(),
            vec![ClusterCredential::user_password("app", "fresh")]
        );
    }

    #[test]
    fn test_provider_error_is_fatal() {
        let connector = InMemoryClusterConnector::new();
        let config = cluster_config().with_auth_provider(|| Err("vault sealed".to_string()));
        let (mut driver, log) = driver_with(config, &connector);

        assert!(!driver.connect());
        assert_eq!(
            log.failures()[0].message(),
            "Credential provider failed: vault sealed"
        );
        assert!(connector.authenticated_with().is_empty());
    }

    #[test]
    fn test_database_rejection_is_fatal() {
        let connector = InMemoryClusterConnector::rejecting_database();
        let config = ClusterConfig {
            database: 2,
            ..cluster_config()
        };
        let (mut driver, log) = driver_with(config, &connector);

        assert!(!driver.connect());
        assert!(!log.for_operation(CacheOperation::SelectDatabase)[0].success);
    }

    #[test]
    fn test_database_zero_is_not_selected() {
        let connector = InMemoryClusterConnector::rejecting_database();
        let (mut driver, log) = driver_with(cluster_config(), &connector);

        assert!(driver.connect());
        assert!(log.for_operation(CacheOperation::SelectDatabase).is_empty());
    }

    #[test]
    fn test_rejected_option_is_not_fatal() {
        let connector = InMemoryClusterConnector::rejecting_option("compression");
        let config = ClusterConfig {
            client_options: vec![
                ClientOption::new("compression", "lz4"),
                ClientOption::new("prefix", "app:"),
            ],
            ..cluster_config()
        };
        let (mut driver, log) = driver_with(config, &connector);

        assert!(driver.connect());
        assert_eq!(driver.failed_options().len(), 1);
        assert_eq!(driver.failed_options()[0].name, "compression");

        let options = log.for_operation(CacheOperation::ClientOption);
        assert_eq!(options.len(), 2);
        assert!(!options[0].success);
        assert!(options[1].success);

        assert!(driver.write_cache("q1", "ROW_DATA", None, None));
        assert!(connector.contains("app:q1"));
    }

    #[test]
    fn test_write_uses_setex_and_read_hits() {
        let connector = InMemoryClusterConnector::new();
        let (mut driver, _log) = driver_with(cluster_config(), &connector);
        driver.connect();

        assert!(driver.write_cache("q1", "ROW_DATA", None, None));
        assert_eq!(connector.commands(), vec!["SETEX q1 300".to_string()]);
        assert_eq!(connector.stored_ttl("q1"), Some(300));

        let rs = driver.read_cache("q1", None, None).into_recordset().unwrap();
        assert_eq!(rs.payload(), "ROW_DATA");
    }

    #[test]
    fn test_zero_ttl_uses_plain_set() {
        let connector = InMemoryClusterConnector::new();
        let (mut driver, _log) = driver_with(cluster_config(), &connector);
        driver.connect();

        let options = CacheOperationOptions::with_ttl(0);
        assert!(driver.write_cache("forever", "ROW_DATA", None, Some(&options)));
        assert_eq!(connector.commands(), vec!["SET forever".to_string()]);
        assert_eq!(connector.stored_ttl("forever"), Some(0));
    }

    #[test]
    fn test_flush_uses_del_or_unlink() {
        let connector = InMemoryClusterConnector::new();
        let (mut driver, log) = driver_with(cluster_config(), &connector);
        driver.connect();
        driver.write_cache("q1", "ROW_DATA", None, None);
        driver.flush_cache("q1", None);
        assert!(driver.read_cache("q1", None, None).is_miss());
        assert!(log.for_operation(CacheOperation::Flush)[0].success);

        let async_connector = InMemoryClusterConnector::new();
        let config = ClusterConfig {
            asynchronous_delete: true,
            ..cluster_config()
        };
        let (mut async_driver, async_log) = driver_with(config, &async_connector);
        async_driver.connect();
        async_driver.write_cache("q1", "ROW_DATA", None, None);
        async_driver.flush_cache("q1", None);

        assert_eq!(connector.commands().last().map(String::as_str), Some("DEL q1"));
        assert_eq!(
            async_connector.commands().last().map(String::as_str),
            Some("UNLINK q1")
        );
        assert_eq!(
            async_log.for_operation(CacheOperation::Flush)[0].message(),
            "Delete requested for cached recordset q1"
        );
    }

    #[test]
    fn test_corrupted_blob_is_reported() {
        let connector = InMemoryClusterConnector::new();
        let (mut driver, log) = driver_with(cluster_config(), &connector);
        driver.connect();
        connector.insert_raw("q1", "garbage");

        let (rs, err) = driver.read_cache("q1", None, None).into_parts();
        assert!(rs.is_none());
        assert_eq!(err, "cache entry corrupted for q1");
        assert_eq!(log.failures().len(), 1);
    }

    #[test]
    fn test_flush_all_clears_only_selected_database() {
        let connector = InMemoryClusterConnector::new();
        let (mut db0, _) = driver_with(cluster_config(), &connector);
        let (mut db3, _) = driver_with(
            ClusterConfig {
                database: 3,
                ..cluster_config()
            },
            &connector,
        );
        db0.connect();
        db3.connect();

        db0.write_cache("q1", "zero", None, None);
        db3.write_cache("q1", "three", None, None);
        db3.flush_all();

        assert!(db0.read_cache("q1", None, None).is_hit());
        assert!(db3.read_cache("q1", None, None).is_miss());
    }

    #[test]
    fn test_info_reports_keys() {
        let connector = InMemoryClusterConnector::new();
        let (mut driver, _log) = driver_with(cluster_config(), &connector);
        assert!(driver.info().is_empty());

        driver.connect();
        driver.write_cache("q1", "ROW_DATA", None, None);
        let info = driver.info();
        assert_eq!(info["keys"], serde_json::json!(1));
    }

    #[test]
    fn test_operations_before_connect_are_skipped() {
        let connector = InMemoryClusterConnector::new();
        let (driver, log) = driver_with(cluster_config(), &connector);

        assert!(!driver.write_cache("q1", "ROW_DATA", None, None));
        assert!(driver.read_cache("q1", None, None).is_miss());
        driver.flush_cache("q1", None);
        driver.flush_all();

        assert!(connector.commands().is_empty());
        assert_eq!(log.failures().len(), 4);
    }

    #[test]
    fn test_reconnect_is_a_no_op() {
        let connector = InMemoryClusterConnector::new();
        let (mut driver, log) = driver_with(cluster_config(), &connector);
        assert!(driver.connect());
        assert!(driver.connect());
        assert_eq!(log.for_operation(CacheOperation::Connect).len(), 1);
    }
}
