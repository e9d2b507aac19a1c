//! Facade behavior shared by every backend
//!
//! Each test runs against a local cache, a cluster driver over the in-memory
//! connector and a shared-memory segment in a temp directory.

use recordset_cache::config::{BackendConfig, ClientOption, ClusterCredential};
use recordset_cache::test_utils::InMemoryClusterConnector;
use recordset_cache::{
    CacheConfiguration, CacheFacade, CacheOperation, CacheOperationOptions, ReadOutcome,
    RecordingEventLog,
};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

struct Harness {
    facade: CacheFacade,
    log: Arc<RecordingEventLog>,
    _segment: Option<TempDir>,
}

fn build(config: CacheConfiguration, connector: InMemoryClusterConnector) -> Harness {
    let log = Arc::new(RecordingEventLog::new());
    let facade =
        CacheFacade::with_cluster_connector(&config, Arc::new(connector), log.clone()).unwrap();
    Harness {
        facade,
        log,
        _segment: None,
    }
}

fn every_backend(default_ttl: u64) -> Vec<Harness> {
    let segment = TempDir::new().unwrap();
    let shm_config =
        CacheConfiguration::shared_memory(segment.path().join("segment")).with_default_ttl(default_ttl);

    let mut shm = build(shm_config, InMemoryClusterConnector::new());
    shm._segment = Some(segment);

    vec![
        build(
            CacheConfiguration::local().with_default_ttl(default_ttl),
            InMemoryClusterConnector::new(),
        ),
        build(
            CacheConfiguration::cluster(["redis://10.0.0.1:7000"]).with_default_ttl(default_ttl),
            InMemoryClusterConnector::new(),
        ),
        shm,
    ]
}

fn connected(default_ttl: u64) -> Vec<Harness> {
    let mut harnesses = every_backend(default_ttl);
    for h in &mut harnesses {
        assert!(h.facade.connect(), "{} failed to connect", h.facade.service_name());
    }
    harnesses
}

fn unique_key() -> String {
    format!("q:{}", uuid::Uuid::new_v4())
}

#[test]
fn test_concrete_scenario_write_read_flush_read() {
    for h in connected(300) {
        let cache = &h.facade;
        assert!(cache.write_cache("q1", "ROW_DATA", None, None));

        let (recordset, error) = cache.read_cache("q1", None, None).into_parts();
        assert_eq!(recordset.map(|rs| rs.into_payload()).as_deref(), Some("ROW_DATA"));
        assert_eq!(error, "");

        cache.flush_cache("q1", None);

        let (recordset, error) = cache.read_cache("q1", None, None).into_parts();
        assert!(recordset.is_none(), "{} still holds q1", cache.service_name());
        assert_eq!(error, "");
    }
}

#[test]
fn test_never_written_key_is_a_clean_miss() {
    for h in connected(300) {
        let (recordset, error) = h.facade.read_cache(&unique_key(), None, None).into_parts();
        assert!(recordset.is_none());
        assert_eq!(error, "");
    }
}

#[test]
fn test_write_then_read_with_explicit_ttl() {
    for h in connected(300) {
        let key = unique_key();
        let payload = "id,name\n1,alpha\n2,beta";
        assert!(h.facade.write_cache(&key, payload, Some(60), None));

        let recordset = h.facade.read_cache(&key, Some(60), None).into_recordset().unwrap();
        assert_eq!(recordset.payload(), payload);
        assert!(recordset.expires_at().is_some());
    }
}

#[test]
fn test_one_second_ttl_expires_as_a_miss() {
    let harnesses = connected(300);
    let key = unique_key();
    for h in &harnesses {
        assert!(h.facade.write_cache(&key, "ROW_DATA", Some(1), None));
    }

    std::thread::sleep(Duration::from_millis(1_200));

    for h in &harnesses {
        assert_eq!(
            h.facade.read_cache(&key, None, None),
            ReadOutcome::Miss,
            "{} returned a stale entry",
            h.facade.service_name()
        );
        assert!(h.log.for_operation(CacheOperation::Read).iter().all(|p| p.success));
    }
}

#[test]
fn test_reader_ttl_shorter_than_entry_age_is_a_miss() {
    for h in connected(300) {
        let key = unique_key();
        h.facade.write_cache(&key, "ROW_DATA", None, None);
        std::thread::sleep(Duration::from_millis(1_100));

        let strict = CacheOperationOptions::with_ttl(1);
        assert!(h.facade.read_cache(&key, None, Some(&strict)).is_miss());
        assert!(h.facade.read_cache(&key, None, None).is_hit());
    }
}

#[test]
fn test_flush_all_empties_every_written_key() {
    for h in connected(300) {
        let keys: Vec<String> = (0..5).map(|_| unique_key()).collect();
        for key in &keys {
            assert!(h.facade.write_cache(key, "ROW_DATA", None, None));
        }

        h.facade.flush_all();

        for key in &keys {
            assert!(h.facade.read_cache(key, None, None).is_miss());
        }
    }
}

#[test]
fn test_operations_before_connect_return_disconnected_results() {
    for h in every_backend(300) {
        let cache = &h.facade;
        assert!(!cache.is_connected());
        assert!(!cache.write_cache("q1", "ROW_DATA", None, None));
        assert_eq!(cache.read_cache("q1", None, None).into_parts(), (None, String::new()));
        cache.flush_cache("q1", None);
        cache.flush_all();
        assert!(cache.info().is_empty());
        assert!(h
            .log
            .failures()
            .iter()
            .all(|p| p.message().starts_with("Cache unavailable")));
    }
}

#[test]
fn test_operations_after_failed_connect_return_disconnected_results() {
    let mut h = build(
        CacheConfiguration::cluster(["redis://10.0.0.1:7000"]),
        InMemoryClusterConnector::failing_open(),
    );
    assert!(!h.facade.connect());
    assert!(!h.facade.write_cache("q1", "ROW_DATA", None, None));
    assert!(h.facade.read_cache("q1", None, None).is_miss());
    assert!(h.facade.info().is_empty());
}

#[test]
fn test_info_is_populated_once_connected() {
    for h in connected(300) {
        h.facade.write_cache(&unique_key(), "ROW_DATA", None, None);
        assert!(!h.facade.info().is_empty(), "{}", h.facade.service_name());
    }
}

#[test]
fn test_cluster_option_failure_does_not_block_connect() {
    let mut config = CacheConfiguration::cluster(["redis://10.0.0.1:7000"]);
    if let BackendConfig::Cluster(cluster) = &mut config.backend {
        cluster.client_options = vec![
            ClientOption::new("serializer", "php"),
            ClientOption::new("prefix", "rs:"),
        ];
    }
    let connector = InMemoryClusterConnector::rejecting_option("serializer");
    let mut h = build(config, connector.clone());

    assert!(h.facade.connect());
    assert_eq!(h.facade.failed_options()[0].name, "serializer");
    assert!(h.facade.write_cache("q1", "ROW_DATA", None, None));
    assert!(connector.contains("rs:q1"));
}

#[test]
fn test_cluster_database_failure_blocks_connect() {
    let mut config = CacheConfiguration::cluster(["redis://10.0.0.1:7000"]);
    if let BackendConfig::Cluster(cluster) = &mut config.backend {
        cluster.database = 4;
    }
    let mut h = build(config, InMemoryClusterConnector::rejecting_database());

    assert!(!h.facade.connect());
    assert!(!h.facade.is_connected());
}

#[test]
fn test_cluster_auth_and_async_delete() {
    let credential = ClusterCredential::user_password("cache", "s3cret");
    let mut config = CacheConfiguration::cluster(["redis://10.0.0.1:7000"]);
    if let BackendConfig::Cluster(cluster) = &mut config.backend {
        cluster.auth = Some(credential.clone());
        cluster.asynchronous_delete = true;
    }
    let connector = InMemoryClusterConnector::requiring_credential(credential.clone());
    let mut h = build(config, connector.clone());

    assert!(h.facade.connect());
    assert_eq!(connector.authenticated_with(), vec![credential]);

    h.facade.write_cache("q1", "ROW_DATA", None, None);
    h.facade.flush_cache("q1", None);
    assert_eq!(connector.commands().last().map(String::as_str), Some("UNLINK q1"));
    assert!(h.facade.read_cache("q1", None, None).is_miss());
}

#[test]
fn test_independent_instances_connect_independently() {
    let mut first = build(CacheConfiguration::local(), InMemoryClusterConnector::new());
    let second = build(CacheConfiguration::local(), InMemoryClusterConnector::new());

    assert!(first.facade.connect());
    assert!(first.facade.is_connected());
    assert!(!second.facade.is_connected());
}

#[test]
fn test_configuration_from_toml_drives_the_facade() {
    let segment = TempDir::new().unwrap();
    let toml = format!(
        r#"
default_ttl_seconds = 120

[backend]
service = "shared_memory"
segment_path = "{}"
"#,
        segment.path().display()
    );
    let config = CacheConfiguration::from_toml_str(&toml).unwrap();
    let mut h = build(config, InMemoryClusterConnector::new());

    assert!(h.facade.connect());
    assert_eq!(h.facade.service_name(), "shm");
    assert!(h.facade.write_cache("q1", "ROW_DATA", None, None));
    assert!(h.facade.read_cache("q1", None, None).is_hit());
}
