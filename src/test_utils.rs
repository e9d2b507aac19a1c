//! # Test Utilities
//!
//! In-memory stand-ins for the cluster client so the cluster driver and the
//! facade can be tested without a running Redis Cluster.

use crate::cache::cluster_client::{ClusterConnector, ClusterSession};
use crate::cache::traits::CacheInfo;
use crate::config::{ClientOption, ClusterConfig, ClusterCredential};
use crate::error::{CacheError, CacheResult};
use parking_lot::Mutex;
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;

#[derive(Debug, Clone)]
struct StoredEntry {
    value: String,
    ttl_seconds: u64,
}

#[derive(Debug, Default)]
struct ClusterState {
    entries: HashMap<(u32, String), StoredEntry>,
    fail_open: bool,
    required_credential: Option<ClusterCredential>,
    reject_database: bool,
    rejected_options: Vec<String>,
    authenticated_with: Vec<ClusterCredential>,
    commands: Vec<String>,
}

/// Cluster connector keeping every database in process memory
///
/// Clones share state, so a test can keep one handle for inspection while the
/// driver owns another.
#[derive(Debug, Clone, Default)]
pub struct InMemoryClusterConnector {
    state: Arc<Mutex<ClusterState>>,
}

impl InMemoryClusterConnector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every `open` fails as if no seed node answered
    pub fn failing_open() -> Self {
        let connector = Self::new();
        connector.state.lock().fail_open = true;
        connector
    }

    /// Only `credential` authenticates; commands before that are refused
    pub fn requiring_credential(credential: ClusterCredential) -> Self {
        let connector = Self::new();
        connector.state.lock().required_credential = Some(credential);
        connector
    }

    /// SELECT fails the way it does on a real cluster
    pub fn rejecting_database() -> Self {
        let connector = Self::new();
        connector.state.lock().reject_database = true;
        connector
    }

    pub fn rejecting_option(name: impl Into<String>) -> Self {
        let connector = Self::new();
        connector.state.lock().rejected_options.push(name.into());
        connector
    }

    /// Mutating commands in the order they were issued
    pub fn commands(&self) -> Vec<String> {
        self.state.lock().commands.clone()
    }

    pub fn authenticated_with(&self) -> Vec<ClusterCredential> {
        self.state.lock().authenticated_with.clone()
    }

    /// Whether any database holds `key` (including any prefix)
    pub fn contains(&self, key: &str) -> bool {
        self.state.lock().entries.keys().any(|(_, k)| k == key)
    }

    pub fn stored_ttl(&self, key: &str) -> Option<u64> {
        self.state
            .lock()
            .entries
            .iter()
            .find(|((_, k), _)| k == key)
            .map(|(_, entry)| entry.ttl_seconds)
    }

    /// Store a raw value in database 0, bypassing the codec
    pub fn insert_raw(&self, key: &str, value: &str) {
        self.state.lock().entries.insert(
            (0, key.to_string()),
            StoredEntry {
                value: value.to_string(),
                ttl_seconds: 0,
            },
        );
    }
}

impl ClusterConnector for InMemoryClusterConnector {
    fn open(&self, config: &ClusterConfig) -> CacheResult<Box<dyn ClusterSession>> {
        if self.state.lock().fail_open {
            return Err(CacheError::ConnectionError(format!(
                "no seed node reachable among {} host(s)",
                config.hosts.len()
            )));
        }
        Ok(Box::new(InMemoryClusterSession {
            state: Arc::clone(&self.state),
            database: 0,
            prefix: String::new(),
            authenticated: false,
        }))
    }
}

struct InMemoryClusterSession {
    state: Arc<Mutex<ClusterState>>,
    database: u32,
    prefix: String,
    authenticated: bool,
}

impl InMemoryClusterSession {
    fn entry_key(&self, key: &str) -> (u32, String) {
        (self.database, format!("{}{key}", self.prefix))
    }

    fn ensure_authenticated(&self, state: &ClusterState) -> CacheResult<()> {
        if state.required_credential.is_some() && !self.authenticated {
            return Err(CacheError::AuthenticationError(
                "NOAUTH Authentication required".to_string(),
            ));
        }
        Ok(())
    }
}

impl ClusterSession for InMemoryClusterSession {
    fn authenticate(&mut self, credential: &ClusterCredential) -> CacheResult<()> {
        let mut state = self.state.lock();
        state.authenticated_with.push(credential.clone());
        match &state.required_credential {
            Some(required) if required != credential => Err(CacheError::AuthenticationError(
                "WRONGPASS invalid username-password pair".to_string(),
            )),
            _ => {
                self.authenticated = true;
                Ok(())
            }
        }
    }

    fn select_database(&mut self, database: u32) -> CacheResult<()> {
        if self.state.lock().reject_database {
            return Err(CacheError::DatabaseSelectError(
                "ERR SELECT is not allowed in cluster mode".to_string(),
            ));
        }
        self.database = database;
        Ok(())
    }

    fn apply_option(&mut self, option: &ClientOption) -> CacheResult<()> {
        if self.state.lock().rejected_options.contains(&option.name) {
            return Err(CacheError::OptionError {
                name: option.name.clone(),
                reason: "unsupported".to_string(),
            });
        }
        if option.name == "prefix" {
            self.prefix = option.value.clone();
        }
        Ok(())
    }

    fn get(&mut self, key: &str) -> CacheResult<Option<String>> {
        let entry_key = self.entry_key(key);
        let state = self.state.lock();
        self.ensure_authenticated(&state)?;
        Ok(state.entries.get(&entry_key).map(|e| e.value.clone()))
    }

    fn set(&mut self, key: &str, value: &str, ttl_seconds: u64) -> CacheResult<()> {
        let entry_key = self.entry_key(key);
        let mut state = self.state.lock();
        self.ensure_authenticated(&state)?;
        let command = if ttl_seconds > 0 {
            format!("SETEX {} {ttl_seconds}", entry_key.1)
        } else {
            format!("SET {}", entry_key.1)
        };
        state.commands.push(command);
        state.entries.insert(
            entry_key,
            StoredEntry {
                value: value.to_string(),
                ttl_seconds,
            },
        );
        Ok(())
    }

    fn delete(&mut self, key: &str, asynchronous: bool) -> CacheResult<u64> {
        let entry_key = self.entry_key(key);
        let mut state = self.state.lock();
        self.ensure_authenticated(&state)?;
        let command = if asynchronous { "UNLINK" } else { "DEL" };
        state.commands.push(format!("{command} {}", entry_key.1));
        Ok(u64::from(state.entries.remove(&entry_key).is_some()))
    }

    fn flush_database(&mut self) -> CacheResult<()> {
        let database = self.database;
        let mut state = self.state.lock();
        self.ensure_authenticated(&state)?;
        state.commands.push("FLUSHDB".to_string());
        state.entries.retain(|(db, _), _| *db != database);
        Ok(())
    }

    fn info(&mut self) -> CacheResult<CacheInfo> {
        let database = self.database;
        let state = self.state.lock();
        self.ensure_authenticated(&state)?;
        let keys = state.entries.keys().filter(|(db, _)| *db == database).count();

        let mut info = CacheInfo::new();
        info.insert("keys".to_string(), json!(keys));
        info.insert("database".to_string(), json!(database));
        Ok(info)
    }
}
