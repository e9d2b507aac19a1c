//! # Cache Configuration
//!
//! One [`CacheConfiguration`] describes one backend: its identity, default TTL and
//! the connection/policy knobs that backend understands. It is created once by the
//! embedding application (usually via [`CacheConfiguration::load`]) and handed to a
//! driver, which treats it as read-only from then on.
//!
//! ```toml
//! default_ttl_seconds = 300
//!
//! [backend]
//! service = "cluster"
//! hosts = ["redis://10.0.0.1:7000", "redis://10.0.0.2:7000"]
//! read_timeout_ms = 1500
//! auth = ["cache-user", "s3cret"]
//! asynchronous_delete = true
//! client_options = [{ name = "prefix", value = "rs:" }]
//! ```

pub mod error;
pub mod loader;

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

pub use error::{ConfigResult, ConfigurationError};
pub use loader::ENV_PREFIX;

/// Default TTL applied when neither the call nor the configuration says otherwise
pub const DEFAULT_TTL_SECONDS: u64 = 3600;

/// Default shared-memory segment location (tmpfs on Linux)
pub const DEFAULT_SEGMENT_PATH: &str = "/dev/shm/recordset-cache";

/// Settings for one cache backend
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CacheConfiguration {
    /// Seconds an entry stays fresh; `0` caches forever
    pub default_ttl_seconds: u64,
    /// Log successful outcomes at `info` instead of `debug`
    pub debug: bool,
    pub backend: BackendConfig,
}

impl Default for CacheConfiguration {
    fn default() -> Self {
        Self {
            default_ttl_seconds: DEFAULT_TTL_SECONDS,
            debug: false,
            backend: BackendConfig::Local(LocalConfig::default()),
        }
    }
}

impl CacheConfiguration {
    /// Local in-process cache with default settings
    pub fn local() -> Self {
        Self::default()
    }

    /// Redis Cluster cache seeded from `hosts`
    pub fn cluster<I, S>(hosts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            backend: BackendConfig::Cluster(ClusterConfig {
                hosts: hosts.into_iter().map(Into::into).collect(),
                ..ClusterConfig::default()
            }),
            ..Self::default()
        }
    }

    /// Shared-memory cache rooted at `segment_path`
    pub fn shared_memory(segment_path: impl Into<PathBuf>) -> Self {
        Self {
            backend: BackendConfig::SharedMemory(SharedMemoryConfig {
                segment_path: segment_path.into(),
                ..SharedMemoryConfig::default()
            }),
            ..Self::default()
        }
    }

    pub fn with_default_ttl(mut self, seconds: u64) -> Self {
        self.default_ttl_seconds = seconds;
        self
    }

    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    pub fn kind(&self) -> BackendKind {
        self.backend.kind()
    }

    /// Short, stable identifier of the backend service
    pub fn service_name(&self) -> &'static str {
        self.kind().service_name()
    }

    /// Human-readable backend name used in log messages
    pub fn service_description(&self) -> &'static str {
        self.kind().service_description()
    }

    /// Reject configurations that can never produce a working driver
    pub fn validate(&self) -> ConfigResult<()> {
        match &self.backend {
            BackendConfig::Local(_) => Ok(()),
            BackendConfig::Cluster(cluster) => cluster.validate(),
            BackendConfig::SharedMemory(shm) => shm.validate(),
        }
    }
}

/// The closed set of supported backends
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    Local,
    Cluster,
    SharedMemory,
}

impl BackendKind {
    pub fn service_name(&self) -> &'static str {
        match self {
            Self::Local => "local",
            Self::Cluster => "redis-cluster",
            Self::SharedMemory => "shm",
        }
    }

    pub fn service_description(&self) -> &'static str {
        match self {
            Self::Local => "Local in-process cache",
            Self::Cluster => "Redis Cluster",
            Self::SharedMemory => "Shared memory segment",
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.service_name())
    }
}

/// Backend-specific settings, tagged by `service`
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "service", rename_all = "snake_case")]
pub enum BackendConfig {
    Local(LocalConfig),
    Cluster(ClusterConfig),
    SharedMemory(SharedMemoryConfig),
}

impl BackendConfig {
    pub fn kind(&self) -> BackendKind {
        match self {
            Self::Local(_) => BackendKind::Local,
            Self::Cluster(_) => BackendKind::Cluster,
            Self::SharedMemory(_) => BackendKind::SharedMemory,
        }
    }
}

/// In-process cache settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LocalConfig {
    /// Facility switch; a disabled facility is treated as unavailable
    pub enabled: bool,
    /// Maximum number of entries held before eviction
    pub max_capacity: u64,
    /// Connect without a handle when the facility is unavailable
    pub allow_degraded: bool,
}

impl Default for LocalConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_capacity: 10_000,
            allow_degraded: false,
        }
    }
}

/// Redis Cluster settings
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ClusterConfig {
    /// Seed nodes, e.g. `redis://10.0.0.1:7000`
    pub hosts: Vec<String>,
    /// Share one client per `persistent_id` across drivers in this process
    pub persistent: bool,
    pub persistent_id: Option<String>,
    /// Minimum wait between retries of a failed request, `0` keeps the client default
    pub retry_interval_ms: u64,
    /// Socket read timeout, `0` disables it
    pub read_timeout_ms: u64,
    /// Connect timeout, `0` keeps the client default
    pub connection_timeout_ms: u64,
    /// Static credential: `[password]` or `[username, password]`
    pub auth: Option<ClusterCredential>,
    /// Credential-producing function; takes precedence over `auth`
    #[serde(skip)]
    pub auth_provider: Option<CredentialProvider>,
    /// Database index, `0` leaves the default selected
    pub database: u32,
    /// Extra client options, applied in order after connecting
    pub client_options: Vec<ClientOption>,
    /// Delete with UNLINK (reclaimed in the background) instead of DEL
    pub asynchronous_delete: bool,
}

impl ClusterConfig {
    pub fn read_timeout(&self) -> Option<Duration> {
        (self.read_timeout_ms > 0).then(|| Duration::from_millis(self.read_timeout_ms))
    }

    pub fn connection_timeout(&self) -> Option<Duration> {
        (self.connection_timeout_ms > 0).then(|| Duration::from_millis(self.connection_timeout_ms))
    }

    /// Registry key for persistent clients
    pub fn persistent_key(&self) -> String {
        self.persistent_id
            .clone()
            .unwrap_or_else(|| self.hosts.join(","))
    }

    pub fn with_auth_provider<F>(mut self, provider: F) -> Self
    where
        F: Fn() -> Result<ClusterCredential, String> + Send + Sync + 'static,
    {
        self.auth_provider = Some(CredentialProvider::new(provider));
        self
    }

    fn validate(&self) -> ConfigResult<()> {
        if self.hosts.is_empty() {
            return Err(ConfigurationError::missing_required_field(
                "backend.hosts",
                "cluster backend",
            ));
        }
        if let Some(host) = self.hosts.iter().find(|h| h.trim().is_empty()) {
            return Err(ConfigurationError::invalid_value(
                "backend.hosts",
                host.clone(),
                "host entries must not be blank",
            ));
        }
        if self.client_options.iter().any(|o| o.name.trim().is_empty()) {
            return Err(ConfigurationError::invalid_value(
                "backend.client_options",
                "",
                "client option names must not be blank",
            ));
        }
        Ok(())
    }
}

/// Credential used to authenticate against the cluster
#[derive(Clone, PartialEq, Eq, Deserialize)]
#[serde(try_from = "Vec<String>")]
pub struct ClusterCredential {
    username: Option<String>,
    password: String,
}

impl ClusterCredential {
    pub fn password(password: impl Into<String>) -> Self {
        Self {
            username: None,
            password: password.into(),
        }
    }

    pub fn user_password(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: Some(username.into()),
            password: password.into(),
        }
    }

    pub fn username(&self) -> Option<&str> {
        self.username.as_deref()
    }

    pub fn secret(&self) -> &str {
        &self.password
    }
}

impl TryFrom<Vec<String>> for ClusterCredential {
    type Error = String;

    fn try_from(parts: Vec<String>) -> Result<Self, Self::Error> {
        let mut parts = parts.into_iter();
        match (parts.next(), parts.next(), parts.next()) {
            (Some(password), None, None) => Ok(Self::password(password)),
            (Some(username), Some(password), None) => Ok(Self::user_password(username, password)),
            _ => Err("auth must be [password] or [username, password]".to_string()),
        }
    }
}

impl fmt::Debug for ClusterCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClusterCredential")
            .field("username", &self.username)
            .field("password", &"***")
            .finish()
    }
}

/// Function invoked at connect time to obtain a fresh credential
#[derive(Clone)]
pub struct CredentialProvider(Arc<dyn Fn() -> Result<ClusterCredential, String> + Send + Sync>);

impl CredentialProvider {
    pub fn new<F>(provider: F) -> Self
    where
        F: Fn() -> Result<ClusterCredential, String> + Send + Sync + 'static,
    {
        Self(Arc::new(provider))
    }

    pub fn produce(&self) -> Result<ClusterCredential, String> {
        (self.0)()
    }
}

impl fmt::Debug for CredentialProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("CredentialProvider(..)")
    }
}

/// One extra client option
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientOption {
    pub name: String,
    pub value: String,
}

impl ClientOption {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

/// Shared-memory segment settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SharedMemoryConfig {
    /// Directory holding the segment, normally on a tmpfs mount
    pub segment_path: PathBuf,
    /// Largest envelope accepted by a write
    pub max_value_bytes: u64,
}

impl Default for SharedMemoryConfig {
    fn default() -> Self {
        Self {
            segment_path: PathBuf::from(DEFAULT_SEGMENT_PATH),
            max_value_bytes: 64 * 1024 * 1024,
        }
    }
}

impl SharedMemoryConfig {
    fn validate(&self) -> ConfigResult<()> {
        if self.segment_path.as_os_str().is_empty() {
            return Err(ConfigurationError::missing_required_field(
                "backend.segment_path",
                "shared_memory backend",
            ));
        }
        if self.max_value_bytes == 0 {
            return Err(ConfigurationError::invalid_value(
                "backend.max_value_bytes",
                "0",
                "must be greater than 0",
            ));
        }
        Ok(())
    }
}
