//! Configuration Loader
//!
//! Reads a TOML file through the `config` crate and layers environment overrides
//! on top: `RECORDSET_CACHE__DEFAULT_TTL_SECONDS=60` or
//! `RECORDSET_CACHE__BACKEND__DATABASE=2`. The result is validated before it is
//! returned.

use super::error::{ConfigResult, ConfigurationError};
use super::CacheConfiguration;
use config::{Config, Environment, File, FileFormat};
use std::path::Path;
use tracing::debug;

/// Prefix for environment variable overrides
pub const ENV_PREFIX: &str = "RECORDSET_CACHE";

impl CacheConfiguration {
    /// Load a configuration file with environment overrides
    pub fn load(path: &Path) -> ConfigResult<Self> {
        if !path.is_file() {
            return Err(ConfigurationError::config_file_not_found(
                path.to_path_buf(),
            ));
        }

        let source_name = path.display().to_string();
        let settings = Config::builder()
            .add_source(File::from(path).format(FileFormat::Toml))
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .map_err(|e| ConfigurationError::load_error(&source_name, e))?;

        let config = Self::from_settings(settings, &source_name)?;
        debug!(
            path = %source_name,
            service = config.service_name(),
            default_ttl_seconds = config.default_ttl_seconds,
            "Cache configuration loaded"
        );
        Ok(config)
    }

    /// Parse configuration from TOML text without consulting the environment
    pub fn from_toml_str(toml: &str) -> ConfigResult<Self> {
        let settings = Config::builder()
            .add_source(File::from_str(toml, FileFormat::Toml))
            .build()
            .map_err(|e| ConfigurationError::load_error("<inline>", e))?;

        Self::from_settings(settings, "<inline>")
    }

    fn from_settings(settings: Config, source_name: &str) -> ConfigResult<Self> {
        let config: Self = settings
            .try_deserialize()
            .map_err(|e| ConfigurationError::load_error(source_name, e))?;
        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::super::{BackendConfig, BackendKind, ClientOption};
    use super::*;
    use std::io::Write;

    #[test]
    fn test_parse_cluster_configuration() {
        let config = CacheConfiguration::from_toml_str(
            r#"
            default_ttl_seconds = 300

            [backend]
            service = "cluster"
            hosts = ["redis://10.0.0.1:7000", "redis://10.0.0.2:7000"]
            read_timeout_ms = 1500
            database = 2
            auth = ["cache-user", "s3cret"]
            asynchronous_delete = true
            client_options = [
                { name = "prefix", value = "rs:" },
                { name = "read_timeout_ms", value = "900" },
            ]
            "#,
        )
        .unwrap();

        assert_eq!(config.default_ttl_seconds, 300);
        let BackendConfig::Cluster(cluster) = &config.backend else {
            panic!("expected cluster backend, got {:?}", config.kind());
        };
        assert_eq!(cluster.hosts.len(), 2);
        assert_eq!(cluster.database, 2);
        assert!(cluster.asynchronous_delete);
        assert_eq!(
            cluster.auth.as_ref().and_then(|a| a.username()),
            Some("cache-user")
        );
        assert_eq!(
            cluster.client_options,
            vec![
                ClientOption::new("prefix", "rs:"),
                ClientOption::new("read_timeout_ms", "900"),
            ]
        );
    }

    #[test]
    fn test_parse_shared_memory_defaults() {
        let config = CacheConfiguration::from_toml_str(
            r#"
            [backend]
            service = "shared_memory"
            segment_path = "/dev/shm/reports"
            "#,
        )
        .unwrap();

        assert_eq!(config.kind(), BackendKind::SharedMemory);
        assert_eq!(config.default_ttl_seconds, super::super::DEFAULT_TTL_SECONDS);
    }

    #[test]
    fn test_invalid_cluster_configuration_is_rejected() {
        let err = CacheConfiguration::from_toml_str(
            r#"
            [backend]
            service = "cluster"
            "#,
        )
        .unwrap_err();
        assert!(matches!(
            err,
            ConfigurationError::MissingRequiredField { .. }
        ));
    }

    #[test]
    fn test_unknown_service_is_rejected() {
        let err = CacheConfiguration::from_toml_str(
            r#"
            [backend]
            service = "memcache"
            "#,
        )
        .unwrap_err();
        assert!(matches!(err, ConfigurationError::LoadError { .. }));
    }

    #[test]
    fn test_load_missing_file() {
        let err = CacheConfiguration::load(Path::new("/nonexistent/cache.toml")).unwrap_err();
        assert!(matches!(err, ConfigurationError::ConfigFileNotFound { .. }));
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            "default_ttl_seconds = 42\n[backend]\nservice = \"local\"\nmax_capacity = 5"
        )
        .unwrap();

        let config = CacheConfiguration::load(file.path()).unwrap();
        assert_eq!(config.default_ttl_seconds, 42);
        let BackendConfig::Local(local) = &config.backend else {
            panic!("expected local backend");
        };
        assert_eq!(local.max_capacity, 5);
        assert!(local.enabled);
    }
}
