//! Service configuration
//!
//! Loaded from a JSON file; command-line flags override individual fields.
//! A missing file yields the defaults.

use std::fs::File;
use std::io::BufReader;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{Result, StatsError};
use crate::keys::{DirectoryStore, MemoryStore, RemoteStore};
use crate::params::SchemeParams;

/// Where uploaded key blobs live
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RemoteConfig {
    Directory {
        path: PathBuf,
    },
    Http {
        base_url: String,
        #[serde(default = "default_timeout_secs")]
        timeout_secs: u64,
    },
    /// Process-local store; contents vanish on restart
    Memory,
}

fn default_timeout_secs() -> u64 {
    10
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    pub bind: String,
    pub cache_dir: PathBuf,
    pub remote: RemoteConfig,
    pub params: SchemeParams,
    /// Upper bound on concurrently running computations
    pub blocking_threads: usize,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1:3000".to_string(),
            cache_dir: PathBuf::from("runstat_cache"),
            remote: RemoteConfig::Directory {
                path: PathBuf::from("runstat_keys"),
            },
            params: SchemeParams::default(),
            blocking_threads: 8,
        }
    }
}

impl ServiceConfig {
    /// Read a JSON config file, or defaults when it does not exist
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            info!(path = %path.display(), "No config file, using defaults");
            return Ok(Self::default());
        }

        let file = File::open(path)
            .map_err(|e| StatsError::Config(format!("opening {}: {}", path.display(), e)))?;
        let config: Self = serde_json::from_reader(BufReader::new(file))
            .map_err(|e| StatsError::Config(format!("parsing {}: {}", path.display(), e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        self.params
            .validate()
            .map_err(|e| StatsError::Config(e.to_string()))?;
        if self.blocking_threads == 0 {
            return Err(StatsError::Config("blocking_threads must be positive".to_string()));
        }
        Ok(())
    }

    /// Whether `bind` only accepts local connections. Host names other
    /// than `localhost` count as remote.
    pub fn bind_is_loopback(&self) -> bool {
        if let Ok(addr) = self.bind.parse::<SocketAddr>() {
            return addr.ip().is_loopback();
        }
        match self.bind.rsplit_once(':') {
            Some((host, port)) => {
                host.eq_ignore_ascii_case("localhost") && port.parse::<u16>().is_ok()
            }
            None => false,
        }
    }

    /// Construct the configured remote store
    ///
    /// The HTTP store wraps a blocking client; call this off the async
    /// runtime.
    pub fn build_remote(&self) -> Result<Box<dyn RemoteStore>> {
        match &self.remote {
            RemoteConfig::Directory { path } => Ok(Box::new(DirectoryStore::new(path))),
            RemoteConfig::Memory => Ok(Box::new(MemoryStore::new())),
            #[cfg(feature = "server")]
            RemoteConfig::Http {
                base_url,
                timeout_secs,
            } => Ok(Box::new(crate::keys::HttpStore::new(
                base_url,
                std::time::Duration::from_secs(*timeout_secs),
            )?)),
            #[cfg(not(feature = "server"))]
            RemoteConfig::Http { .. } => Err(StatsError::Config(
                "HTTP remote store requires the `server` feature".to_string(),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_missing_file_gives_defaults() {
        let dir = tempdir().unwrap();
        let config = ServiceConfig::load(&dir.path().join("absent.json")).unwrap();
        assert_eq!(config, ServiceConfig::default());
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(
            &path,
            r#"{ "bind": "127.0.0.1:9000", "remote": { "kind": "http", "base_url": "http://keys" } }"#,
        )
        .unwrap();

        let config = ServiceConfig::load(&path).unwrap();
        assert_eq!(config.bind, "127.0.0.1:9000");
        assert_eq!(
            config.remote,
            RemoteConfig::Http {
                base_url: "http://keys".to_string(),
                timeout_secs: 10
            }
        );
        assert_eq!(config.params, SchemeParams::default());
    }

    #[test]
    fn test_insecure_params_rejected() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(
            &path,
            r#"{ "params": { "slot_count": 8192, "scale_bits": 40, "max_depth": 4, "sigma": 3.2 } }"#,
        )
        .unwrap();

        let err = ServiceConfig::load(&path).unwrap_err();
        assert!(err.to_string().contains("insecure"));
    }

    #[test]
    fn test_malformed_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, "{ not json").unwrap();
        assert!(matches!(ServiceConfig::load(&path), Err(StatsError::Config(_))));
    }

    #[test]
    fn test_bind_is_loopback() {
        let with_bind = |bind: &str| ServiceConfig {
            bind: bind.to_string(),
            ..ServiceConfig::default()
        };

        assert!(ServiceConfig::default().bind_is_loopback());
        for bind in ["127.0.0.1:3000", "[::1]:3000", "localhost:8080", "127.8.0.1:1"] {
            assert!(with_bind(bind).bind_is_loopback(), "{}", bind);
        }
        for bind in ["0.0.0.0:3000", "[::]:3000", "10.1.2.3:80", "example.com:80", "localhost"] {
            assert!(!with_bind(bind).bind_is_loopback(), "{}", bind);
        }
    }
}
