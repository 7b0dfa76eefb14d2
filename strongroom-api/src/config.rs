//! Server configuration: loaded from JSON at startup, mutated in memory by
//! admin operations, flushed on change and at shutdown.

use std::fs;
use std::io;
use std::path::Path;

use serde::{Deserialize, Serialize};

pub const CONFIG_DIR: &str = ".config";
pub const SERVER_CONFIG_FILE: &str = "config-server.json";

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BackupConfig {
    pub enable: bool,
    /// How long snapshots are retained, in milliseconds.
    pub retention_ms: i64,
    /// How often the loop snapshots, in milliseconds.
    pub frequency_ms: i64,
}

impl Default for BackupConfig {
    fn default() -> Self {
        Self {
            enable: false,
            retention_ms: 7 * 24 * 60 * 60 * 1000,
            frequency_ms: 24 * 60 * 60 * 1000,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServerConfig {
    pub default_key_algorithm: String,
    pub insecure: bool,
    pub host: String,
    pub port: u16,
    pub tls_cert_path: String,
    pub tls_key_path: String,
    /// Optional directory scanned for `*cert.pem` / `*key.pem` pairs,
    /// each loaded as an alternate server certificate. Empty = unused.
    pub tls_pool_path: String,
    pub backup: BackupConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            default_key_algorithm: "rsa".to_string(),
            insecure: false,
            host: "0.0.0.0".to_string(),
            port: 50051,
            tls_cert_path: "cert/server.crt".to_string(),
            tls_key_path: "cert/server.key".to_string(),
            tls_pool_path: String::new(),
            backup: BackupConfig::default(),
        }
    }
}

impl ServerConfig {
    /// Read the config file, or write defaults on first run.
    pub fn load_or_init(path: &Path) -> io::Result<Self> {
        if path.is_file() {
            let data = fs::read_to_string(path)?;
            let config = serde_json::from_str(&data)
                .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
            tracing::info!(path = %path.display(), "loaded configuration");
            return Ok(config);
        }

        tracing::info!(path = %path.display(), "no configuration found, writing defaults");
        let config = Self::default();
        config.save(path)?;
        Ok(config)
    }

    /// Flush to disk: temp sibling then rename.
    pub fn save(&self, path: &Path) -> io::Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, json)?;
        fs::rename(&tmp, path)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_written_on_first_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CONFIG_DIR).join(SERVER_CONFIG_FILE);

        let config = ServerConfig::load_or_init(&path).unwrap();
        assert!(path.is_file());
        assert_eq!(config.default_key_algorithm, "rsa");
        assert!(!config.backup.enable);

        // Round-trips through the file.
        let reloaded = ServerConfig::load_or_init(&path).unwrap();
        assert_eq!(reloaded.port, config.port);
    }

    #[test]
    fn partial_document_fills_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(SERVER_CONFIG_FILE);
        std::fs::write(&path, r#"{"port": 9000, "backup": {"enable": true}}"#).unwrap();

        let config = ServerConfig::load_or_init(&path).unwrap();
        assert_eq!(config.port, 9000);
        assert!(config.backup.enable);
        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.backup.frequency_ms, 24 * 60 * 60 * 1000);
    }
}
