//! Client configuration: where the server lives.

use std::fs;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

pub const CONFIG_DIR: &str = ".config";
pub const CLIENT_CONFIG_FILE: &str = "config-client.json";

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ClientConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self { host: "localhost".to_string(), port: 50051 }
    }
}

impl ClientConfig {
    /// Load `.config/config-client.json`, writing defaults on first run.
    /// `STRONGROOM_ADDR` (host:port) overrides both fields.
    pub fn load() -> Self {
        let path = PathBuf::from(CONFIG_DIR).join(CLIENT_CONFIG_FILE);

        let mut config = if path.is_file() {
            fs::read_to_string(&path)
                .ok()
                .and_then(|data| serde_json::from_str(&data).ok())
                .unwrap_or_default()
        } else {
            let config = Self::default();
            if fs::create_dir_all(CONFIG_DIR).is_ok() {
                if let Ok(json) = serde_json::to_string_pretty(&config) {
                    let _ = fs::write(&path, json);
                }
            }
            config
        };

        if let Ok(addr) = std::env::var("STRONGROOM_ADDR") {
            if let Some((host, port)) = addr.rsplit_once(':') {
                if let Ok(port) = port.parse() {
                    config.host = host.to_string();
                    config.port = port;
                }
            }
        }

        config
    }
}
