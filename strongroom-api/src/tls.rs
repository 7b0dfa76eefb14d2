//! TLS material loading: the configured cert/key pair plus an optional
//! pool directory of `*cert.pem` / `*key.pem` pairs.
//!
//! Only the material interface is owned here; the terminating listener
//! is an external collaborator. The server's decision is binary: material
//! present, or fall back to insecure with a log line.

use std::fs;
use std::path::{Path, PathBuf};

use crate::config::ServerConfig;

/// One loaded certificate/key pair.
pub struct TlsMaterial {
    pub cert_path: PathBuf,
    pub key_path: PathBuf,
    pub cert_pem: Vec<u8>,
    pub key_pem: Vec<u8>,
}

fn load_pair(cert_path: &Path, key_path: &Path) -> Option<TlsMaterial> {
    if !cert_path.is_file() || !key_path.is_file() {
        return None;
    }
    let cert_pem = fs::read(cert_path).ok()?;
    let key_pem = fs::read(key_path).ok()?;
    Some(TlsMaterial {
        cert_path: cert_path.to_path_buf(),
        key_path: key_path.to_path_buf(),
        cert_pem,
        key_pem,
    })
}

/// Gather every available pair: the configured one first, then the pool.
pub fn load_material(config: &ServerConfig) -> Vec<TlsMaterial> {
    let mut out = Vec::new();

    if let Some(pair) = load_pair(
        Path::new(&config.tls_cert_path),
        Path::new(&config.tls_key_path),
    ) {
        tracing::info!(cert = %pair.cert_path.display(), key = %pair.key_path.display(), "TLS material loaded");
        out.push(pair);
    }

    if !config.tls_pool_path.is_empty() {
        out.extend(scan_pool(Path::new(&config.tls_pool_path)));
    }

    out
}

/// Scan a directory for `*cert.pem` files with sibling `*key.pem` files.
fn scan_pool(pool: &Path) -> Vec<TlsMaterial> {
    let mut out = Vec::new();
    let entries = match fs::read_dir(pool) {
        Ok(entries) => entries,
        Err(e) => {
            tracing::warn!(pool = %pool.display(), error = %e, "TLS pool path unreadable");
            return out;
        }
    };

    for entry in entries.flatten() {
        let cert_path = entry.path();
        let Some(name) = cert_path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        let Some(prefix) = name.strip_suffix("cert.pem") else {
            continue;
        };
        let key_path = pool.join(format!("{}key.pem", prefix));
        if let Some(pair) = load_pair(&cert_path, &key_path) {
            tracing::info!(cert = %pair.cert_path.display(), "alternate TLS certificate loaded from pool");
            out.push(pair);
        }
    }

    out
}
