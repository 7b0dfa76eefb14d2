//! Strongroom CLI: client for the Strongroom server.
//!
//! Usage:
//!   strongroom list keys [--names-only]
//!   strongroom list storage [--path <p>] [--recursive]
//!   strongroom keys generate --name <n> [--description <d>] [--algorithm <a>] [--expires-in-ms <ms>]
//!   strongroom keys modify --key-id <k> [--name <n>] [--description <d>] [--expires-in-ms <ms>]
//!   strongroom keys remove --key-id <k>
//!   strongroom keys export --key-id <k> --output <file>
//!   strongroom keys import --key-id <k> --input <file> [--force]
//!   strongroom encrypt --path <file> --storage-path <p> --key-id <k> [--force] [--sig-key <file>]
//!   strongroom decrypt --path <p> --key-id <k> [--output <file>] [--sig-key <file>]
//!   strongroom remove --path <p>
//!   strongroom backup <list|invoke|manager|remove|export|import|restore> [...]
//!   strongroom version

mod client;
mod config;

use std::fs;
use std::io::Write;
use std::path::PathBuf;
use std::process::ExitCode;

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use serde_json::json;
use strongroom_envelope::signing;

use client::{ApiClient, CliError};
use config::ClientConfig;

fn main() -> ExitCode {
    let args: Vec<String> = std::env::args().collect();

    if args.len() < 2 {
        print_usage();
        return ExitCode::from(1);
    }

    let config = ClientConfig::load();
    let api = ApiClient::new(&config.host, config.port);

    let result = match args[1].as_str() {
        "list" => cmd_list(&api, &args[2..]),
        "keys" => cmd_keys(&api, &args[2..]),
        "encrypt" => cmd_encrypt(&api, &args[2..]),
        "decrypt" => cmd_decrypt(&api, &args[2..]),
        "remove" => cmd_remove(&api, &args[2..]),
        "backup" => cmd_backup(&api, &args[2..]),
        "version" => cmd_version(&api),
        "--help" | "-h" => {
            print_usage();
            Ok(())
        }
        "--version" | "-V" => {
            println!("strongroom {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
        cmd => {
            eprintln!("error: unknown command '{}'", cmd);
            print_usage();
            Err(CliError::Usage("unknown command".into()))
        }
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {}", e);
            if e.is_duplicate() {
                eprintln!("hint: pass --force to overwrite");
            }
            ExitCode::FAILURE
        }
    }
}

fn print_usage() {
    eprintln!(
        r#"Strongroom CLI: encrypted-object store client

USAGE:
    strongroom <COMMAND> [OPTIONS]

COMMANDS:
    list keys          List keys (names and metadata)
    list storage       List stored objects
    keys generate      Generate a named key
    keys modify        Rename/re-describe a key, update expiry
    keys remove        Remove a key
    keys export        Export a key package to a file
    keys import        Import a key package from a file
    encrypt            Encrypt a local file into the store
    decrypt            Decrypt a stored object
    remove             Remove a stored object
    backup             Backup management (list, invoke, manager,
                       remove, export, import, restore)
    version            Print the server version

OPTIONS:
    -h, --help         Print help
    -V, --version      Print client version
"#
    );
}

fn expect_value<'a>(args: &'a [String], i: usize, flag: &str) -> Result<&'a str, CliError> {
    args.get(i)
        .map(|s| s.as_str())
        .ok_or_else(|| CliError::Usage(format!("missing value for {}", flag)))
}

// ---------------------------------------------------------------------------
// list
// ---------------------------------------------------------------------------

fn cmd_list(api: &ApiClient, args: &[String]) -> Result<(), CliError> {
    match args.first().map(|s| s.as_str()) {
        Some("keys") => {
            let names_only = args.iter().any(|a| a == "--names-only");
            if names_only {
                let names: Vec<String> = api.get("/api/keys/names")?;
                for name in names {
                    println!("{}", name);
                }
            } else {
                let keys: Vec<client::KeyView> = api.get("/api/keys")?;
                for key in keys {
                    println!(
                        "{}\talgo={}\tcreated={}\tmodified={}\texpires={}\t{}",
                        key.name,
                        key.algorithm,
                        key.created_ms,
                        key.modified_ms,
                        key.expires_at_ms,
                        key.description
                    );
                }
            }
            Ok(())
        }
        Some("storage") => {
            let mut path = "/".to_string();
            let mut recursive = false;
            let mut i = 1;
            while i < args.len() {
                match args[i].as_str() {
                    "--path" => {
                        i += 1;
                        path = expect_value(args, i, "--path")?.to_string();
                    }
                    "--recursive" => recursive = true,
                    other => return Err(CliError::Usage(format!("unknown option: {}", other))),
                }
                i += 1;
            }
            let url = format!(
                "/api/storage?path={}&recursive={}",
                urlencode(&path),
                recursive
            );
            let entries: Vec<client::ContentEntry> = api.get(&url)?;
            for entry in entries {
                println!(
                    "{}\t{} bytes\tcreated={}\tmodified={}",
                    entry.path, entry.size_bytes, entry.created_ms, entry.modified_ms
                );
            }
            Ok(())
        }
        _ => Err(CliError::Usage("list requires 'keys' or 'storage'".into())),
    }
}

fn urlencode(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for byte in s.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' | b'/' => {
                out.push(byte as char)
            }
            _ => out.push_str(&format!("%{:02X}", byte)),
        }
    }
    out
}

// ---------------------------------------------------------------------------
// keys
// ---------------------------------------------------------------------------

fn cmd_keys(api: &ApiClient, args: &[String]) -> Result<(), CliError> {
    match args.first().map(|s| s.as_str()) {
        Some("generate") => keys_generate(api, &args[1..]),
        Some("modify") => keys_modify(api, &args[1..]),
        Some("remove") => keys_remove(api, &args[1..]),
        Some("export") => keys_export(api, &args[1..]),
        Some("import") => keys_import(api, &args[1..]),
        _ => Err(CliError::Usage(
            "keys requires one of: generate, modify, remove, export, import".into(),
        )),
    }
}

fn keys_generate(api: &ApiClient, args: &[String]) -> Result<(), CliError> {
    let mut name = None;
    let mut description = String::new();
    let mut algorithm: Option<String> = None;
    let mut expires_in_ms: i64 = 0;

    let mut i = 0;
    while i < args.len() {
        match args[i].as_str() {
            "--name" => {
                i += 1;
                name = Some(expect_value(args, i, "--name")?.to_string());
            }
            "--description" => {
                i += 1;
                description = expect_value(args, i, "--description")?.to_string();
            }
            "--algorithm" => {
                i += 1;
                algorithm = Some(expect_value(args, i, "--algorithm")?.to_string());
            }
            "--expires-in-ms" => {
                i += 1;
                expires_in_ms = expect_value(args, i, "--expires-in-ms")?
                    .parse()
                    .map_err(|_| CliError::Usage("--expires-in-ms must be an integer".into()))?;
            }
            other => return Err(CliError::Usage(format!("unknown option: {}", other))),
        }
        i += 1;
    }
    let name = name.ok_or_else(|| CliError::Usage("missing --name".into()))?;

    let response: client::GenerateKeyResponse = api.post(
        "/api/keys",
        &json!({
            "name": name,
            "description": description,
            "algorithm": algorithm,
            "expires_in_ms": expires_in_ms,
        }),
    )?;

    eprintln!("Generated key '{}' ({})", response.key.name, response.key.algorithm);
    if !response.key.public_key_pem.is_empty() {
        println!("{}", response.key.public_key_pem);
    }
    if let Some(seed) = response.ed25519_seed_b64 {
        eprintln!("Signing seed (shown once, store it safely):");
        println!("{}", seed);
    }
    Ok(())
}

fn keys_modify(api: &ApiClient, args: &[String]) -> Result<(), CliError> {
    let mut key_id = None;
    let mut new_name: Option<String> = None;
    let mut new_description: Option<String> = None;
    let mut modify_expiration = false;
    let mut expires_in_ms: i64 = 0;

    let mut i = 0;
    while i < args.len() {
        match args[i].as_str() {
            "--key-id" => {
                i += 1;
                key_id = Some(expect_value(args, i, "--key-id")?.to_string());
            }
            "--name" => {
                i += 1;
                new_name = Some(expect_value(args, i, "--name")?.to_string());
            }
            "--description" => {
                i += 1;
                new_description = Some(expect_value(args, i, "--description")?.to_string());
            }
            "--expires-in-ms" => {
                i += 1;
                modify_expiration = true;
                expires_in_ms = expect_value(args, i, "--expires-in-ms")?
                    .parse()
                    .map_err(|_| CliError::Usage("--expires-in-ms must be an integer".into()))?;
            }
            other => return Err(CliError::Usage(format!("unknown option: {}", other))),
        }
        i += 1;
    }
    let key_id = key_id.ok_or_else(|| CliError::Usage("missing --key-id".into()))?;

    let key: client::KeyView = api.post(
        &format!("/api/keys/{}/modify", key_id),
        &json!({
            "new_name": new_name,
            "new_description": new_description,
            "modify_expiration": modify_expiration,
            "expires_in_ms": expires_in_ms,
        }),
    )?;
    eprintln!("Modified key '{}'", key.name);
    Ok(())
}

fn keys_remove(api: &ApiClient, args: &[String]) -> Result<(), CliError> {
    let mut key_id = None;
    let mut i = 0;
    while i < args.len() {
        match args[i].as_str() {
            "--key-id" => {
                i += 1;
                key_id = Some(expect_value(args, i, "--key-id")?.to_string());
            }
            other => return Err(CliError::Usage(format!("unknown option: {}", other))),
        }
        i += 1;
    }
    let key_id = key_id.ok_or_else(|| CliError::Usage("missing --key-id".into()))?;

    let key: client::KeyView = api.delete(&format!("/api/keys/{}", key_id))?;
    eprintln!("Removed key '{}'", key.name);
    Ok(())
}

fn keys_export(api: &ApiClient, args: &[String]) -> Result<(), CliError> {
    let mut key_id = None;
    let mut output = None;
    let mut i = 0;
    while i < args.len() {
        match args[i].as_str() {
            "--key-id" => {
                i += 1;
                key_id = Some(expect_value(args, i, "--key-id")?.to_string());
            }
            "--output" => {
                i += 1;
                output = Some(PathBuf::from(expect_value(args, i, "--output")?));
            }
            other => return Err(CliError::Usage(format!("unknown option: {}", other))),
        }
        i += 1;
    }
    let key_id = key_id.ok_or_else(|| CliError::Usage("missing --key-id".into()))?;
    let output = output.ok_or_else(|| CliError::Usage("missing --output".into()))?;

    let response: client::ExportKeyResponse = api.get(&format!("/api/keys/{}/export", key_id))?;
    let data = BASE64
        .decode(&response.data_b64)
        .map_err(|e| CliError::Http(format!("bad export payload: {}", e)))?;
    fs::write(&output, &data)?;
    eprintln!("Exported key '{}' to {} ({} bytes)", response.key_id, output.display(), data.len());
    Ok(())
}

fn keys_import(api: &ApiClient, args: &[String]) -> Result<(), CliError> {
    let mut key_id = None;
    let mut input = None;
    let mut force = false;
    let mut i = 0;
    while i < args.len() {
        match args[i].as_str() {
            "--key-id" => {
                i += 1;
                key_id = Some(expect_value(args, i, "--key-id")?.to_string());
            }
            "--input" => {
                i += 1;
                input = Some(PathBuf::from(expect_value(args, i, "--input")?));
            }
            "--force" => force = true,
            other => return Err(CliError::Usage(format!("unknown option: {}", other))),
        }
        i += 1;
    }
    let key_id = key_id.ok_or_else(|| CliError::Usage("missing --key-id".into()))?;
    let input = input.ok_or_else(|| CliError::Usage("missing --input".into()))?;

    let data = fs::read(&input)?;
    let key: client::KeyView = api.post(
        &format!("/api/keys/{}/import", key_id),
        &json!({ "data_b64": BASE64.encode(&data), "force": force }),
    )?;
    eprintln!("Imported key '{}'", key.name);
    Ok(())
}

// ---------------------------------------------------------------------------
// encrypt / decrypt / remove
// ---------------------------------------------------------------------------

fn load_signer(path: &PathBuf) -> Result<strongroom_envelope::SigningKey, CliError> {
    let seed = fs::read_to_string(path)?;
    signing::signing_key_from_base64(&seed).map_err(|e| CliError::Usage(e.to_string()))
}

fn cmd_encrypt(api: &ApiClient, args: &[String]) -> Result<(), CliError> {
    let mut path = None;
    let mut storage_path = "/".to_string();
    let mut key_id = None;
    let mut force = false;
    let mut sig_key: Option<PathBuf> = None;

    let mut i = 0;
    while i < args.len() {
        match args[i].as_str() {
            "--path" => {
                i += 1;
                path = Some(PathBuf::from(expect_value(args, i, "--path")?));
            }
            "--storage-path" => {
                i += 1;
                storage_path = expect_value(args, i, "--storage-path")?.to_string();
            }
            "--key-id" => {
                i += 1;
                key_id = Some(expect_value(args, i, "--key-id")?.to_string());
            }
            "--force" => force = true,
            "--sig-key" => {
                i += 1;
                sig_key = Some(PathBuf::from(expect_value(args, i, "--sig-key")?));
            }
            other => return Err(CliError::Usage(format!("unknown option: {}", other))),
        }
        i += 1;
    }
    let path = path.ok_or_else(|| CliError::Usage("missing --path".into()))?;
    let key_id = key_id.ok_or_else(|| CliError::Usage("missing --key-id".into()))?;

    let plaintext = fs::read(&path)?;
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .ok_or_else(|| CliError::Usage(format!("no file name in {}", path.display())))?;

    let signature_b64 = match &sig_key {
        Some(seed_path) => {
            let signer = load_signer(seed_path)?;
            Some(BASE64.encode(signing::sign(&signer, &plaintext)))
        }
        None => None,
    };

    let response: client::EncryptResponse = api.post(
        "/api/encrypt",
        &json!({
            "file_name": file_name,
            "storage_path": storage_path,
            "key_id": key_id,
            "overwrite": force,
            "data_b64": BASE64.encode(&plaintext),
            "size_bytes": plaintext.len() as u64,
            "signature_b64": signature_b64,
        }),
    )?;

    eprintln!(
        "Encrypted {} bytes into '{}' (file id {})",
        plaintext.len(),
        response.storage_path,
        response.file_id
    );
    Ok(())
}

fn cmd_decrypt(api: &ApiClient, args: &[String]) -> Result<(), CliError> {
    let mut path = None;
    let mut key_id = None;
    let mut output: Option<PathBuf> = None;
    let mut sig_key: Option<PathBuf> = None;

    let mut i = 0;
    while i < args.len() {
        match args[i].as_str() {
            "--path" => {
                i += 1;
                path = Some(expect_value(args, i, "--path")?.to_string());
            }
            "--key-id" => {
                i += 1;
                key_id = Some(expect_value(args, i, "--key-id")?.to_string());
            }
            "--output" => {
                i += 1;
                output = Some(PathBuf::from(expect_value(args, i, "--output")?));
            }
            "--sig-key" => {
                i += 1;
                sig_key = Some(PathBuf::from(expect_value(args, i, "--sig-key")?));
            }
            other => return Err(CliError::Usage(format!("unknown option: {}", other))),
        }
        i += 1;
    }
    let path = path.ok_or_else(|| CliError::Usage("missing --path".into()))?;
    let key_id = key_id.ok_or_else(|| CliError::Usage("missing --key-id".into()))?;

    // The signed message is the path exactly as sent.
    let signature_b64 = match &sig_key {
        Some(seed_path) => {
            let signer = load_signer(seed_path)?;
            Some(BASE64.encode(signing::sign(&signer, path.as_bytes())))
        }
        None => None,
    };

    let response: client::DecryptResponse = api.post(
        "/api/decrypt",
        &json!({
            "path": path,
            "key_id": key_id,
            "signature_b64": signature_b64,
        }),
    )?;

    let plaintext = BASE64
        .decode(&response.data_b64)
        .map_err(|e| CliError::Http(format!("bad decrypt payload: {}", e)))?;

    match output {
        Some(out) => {
            fs::write(&out, &plaintext)?;
            eprintln!(
                "Decrypted '{}' ({} bytes) to {}",
                response.file_name,
                response.size_bytes,
                out.display()
            );
        }
        None => {
            std::io::stdout().write_all(&plaintext)?;
        }
    }
    Ok(())
}

fn cmd_remove(api: &ApiClient, args: &[String]) -> Result<(), CliError> {
    let mut path = None;
    let mut i = 0;
    while i < args.len() {
        match args[i].as_str() {
            "--path" => {
                i += 1;
                path = Some(expect_value(args, i, "--path")?.to_string());
            }
            other => return Err(CliError::Usage(format!("unknown option: {}", other))),
        }
        i += 1;
    }
    let path = path.ok_or_else(|| CliError::Usage("missing --path".into()))?;

    let _: serde_json::Value = api.post("/api/storage/remove", &json!({ "path": path }))?;
    eprintln!("Removed '{}'", path);
    Ok(())
}

// ---------------------------------------------------------------------------
// backup
// ---------------------------------------------------------------------------

fn cmd_backup(api: &ApiClient, args: &[String]) -> Result<(), CliError> {
    match args.first().map(|s| s.as_str()) {
        Some("list") => {
            let backups: Vec<client::BackupEntry> = api.get("/api/backups")?;
            for backup in backups {
                println!(
                    "{}\tcreated={}\texpires_in_ms={}",
                    backup.name, backup.created_ms, backup.expires_in_ms
                );
            }
            Ok(())
        }
        Some("invoke") => {
            let entry: client::BackupEntry = api.post("/api/backups/invoke", &json!({}))?;
            eprintln!("Backup created: {}", entry.name);
            Ok(())
        }
        Some("manager") => backup_manager(api, &args[1..]),
        Some("remove") => {
            let name = args.get(1).ok_or_else(|| CliError::Usage("missing backup name".into()))?;
            let entry: client::BackupEntry = api.delete(&format!("/api/backups/{}", name))?;
            eprintln!("Removed backup: {}", entry.name);
            Ok(())
        }
        Some("export") => {
            let name = args.get(1).ok_or_else(|| CliError::Usage("missing backup name".into()))?;
            let mut output = None;
            let mut i = 2;
            while i < args.len() {
                match args[i].as_str() {
                    "--output" => {
                        i += 1;
                        output = Some(PathBuf::from(expect_value(args, i, "--output")?));
                    }
                    other => return Err(CliError::Usage(format!("unknown option: {}", other))),
                }
                i += 1;
            }
            let output = output.unwrap_or_else(|| PathBuf::from(name));

            let response: client::ExportBackupResponse =
                api.get(&format!("/api/backups/{}/export", name))?;
            let data = BASE64
                .decode(&response.data_b64)
                .map_err(|e| CliError::Http(format!("bad export payload: {}", e)))?;
            fs::write(&output, &data)?;
            eprintln!("Exported backup '{}' to {} ({} bytes)", response.name, output.display(), data.len());
            Ok(())
        }
        Some("import") => {
            let input = args
                .get(1)
                .map(PathBuf::from)
                .ok_or_else(|| CliError::Usage("missing backup file".into()))?;
            let mut name: Option<String> = None;
            let mut i = 2;
            while i < args.len() {
                match args[i].as_str() {
                    "--name" => {
                        i += 1;
                        name = Some(expect_value(args, i, "--name")?.to_string());
                    }
                    other => return Err(CliError::Usage(format!("unknown option: {}", other))),
                }
                i += 1;
            }
            let name = match name {
                Some(name) => name,
                None => input
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .ok_or_else(|| CliError::Usage("cannot derive backup name".into()))?,
            };

            let data = fs::read(&input)?;
            let _: serde_json::Value = api.post(
                "/api/backups/import",
                &json!({ "name": name, "data_b64": BASE64.encode(&data) }),
            )?;
            eprintln!("Imported backup '{}'", name);
            Ok(())
        }
        Some("restore") => {
            let name = args.get(1).ok_or_else(|| CliError::Usage("missing backup name".into()))?;
            let safety: client::BackupEntry =
                api.post(&format!("/api/backups/{}/restore", name), &json!({}))?;
            eprintln!("Restored from '{}'; safety snapshot: {}", name, safety.name);
            Ok(())
        }
        _ => Err(CliError::Usage(
            "backup requires one of: list, invoke, manager, remove, export, import, restore".into(),
        )),
    }
}

fn backup_manager(api: &ApiClient, args: &[String]) -> Result<(), CliError> {
    let mut enabled: Option<bool> = None;
    let mut retention_ms: Option<i64> = None;
    let mut frequency_ms: Option<i64> = None;

    let mut i = 0;
    while i < args.len() {
        match args[i].as_str() {
            "--enable" => enabled = Some(true),
            "--disable" => enabled = Some(false),
            "--retention-ms" => {
                i += 1;
                retention_ms = Some(
                    expect_value(args, i, "--retention-ms")?
                        .parse()
                        .map_err(|_| CliError::Usage("--retention-ms must be an integer".into()))?,
                );
            }
            "--frequency-ms" => {
                i += 1;
                frequency_ms = Some(
                    expect_value(args, i, "--frequency-ms")?
                        .parse()
                        .map_err(|_| CliError::Usage("--frequency-ms must be an integer".into()))?,
                );
            }
            other => return Err(CliError::Usage(format!("unknown option: {}", other))),
        }
        i += 1;
    }

    let view: client::BackupConfigView =
        if enabled.is_none() && retention_ms.is_none() && frequency_ms.is_none() {
            api.get("/api/backups/config")?
        } else {
            api.post(
                "/api/backups/config",
                &json!({
                    "enabled": enabled,
                    "retention_ms": retention_ms,
                    "frequency_ms": frequency_ms,
                }),
            )?
        };

    println!(
        "enabled={} last_backup_ms={} total={} retention_ms={} frequency_ms={}",
        view.enabled, view.last_backup_ms, view.total, view.retention_ms, view.frequency_ms
    );
    Ok(())
}

// ---------------------------------------------------------------------------
// version
// ---------------------------------------------------------------------------

fn cmd_version(api: &ApiClient) -> Result<(), CliError> {
    let response: client::VersionResponse = api.get("/api/version")?;
    println!("{}", response.version);
    Ok(())
}
