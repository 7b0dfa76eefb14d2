//! Strongroom server binary.
//!
//! Environment:
//!   STRONGROOM_DATA_DIR    - working directory for `.storage` and `.config`
//!                            (default: current directory)
//!   STRONGROOM_LOG_FORMAT  - "json" for structured logging, "pretty" for dev
//!   RUST_LOG               - tracing filter override

use std::path::PathBuf;

use strongroom_api::config::{ServerConfig, CONFIG_DIR, SERVER_CONFIG_FILE};
use strongroom_api::{backup_task, routes, tls, AppState, Shared};

fn init_tracing() {
    let log_format = std::env::var("STRONGROOM_LOG_FORMAT").unwrap_or_else(|_| "pretty".into());
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        "strongroom_api=info,strongroom_keystore=info,strongroom_storage=info".into()
    });
    if log_format == "json" {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(env_filter)
            .with_target(true)
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(env_filter).init();
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c().await.ok();
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => tracing::error!(error = %e, "failed to install SIGTERM handler"),
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

async fn cleanup(state: &Shared) {
    tracing::info!("shutting down: flushing state");
    let _ = state.shutdown.send(true);
    if let Err(e) = state.flush_index().await {
        tracing::error!(error = %e, "failed to flush index at shutdown");
    }
    if let Err(e) = state.flush_config().await {
        tracing::error!(error = %e, "failed to flush config at shutdown");
    }
}

#[tokio::main]
async fn main() {
    init_tracing();

    let data_dir =
        PathBuf::from(std::env::var("STRONGROOM_DATA_DIR").unwrap_or_else(|_| ".".into()));
    let storage_root = data_dir.join(".storage");
    let config_path = data_dir.join(CONFIG_DIR).join(SERVER_CONFIG_FILE);

    // Startup order: config, index, catalog material rebuild, backup loop.
    let config = match ServerConfig::load_or_init(&config_path) {
        Ok(config) => config,
        Err(e) => {
            tracing::error!(path = %config_path.display(), error = %e, "could not load configuration");
            std::process::exit(1);
        }
    };

    let addr = format!("{}:{}", config.host, config.port);
    let insecure = config.insecure;

    let state = match AppState::bootstrap(storage_root, config, config_path) {
        Ok(state) => state,
        Err(e) => {
            tracing::error!(error = %e, "could not initialize storage");
            std::process::exit(1);
        }
    };

    backup_task::spawn_backup_loop(state.clone());

    // TLS material is loaded and handed to the terminating listener; when
    // none is available the server falls back to insecure with a log line.
    if insecure {
        tracing::info!("TLS disabled by configuration");
    } else {
        let material = {
            let config = state.config.read().await;
            tls::load_material(&config)
        };
        if material.is_empty() {
            tracing::warn!("TLS material not found, falling back to insecure mode");
        } else {
            tracing::info!(certificates = material.len(), "TLS material available");
        }
    }

    let app = routes::router(state.clone());
    let listener = match tokio::net::TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(e) => {
            tracing::error!(addr = %addr, error = %e, "failed to bind");
            std::process::exit(1);
        }
    };
    tracing::info!(addr = %addr, version = env!("CARGO_PKG_VERSION"), "strongroom server listening");

    if let Err(e) = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
    {
        tracing::error!(error = %e, "server error");
    }

    cleanup(&state).await;
}
