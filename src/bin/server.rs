//! runstat-server: encrypted run statistics over HTTP
//!
//! Computes per-run statistics and merges lifetime summaries for a record
//! store, resolving evaluation keys through a local cache.

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use eyre::{Context, Result};
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

use runstat::config::{RemoteConfig, ServiceConfig};
use runstat::keys::KeyStore;
use runstat::scheme::sim::SimScheme;
use runstat::service::{router, AppState};

#[derive(Parser)]
#[command(name = "runstat-server")]
#[command(about = "Encrypted run statistics server")]
#[command(version)]
struct Args {
    /// JSON config file (defaults are used if it does not exist)
    #[arg(long, default_value = "runstat.json")]
    config: PathBuf,

    /// Server bind address
    #[arg(long)]
    bind: Option<String>,

    /// Local key cache directory
    #[arg(long)]
    cache_dir: Option<PathBuf>,

    /// Directory-backed remote key store
    #[arg(long, conflicts_with = "remote_url")]
    remote_dir: Option<PathBuf>,

    /// HTTP remote key store base URL
    #[arg(long)]
    remote_url: Option<String>,

    /// Allow a non-loopback bind address even though the only backend
    /// leaves ciphertexts readable
    #[arg(long)]
    insecure_backend: bool,
}

fn apply_overrides(config: &mut ServiceConfig, args: &Args) {
    if let Some(bind) = &args.bind {
        config.bind = bind.clone();
    }
    if let Some(dir) = &args.cache_dir {
        config.cache_dir = dir.clone();
    }
    if let Some(path) = &args.remote_dir {
        config.remote = RemoteConfig::Directory { path: path.clone() };
    }
    if let Some(url) = &args.remote_url {
        config.remote = RemoteConfig::Http {
            base_url: url.clone(),
            timeout_secs: 10,
        };
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let subscriber = FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let args = Args::parse();

    let mut config = ServiceConfig::load(&args.config)
        .with_context(|| format!("Failed to load config: {}", args.config.display()))?;
    apply_overrides(&mut config, &args);
    config.validate().with_context(|| "Invalid configuration")?;
    if !config.bind_is_loopback() && !args.insecure_backend {
        return Err(eyre::eyre!(
            "Refusing to bind {} with the transparent reference backend; \
             pass --insecure-backend to serve it beyond loopback",
            config.bind
        ));
    }

    info!("runstat server");
    info!("Cache directory: {}", config.cache_dir.display());
    info!("Remote key store: {:?}", config.remote);
    info!(
        "Slots: {}, depth: {}",
        config.params.slot_count, config.params.max_depth
    );
    warn!("Using the transparent reference backend; ciphertexts are not confidential");

    // The HTTP remote wraps a blocking client, which must live off the runtime
    let store_config = config.clone();
    let keys = tokio::task::spawn_blocking(move || -> runstat::Result<KeyStore> {
        let remote = store_config.build_remote()?;
        Ok(KeyStore::new(&store_config.cache_dir, remote))
    })
    .await?
    .with_context(|| "Failed to set up key store")?;

    let evaluator = Arc::new(SimScheme::new(config.params.clone()));
    let state = Arc::new(
        AppState::new(evaluator, Arc::new(keys), config.blocking_threads)
            .with_context(|| "Failed to build statistics engine")?,
    );

    let app = router(state);

    info!("Starting server on {}", config.bind);
    let listener = tokio::net::TcpListener::bind(&config.bind)
        .await
        .with_context(|| format!("Failed to bind {}", config.bind))?;

    println!();
    println!("=== runstat server running ===");
    println!("Listening on: http://{}", config.bind);
    println!();
    println!("Endpoints:");
    println!("  GET    /health           - Health check");
    println!("  GET    /params           - Scheme parameters");
    println!("  POST   /runs/stats       - Derive run statistics");
    println!("  POST   /summaries/merge  - Merge run summary into lifetime summary");
    println!("  DELETE /keys/:key_id     - Revoke a key set");
    println!();

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await?;

    info!("Server stopped");
    Ok(())
}
