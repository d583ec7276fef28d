//! formtable server binary.
//!
//! Reads `config.toml` (or the path given with `--config`), opens the SQLite
//! store, starts the migration queue and the backup retention sweep, and
//! serves the control API over HTTP.
//!
//! # Password hash generation
//!
//! To generate the argon2 PHC string for a `[[users]]` entry:
//!
//! ```
//! cargo run -p formtable-server -- --hash-password
//! ```

mod settings;
mod translator;

use std::{path::PathBuf, sync::Arc, time::Duration};

use anyhow::Context as _;
use argon2::{Argon2, PasswordHasher, password_hash::SaltString};
use clap::Parser;
use formtable_api::{AppState, auth::AuthConfig};
use formtable_core::clock::SystemClock;
use formtable_engine::Engine;
use formtable_ident::{MemoryCache, Translator};
use formtable_store_sqlite::SqliteStore;
use rand_core::OsRng;
use tokio::net::TcpListener;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

use settings::{ServerConfig, expand_tilde};
use translator::HttpTranslator;

#[derive(Parser)]
#[command(author, version, about = "formtable schema engine server")]
struct Cli {
  /// Path to the TOML configuration file.
  #[arg(short, long, default_value = "config.toml")]
  config: PathBuf,

  /// Print the argon2 hash for a password entered on stdin and exit.
  #[arg(long)]
  hash_password: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
  tracing_subscriber::fmt()
    .with_env_filter(
      EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy(),
    )
    .init();

  let cli = Cli::parse();

  if cli.hash_password {
    let password = read_password()?;
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default()
      .hash_password(password.as_bytes(), &salt)
      .map_err(|e| anyhow::anyhow!("argon2 error: {e}"))?
      .to_string();
    println!("{hash}");
    return Ok(());
  }

  let cfg = ServerConfig::load(&cli.config)?;
  if cfg.users.is_empty() {
    tracing::warn!("no users configured; every request will be rejected");
  }

  let store_path = expand_tilde(&cfg.store_path);
  if let Some(parent) = store_path.parent() {
    std::fs::create_dir_all(parent)
      .with_context(|| format!("failed to create {parent:?}"))?;
  }
  let store = SqliteStore::open(&store_path)
    .await
    .with_context(|| format!("failed to open store at {store_path:?}"))?;

  let translator = match cfg.translator.clone() {
    Some(t) => {
      tracing::info!(url = %t.url, "translation service enabled");
      Some(HttpTranslator::new(t).context("failed to build translation client")?)
    }
    None => None,
  };

  let clock = Arc::new(SystemClock);
  let cache = Arc::new(MemoryCache::new(cfg.engine.naming.cache_ttl(), clock.clone()));
  let engine = Arc::new(Engine::new(Arc::new(store), translator, cache, clock, cfg.engine.clone()));

  let sweep = tokio::spawn(retention_sweep(
    engine.clone(),
    Duration::from_secs(cfg.sweep_interval_secs.max(1)),
  ));

  let state = AppState { engine: engine.clone(), auth: Arc::new(AuthConfig { users: cfg.users.clone() }) };
  let app = formtable_api::router(state);
  let address = format!("{}:{}", cfg.host, cfg.port);

  tracing::info!("Listening on http://{address}");
  let listener = TcpListener::bind(&address)
    .await
    .with_context(|| format!("failed to bind {address}"))?;

  axum::serve(listener, app)
    .with_graceful_shutdown(shutdown_signal())
    .await
    .context("server error")?;

  sweep.abort();
  tracing::info!("draining migration queue");
  engine.wait_idle().await;
  Ok(())
}

/// Delete expired backups every `every`, starting one interval after boot.
async fn retention_sweep<T>(engine: Arc<Engine<SqliteStore, T>>, every: Duration)
where
  T: Translator + 'static,
{
  let mut ticker = tokio::time::interval(every);
  ticker.tick().await;
  loop {
    ticker.tick().await;
    if let Err(e) = engine.cleanup(None, false).await {
      tracing::warn!(error = %e, "retention sweep failed");
    }
  }
}

async fn shutdown_signal() {
  if let Err(e) = tokio::signal::ctrl_c().await {
    tracing::error!(error = %e, "failed to listen for shutdown signal");
    std::future::pending::<()>().await;
  }
}

/// Read a password from stdin.
fn read_password() -> anyhow::Result<String> {
  use std::io::{self, BufRead, Write};
  print!("Password: ");
  io::stdout().flush().ok();
  let mut line = String::new();
  io::stdin().lock().read_line(&mut line)?;
  Ok(line.trim_end_matches(['\n', '\r']).to_string())
}
