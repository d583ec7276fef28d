//! Server configuration, read from `config.toml` layered with `FORMTABLE_*`
//! environment variables (`__` separates nested keys, e.g.
//! `FORMTABLE_ENGINE__RETENTION_DAYS`).

use std::path::{Path, PathBuf};

use anyhow::Context as _;
use formtable_api::auth::UserCredential;
use formtable_engine::EngineConfig;
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
  pub host:                String,
  pub port:                u16,
  pub store_path:          PathBuf,
  /// How often the backup retention sweep runs.
  pub sweep_interval_secs: u64,
  pub translator:          Option<TranslatorConfig>,
  pub engine:              EngineConfig,
  pub users:               Vec<UserCredential>,
}

impl Default for ServerConfig {
  fn default() -> Self {
    Self {
      host:                "127.0.0.1".into(),
      port:                8080,
      store_path:          PathBuf::from("~/.local/share/formtable/schema.db"),
      sweep_interval_secs: 3600,
      translator:          None,
      engine:              EngineConfig::default(),
      users:               Vec::new(),
    }
  }
}

/// A LibreTranslate-compatible endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct TranslatorConfig {
  pub url:        String,
  #[serde(default = "default_source")]
  pub source:     String,
  #[serde(default)]
  pub api_key:    Option<String>,
  #[serde(default = "default_timeout_ms")]
  pub timeout_ms: u64,
}

fn default_source() -> String { "th".into() }

fn default_timeout_ms() -> u64 { 3_000 }

impl ServerConfig {
  pub fn load(path: &Path) -> anyhow::Result<Self> {
    Self::from_builder(
      config::Config::builder().add_source(config::File::from(path).required(false)),
    )
  }

  fn from_builder(
    builder: config::ConfigBuilder<config::builder::DefaultState>,
  ) -> anyhow::Result<Self> {
    builder
      .add_source(
        config::Environment::with_prefix("FORMTABLE")
          .prefix_separator("_")
          .separator("__"),
      )
      .build()
      .context("failed to read config")?
      .try_deserialize()
      .context("failed to deserialise ServerConfig")
  }
}

/// Expand a leading `~` to the user's home directory.
pub fn expand_tilde(path: &Path) -> PathBuf {
  let s = path.to_string_lossy();
  if let Some(rest) = s.strip_prefix("~/")
    && let Ok(home) = std::env::var("HOME")
  {
    return PathBuf::from(home).join(rest);
  }
  path.to_path_buf()
}

#[cfg(test)]
mod tests {
  use formtable_api::Role;

  use super::*;

  fn parse(toml: &str) -> ServerConfig {
    ServerConfig::from_builder(
      config::Config::builder().add_source(config::File::from_str(toml, config::FileFormat::Toml)),
    )
    .unwrap()
  }

  #[test]
  fn empty_file_gives_defaults() {
    let cfg = parse("");
    assert_eq!(cfg.port, 8080);
    assert_eq!(cfg.engine.retention_days, 90);
    assert_eq!(cfg.engine.queue.workers, 4);
    assert!(cfg.translator.is_none());
    assert!(cfg.users.is_empty());
  }

  #[test]
  fn nested_sections_override() {
    let cfg = parse(
      r#"
        port = 9000

        [engine]
        retention_days = 30

        [engine.queue]
        max_attempts = 5

        [translator]
        url = "http://localhost:5000"

        [[users]]
        username      = "root"
        password_hash = "$argon2id$v=19$m=19456,t=2,p=1$c2FsdA$aGFzaA"
        role          = "admin"
      "#,
    );
    assert_eq!(cfg.port, 9000);
    assert_eq!(cfg.engine.retention_days, 30);
    assert_eq!(cfg.engine.queue.max_attempts, 5);
    assert_eq!(cfg.engine.queue.workers, 4);

    let translator = cfg.translator.unwrap();
    assert_eq!(translator.source, "th");
    assert_eq!(translator.timeout_ms, 3_000);
    assert_eq!(cfg.users[0].role, Role::Admin);
  }

  #[test]
  fn tilde_expands_to_home() {
    let Ok(home) = std::env::var("HOME") else { return };
    assert_eq!(expand_tilde(Path::new("~/x.db")), PathBuf::from(home).join("x.db"));
    assert_eq!(expand_tilde(Path::new("/tmp/x.db")), PathBuf::from("/tmp/x.db"));
  }
}
