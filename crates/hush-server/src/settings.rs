//! Server configuration: built-in defaults, then an optional TOML file, then
//! `HUSH_*` environment variables.

use std::{
  path::{Path, PathBuf},
  time::Duration,
};

use anyhow::Context as _;
use config::{Config, Environment, File};
use serde::Deserialize;

/// Runtime server configuration.
#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
  pub host:            String,
  pub port:            u16,
  /// SQLite database file; a leading `~/` is expanded.
  pub store_path:      PathBuf,
  /// Interval between keep-alive comments on `/events` streams.
  pub keep_alive_secs: u64,
}

impl ServerConfig {
  /// Read `path` (if it exists) and the environment on top of the defaults.
  pub fn load(path: &Path) -> anyhow::Result<Self> {
    Self::from_builder(
      Config::builder()
        .add_source(File::from(path).required(false))
        .add_source(Environment::with_prefix("HUSH")),
    )
  }

  fn from_builder(
    builder: config::ConfigBuilder<config::builder::DefaultState>,
  ) -> anyhow::Result<Self> {
    let mut cfg: ServerConfig = builder
      .set_default("host", "127.0.0.1")?
      .set_default("port", 7420)?
      .set_default("store_path", "~/.local/share/hush/hush.db")?
      .set_default("keep_alive_secs", 15)?
      .build()
      .context("failed to read configuration")?
      .try_deserialize()
      .context("failed to deserialise ServerConfig")?;
    cfg.store_path = expand_tilde(&cfg.store_path);
    Ok(cfg)
  }

  /// Parse a TOML document on top of the defaults, without the environment.
  #[cfg(test)]
  fn from_toml(text: &str) -> anyhow::Result<Self> {
    Self::from_builder(Config::builder().add_source(File::from_str(text, config::FileFormat::Toml)))
  }

  pub fn address(&self) -> String { format!("{}:{}", self.host, self.port) }

  pub fn keep_alive(&self) -> Duration { Duration::from_secs(self.keep_alive_secs.max(1)) }
}

/// Expand a leading `~` to the user's home directory.
fn expand_tilde(path: &Path) -> PathBuf {
  let s = path.to_string_lossy();
  if let Some(rest) = s.strip_prefix("~/")
    && let Ok(home) = std::env::var("HOME")
  {
    return PathBuf::from(home).join(rest);
  }
  path.to_path_buf()
}
