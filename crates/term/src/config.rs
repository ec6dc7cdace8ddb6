//! Configuration file for the `ofdview` binary.
//!
//! Looked up at `--config <PATH>`, or `$XDG_CONFIG_HOME/ofdview/config.toml`
//! (`~/.config/ofdview/config.toml`). A missing default file means defaults.
//!
//! ```toml
//! [sync]
//! request_timeout_secs = 10
//! source_policy = "first_registered"
//!
//! [storage]
//! read_only = true
//!
//! [view]
//! viewport_width = 1024
//!
//! [log]
//! level = "debug"
//! ```

use std::path::{Path, PathBuf};

use ofdview_sync::SyncConfig;
use serde::Deserialize;
use thiserror::Error;
use tracing::Level;

const APP_DIR: &str = "ofdview";
const FILE_NAME: &str = "config.toml";

/// Errors that can occur when loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
	#[error("TOML parse error: {0}")]
	Toml(#[from] toml::de::Error),

	#[error("I/O error reading {path}: {error}")]
	Io { path: PathBuf, error: std::io::Error },

	#[error("invalid log level: {0}")]
	InvalidLevel(String),
}

pub type Result<T> = std::result::Result<T, ConfigError>;

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
	pub sync: SyncConfig,
	pub storage: StorageConfig,
	pub view: ViewConfig,
	pub log: LogConfig,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
	/// Report local files as not writable.
	pub read_only: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ViewConfig {
	pub viewport_width: u32,
}

impl Default for ViewConfig {
	fn default() -> Self {
		Self { viewport_width: 800 }
	}
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct LogConfig {
	pub level: Option<String>,
}

impl LogConfig {
	/// The configured level, if any.
	pub fn level(&self) -> Result<Option<Level>> {
		self.level
			.as_deref()
			.map(|s| s.parse::<Level>().map_err(|_| ConfigError::InvalidLevel(s.to_string())))
			.transpose()
	}
}

impl Config {
	pub fn parse(content: &str) -> Result<Self> {
		let config: Self = toml::from_str(content)?;
		config.log.level()?;
		Ok(config)
	}

	pub fn load(path: impl AsRef<Path>) -> Result<Self> {
		let path = path.as_ref();
		let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
			path: path.to_path_buf(),
			error: e,
		})?;
		Self::parse(&content)
	}

	/// Loads `explicit`, or the default file if it exists.
	pub fn discover(explicit: Option<&Path>) -> Result<Self> {
		if let Some(path) = explicit {
			return Self::load(path);
		}
		match default_path() {
			Some(path) if path.is_file() => Self::load(path),
			_ => Ok(Self::default()),
		}
	}
}

pub fn default_path() -> Option<PathBuf> {
	dirs::config_dir().map(|dir| dir.join(APP_DIR).join(FILE_NAME))
}
