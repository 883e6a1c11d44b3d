//! Worker configuration loaded from TOML.

use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

const APP_DIR: &str = "switchboard";
const SOCKET_NAME: &str = "switchboard-worker.sock";
const STATE_FILE: &str = "state.json";

/// Errors raised while loading or validating [`WorkerConfig`].
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
	/// The config file exists but could not be read.
	#[error("failed to read {path}: {source}")]
	Read {
		/// Config file path.
		path: PathBuf,
		/// Underlying I/O error.
		#[source]
		source: io::Error,
	},
	/// The config file is not valid TOML or has unknown keys.
	#[error("failed to parse worker config: {0}")]
	Parse(#[from] toml::de::Error),
	/// A value is outside its accepted range.
	#[error("invalid worker config: {0}")]
	Invalid(String),
}

/// Runtime settings of the worker process.
///
/// Every field has a default, so an empty or missing file yields a usable
/// configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct WorkerConfig {
	/// Directory holding the durable state file. Defaults to the platform data dir.
	pub data_dir: Option<PathBuf>,
	/// Unix socket the daemon listens on. Defaults to the platform runtime dir.
	pub socket: Option<PathBuf>,
	/// Maximum number of URL history entries kept; oldest are evicted first.
	pub history_limit: usize,
	/// Bounded capacity of the service command mailbox.
	pub mailbox_capacity: usize,
}

impl Default for WorkerConfig {
	fn default() -> Self {
		Self {
			data_dir: None,
			socket: None,
			history_limit: 500,
			mailbox_capacity: 256,
		}
	}
}

impl WorkerConfig {
	/// Default config file location, `<config_dir>/switchboard/worker.toml`.
	#[must_use]
	pub fn default_path() -> Option<PathBuf> {
		dirs::config_dir().map(|dir| dir.join(APP_DIR).join("worker.toml"))
	}

	/// Parses and validates a TOML document.
	///
	/// # Errors
	///
	/// Returns [`ConfigError::Parse`] or [`ConfigError::Invalid`].
	pub fn from_toml_str(input: &str) -> Result<Self, ConfigError> {
		let config: Self = toml::from_str(input)?;
		config.validate()?;
		Ok(config)
	}

	/// Loads a config file. A missing file yields the defaults.
	///
	/// # Errors
	///
	/// Returns [`ConfigError`] if the file exists but cannot be read or parsed.
	pub fn load(path: &Path) -> Result<Self, ConfigError> {
		match std::fs::read_to_string(path) {
			Ok(text) => {
				tracing::debug!(path = %path.display(), "worker.config.loaded");
				Self::from_toml_str(&text)
			}
			Err(err) if err.kind() == io::ErrorKind::NotFound => {
				tracing::debug!(path = %path.display(), "worker.config.missing");
				Ok(Self::default())
			}
			Err(source) => Err(ConfigError::Read {
				path: path.to_path_buf(),
				source,
			}),
		}
	}

	/// Rejects values that would make the worker unusable.
	///
	/// # Errors
	///
	/// Returns [`ConfigError::Invalid`] naming the offending field.
	pub fn validate(&self) -> Result<(), ConfigError> {
		if self.history_limit == 0 {
			return Err(ConfigError::Invalid("history_limit must be at least 1".into()));
		}
		if self.mailbox_capacity == 0 {
			return Err(ConfigError::Invalid("mailbox_capacity must be at least 1".into()));
		}
		Ok(())
	}

	/// Socket path, falling back to the runtime dir, then the cache dir, then the temp dir.
	#[must_use]
	pub fn socket_path(&self) -> PathBuf {
		if let Some(socket) = &self.socket {
			return socket.clone();
		}
		dirs::runtime_dir()
			.or_else(dirs::cache_dir)
			.unwrap_or_else(std::env::temp_dir)
			.join(SOCKET_NAME)
	}

	/// Path of the JSON state file.
	#[must_use]
	pub fn state_path(&self) -> PathBuf {
		let dir = match &self.data_dir {
			Some(dir) => dir.clone(),
			None => dirs::data_dir()
				.unwrap_or_else(std::env::temp_dir)
				.join(APP_DIR),
		};
		dir.join(STATE_FILE)
	}
}
