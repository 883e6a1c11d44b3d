//! Persistence backends for [`StateSnapshot`].

use std::io;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::state::StateSnapshot;

/// Errors raised by a [`StateStore`].
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
	/// Reading or writing the backing file failed.
	#[error("{path}: {source}")]
	Io {
		/// File involved.
		path: PathBuf,
		/// Underlying error.
		#[source]
		source: io::Error,
	},
	/// The persisted state is not valid JSON for [`StateSnapshot`].
	#[error("corrupt state in {path}: {source}")]
	Corrupt {
		/// File involved.
		path: PathBuf,
		/// Decode error.
		#[source]
		source: serde_json::Error,
	},
	/// The snapshot could not be encoded.
	#[error("failed to encode state: {0}")]
	Encode(#[source] serde_json::Error),
	/// Backend-specific failure.
	#[error("{0}")]
	Backend(String),
}

/// Durable home of the worker's state.
///
/// `save` must be atomic from the worker's point of view: either the whole
/// snapshot is durable afterwards, or an error is returned and the previous
/// snapshot remains the persisted one.
#[async_trait]
pub trait StateStore: Send + Sync + 'static {
	/// Loads the last saved snapshot, or an empty one if nothing was saved yet.
	async fn load(&self) -> Result<StateSnapshot, StoreError>;
	/// Replaces the persisted snapshot.
	async fn save(&self, snapshot: &StateSnapshot) -> Result<(), StoreError>;
}

/// Volatile store for tests and ephemeral sessions.
#[derive(Debug, Default)]
pub struct MemoryStore {
	snapshot: Mutex<StateSnapshot>,
}

impl MemoryStore {
	/// Empty store.
	#[must_use]
	pub fn new() -> Self {
		Self::default()
	}

	/// Store pre-populated with `snapshot`.
	#[must_use]
	pub fn with_snapshot(snapshot: StateSnapshot) -> Self {
		Self {
			snapshot: Mutex::new(snapshot),
		}
	}

	/// Copy of the currently stored snapshot.
	#[must_use]
	pub fn snapshot(&self) -> StateSnapshot {
		self.snapshot
			.lock()
			.unwrap_or_else(|poisoned| poisoned.into_inner())
			.clone()
	}
}

#[async_trait]
impl StateStore for MemoryStore {
	async fn load(&self) -> Result<StateSnapshot, StoreError> {
		Ok(self.snapshot())
	}

	async fn save(&self, snapshot: &StateSnapshot) -> Result<(), StoreError> {
		*self
			.snapshot
			.lock()
			.unwrap_or_else(|poisoned| poisoned.into_inner()) = snapshot.clone();
		Ok(())
	}
}

/// JSON file store. Saves write a sibling temp file and rename it over the target.
#[derive(Debug, Clone)]
pub struct FileStore {
	path: PathBuf,
}

impl FileStore {
	/// Store backed by `path`. The parent directory is created on first save.
	#[must_use]
	pub fn new(path: impl Into<PathBuf>) -> Self {
		Self { path: path.into() }
	}

	/// Backing file path.
	#[must_use]
	pub fn path(&self) -> &Path {
		&self.path
	}

	fn io_err(&self, source: io::Error) -> StoreError {
		StoreError::Io {
			path: self.path.clone(),
			source,
		}
	}
}

#[async_trait]
impl StateStore for FileStore {
	async fn load(&self) -> Result<StateSnapshot, StoreError> {
		let bytes = match tokio::fs::read(&self.path).await {
			Ok(bytes) => bytes,
			Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(StateSnapshot::default()),
			Err(err) => return Err(self.io_err(err)),
		};
		serde_json::from_slice(&bytes).map_err(|source| StoreError::Corrupt {
			path: self.path.clone(),
			source,
		})
	}

	async fn save(&self, snapshot: &StateSnapshot) -> Result<(), StoreError> {
		let bytes = serde_json::to_vec_pretty(snapshot).map_err(StoreError::Encode)?;
		if let Some(parent) = self.path.parent() {
			tokio::fs::create_dir_all(parent)
				.await
				.map_err(|err| self.io_err(err))?;
		}
		let tmp = self.path.with_extension("json.tmp");
		tokio::fs::write(&tmp, &bytes)
			.await
			.map_err(|err| self.io_err(err))?;
		tokio::fs::rename(&tmp, &self.path)
			.await
			.map_err(|err| self.io_err(err))?;
		tracing::trace!(path = %self.path.display(), bytes = bytes.len(), "worker.store.saved");
		Ok(())
	}
}
