//! Typed decoding of worker requests.

use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use switchboard_proto::op;

use crate::error::WorkerError;
use crate::state::Project;

/// A decoded worker operation.
#[derive(Debug, Clone, PartialEq)]
pub enum Operation {
	/// Liveness check.
	Ping,
	/// Record a visit.
	AddUrlHistory {
		/// Visited URL.
		url: String,
	},
	/// Substring search over history.
	QueryUrlHistory {
		/// Search text.
		q: String,
	},
	/// Most recent history entries.
	ListUrlHistory {
		/// Maximum number of entries.
		limit: Option<usize>,
	},
	/// Remove one history entry.
	DeleteUrlHistory {
		/// URL to remove.
		url: String,
	},
	/// Remove every history entry.
	ClearUrlHistory,
	/// Read one config key or the whole map.
	ReadConfig {
		/// Key to read; `None` reads everything.
		key: Option<String>,
	},
	/// Write one config key.
	UpdateConfig {
		/// Key.
		key: String,
		/// New value.
		value: Value,
	},
	/// Remove one config key.
	DeleteConfig {
		/// Key.
		key: String,
	},
	/// Read one project.
	ReadProject {
		/// Project id.
		id: String,
	},
	/// List every project.
	ListProjects,
	/// Create or replace a project.
	UpdateProject {
		/// Project record.
		project: Project,
	},
	/// Remove one project.
	DeleteProject {
		/// Project id.
		id: String,
	},
	/// Remove every project.
	ClearProjects,
	/// Read one stored value.
	ReadKv {
		/// Key.
		key: String,
	},
	/// Write one stored value.
	UpdateKv {
		/// Key.
		key: String,
		/// New value.
		value: Value,
	},
	/// Remove one stored value.
	DeleteKv {
		/// Key.
		key: String,
	},
}

#[derive(Deserialize)]
struct UrlArgs {
	url: String,
}

#[derive(Deserialize)]
struct QueryArgs {
	#[serde(default)]
	q: String,
}

#[derive(Deserialize)]
struct ListArgs {
	#[serde(default)]
	limit: Option<usize>,
}

#[derive(Deserialize)]
struct KeyArgs {
	key: String,
}

#[derive(Deserialize)]
struct OptionalKeyArgs {
	#[serde(default)]
	key: Option<String>,
}

#[derive(Deserialize)]
struct KeyValueArgs {
	key: String,
	value: Value,
}

#[derive(Deserialize)]
struct IdArgs {
	id: String,
}

#[derive(Deserialize)]
struct ProjectArgs {
	project: Project,
}

fn parse<T: DeserializeOwned>(operation: &str, args: &Map<String, Value>) -> Result<T, WorkerError> {
	serde_json::from_value(Value::Object(args.clone())).map_err(|err| WorkerError::invalid_args(operation, err))
}

fn non_empty(operation: &str, field: &str, value: String) -> Result<String, WorkerError> {
	if value.trim().is_empty() {
		return Err(WorkerError::invalid_args(operation, format!("`{field}` must not be empty")));
	}
	Ok(value)
}

impl Operation {
	/// Decodes an operation name and its argument record.
	///
	/// # Errors
	///
	/// [`WorkerError::UnknownOperation`] for unrecognized names and
	/// [`WorkerError::InvalidArgs`] for arguments of the wrong shape.
	pub fn decode(operation: &str, args: &Map<String, Value>) -> Result<Self, WorkerError> {
		let decoded = match operation {
			op::PING => Self::Ping,
			op::ADD_URL_HISTORY => {
				let UrlArgs { url } = parse(operation, args)?;
				Self::AddUrlHistory {
					url: non_empty(operation, "url", url)?,
				}
			}
			op::QUERY_URL_HISTORY => {
				let QueryArgs { q } = parse(operation, args)?;
				Self::QueryUrlHistory { q }
			}
			op::LIST_URL_HISTORY => {
				let ListArgs { limit } = parse(operation, args)?;
				Self::ListUrlHistory { limit }
			}
			op::DELETE_URL_HISTORY => {
				let UrlArgs { url } = parse(operation, args)?;
				Self::DeleteUrlHistory { url }
			}
			op::CLEAR_URL_HISTORY => Self::ClearUrlHistory,
			op::READ_CONFIG => {
				let OptionalKeyArgs { key } = parse(operation, args)?;
				Self::ReadConfig { key }
			}
			op::UPDATE_CONFIG => {
				let KeyValueArgs { key, value } = parse(operation, args)?;
				Self::UpdateConfig {
					key: non_empty(operation, "key", key)?,
					value,
				}
			}
			op::DELETE_CONFIG => {
				let KeyArgs { key } = parse(operation, args)?;
				Self::DeleteConfig { key }
			}
			op::READ_PROJECT => {
				let IdArgs { id } = parse(operation, args)?;
				Self::ReadProject { id }
			}
			op::LIST_PROJECTS => Self::ListProjects,
			op::UPDATE_PROJECT => {
				let ProjectArgs { project } = parse(operation, args)?;
				non_empty(operation, "project.id", project.id.clone())?;
				Self::UpdateProject { project }
			}
			op::DELETE_PROJECT => {
				let IdArgs { id } = parse(operation, args)?;
				Self::DeleteProject { id }
			}
			op::CLEAR_PROJECTS => Self::ClearProjects,
			op::READ_KV => {
				let KeyArgs { key } = parse(operation, args)?;
				Self::ReadKv { key }
			}
			op::UPDATE_KV => {
				let KeyValueArgs { key, value } = parse(operation, args)?;
				Self::UpdateKv {
					key: non_empty(operation, "key", key)?,
					value,
				}
			}
			op::DELETE_KV => {
				let KeyArgs { key } = parse(operation, args)?;
				Self::DeleteKv { key }
			}
			other => return Err(WorkerError::UnknownOperation(other.to_string())),
		};
		Ok(decoded)
	}

	/// Returns true for operations that may change durable state.
	#[must_use]
	pub fn is_mutating(&self) -> bool {
		matches!(
			self,
			Self::AddUrlHistory { .. }
				| Self::DeleteUrlHistory { .. }
				| Self::ClearUrlHistory
				| Self::UpdateConfig { .. }
				| Self::DeleteConfig { .. }
				| Self::UpdateProject { .. }
				| Self::DeleteProject { .. }
				| Self::ClearProjects
				| Self::UpdateKv { .. }
				| Self::DeleteKv { .. }
		)
	}

	/// Wire name of this operation.
	#[must_use]
	pub fn name(&self) -> &'static str {
		match self {
			Self::Ping => op::PING,
			Self::AddUrlHistory { .. } => op::ADD_URL_HISTORY,
			Self::QueryUrlHistory { .. } => op::QUERY_URL_HISTORY,
			Self::ListUrlHistory { .. } => op::LIST_URL_HISTORY,
			Self::DeleteUrlHistory { .. } => op::DELETE_URL_HISTORY,
			Self::ClearUrlHistory => op::CLEAR_URL_HISTORY,
			Self::ReadConfig { .. } => op::READ_CONFIG,
			Self::UpdateConfig { .. } => op::UPDATE_CONFIG,
			Self::DeleteConfig { .. } => op::DELETE_CONFIG,
			Self::ReadProject { .. } => op::READ_PROJECT,
			Self::ListProjects => op::LIST_PROJECTS,
			Self::UpdateProject { .. } => op::UPDATE_PROJECT,
			Self::DeleteProject { .. } => op::DELETE_PROJECT,
			Self::ClearProjects => op::CLEAR_PROJECTS,
			Self::ReadKv { .. } => op::READ_KV,
			Self::UpdateKv { .. } => op::UPDATE_KV,
			Self::DeleteKv { .. } => op::DELETE_KV,
		}
	}
}
