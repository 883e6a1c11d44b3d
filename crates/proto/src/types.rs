//! Wire types for the switchboard worker protocol.
//!
//! Field names follow the camelCase convention of the UI side of the
//! boundary, so the JSON produced here is what a browser-hosted client sees.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Notification topic names.
pub mod topic {
	/// URL history collection changes.
	pub const URL_HISTORY: &str = "history.url";
	/// Named configuration changes.
	pub const CONFIG: &str = "config";
	/// Stored project changes.
	pub const PROJECT: &str = "project";
	/// Durable key-value storage changes.
	pub const KV: &str = "kv";
}

/// Operation names understood by the worker.
pub mod op {
	/// Liveness check; answers `"pong"`.
	pub const PING: &str = "ping";
	/// Record a visited URL (`url`).
	pub const ADD_URL_HISTORY: &str = "addUrlHistory";
	/// Case-insensitive substring search (`q`).
	pub const QUERY_URL_HISTORY: &str = "queryUrlHistory";
	/// Most recent entries first (`limit?`).
	pub const LIST_URL_HISTORY: &str = "listUrlHistory";
	/// Remove one entry (`url`).
	pub const DELETE_URL_HISTORY: &str = "deleteUrlHistory";
	/// Remove every entry.
	pub const CLEAR_URL_HISTORY: &str = "clearUrlHistory";
	/// Read one key (`key?`) or the whole map.
	pub const READ_CONFIG: &str = "readConfig";
	/// Write one key (`key`, `value`).
	pub const UPDATE_CONFIG: &str = "updateConfig";
	/// Remove one key (`key`).
	pub const DELETE_CONFIG: &str = "deleteConfig";
	/// Read one project (`id`).
	pub const READ_PROJECT: &str = "readProject";
	/// List every project.
	pub const LIST_PROJECTS: &str = "listProjects";
	/// Create or replace a project (`project`).
	pub const UPDATE_PROJECT: &str = "updateProject";
	/// Remove one project (`id`).
	pub const DELETE_PROJECT: &str = "deleteProject";
	/// Remove every project.
	pub const CLEAR_PROJECTS: &str = "clearProjects";
	/// Read one stored value (`key`).
	pub const READ_KV: &str = "readKv";
	/// Write one stored value (`key`, `value`).
	pub const UPDATE_KV: &str = "updateKv";
	/// Remove one stored value (`key`).
	pub const DELETE_KV: &str = "deleteKv";
}

/// Identifier the worker assigns to a connected UI client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClientId(pub u64);

impl fmt::Display for ClientId {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "client-{}", self.0)
	}
}

/// Unique token matching an asynchronous request to its eventual response.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CorrelationId(pub String);

impl CorrelationId {
	/// Generates a fresh random correlation id.
	#[must_use]
	pub fn generate() -> Self {
		Self(uuid::Uuid::new_v4().to_string())
	}

	/// Returns the id as a string slice.
	#[must_use]
	pub fn as_str(&self) -> &str {
		&self.0
	}
}

impl fmt::Display for CorrelationId {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(&self.0)
	}
}

impl From<&str> for CorrelationId {
	fn from(value: &str) -> Self {
		Self(value.to_string())
	}
}

/// A request addressed to the worker process.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkerRequest {
	/// Correlation token echoed back in the response.
	pub correlation_id: CorrelationId,
	/// Operation name, e.g. `addUrlHistory`.
	pub operation: String,
	/// Operation arguments.
	#[serde(default)]
	pub args: Map<String, Value>,
}

impl WorkerRequest {
	/// Builds a request with a freshly generated correlation id.
	///
	/// Non-object `args` values are treated as empty arguments.
	#[must_use]
	pub fn new(operation: impl Into<String>, args: Value) -> Self {
		let args = match args {
			Value::Object(map) => map,
			_ => Map::new(),
		};
		Self {
			correlation_id: CorrelationId::generate(),
			operation: operation.into(),
			args,
		}
	}
}

/// Serialized error crossing the worker boundary as data.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[error("{message}")]
pub struct ErrorBody {
	/// Human-readable failure description.
	pub message: String,
}

impl ErrorBody {
	/// Creates an error body from a message.
	#[must_use]
	pub fn new(message: impl Into<String>) -> Self {
		Self { message: message.into() }
	}
}

/// The single response produced for every [`WorkerRequest`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkerResponse {
	/// Correlation token copied from the request.
	pub correlation_id: CorrelationId,
	/// Whether the operation succeeded.
	pub ok: bool,
	/// Result value on success.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub value: Option<Value>,
	/// Failure description when `ok` is false.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub error: Option<ErrorBody>,
}

impl WorkerResponse {
	/// Successful response carrying `value`.
	#[must_use]
	pub fn success(correlation_id: CorrelationId, value: Value) -> Self {
		Self {
			correlation_id,
			ok: true,
			value: Some(value),
			error: None,
		}
	}

	/// Failed response carrying `error`.
	#[must_use]
	pub fn failure(correlation_id: CorrelationId, error: ErrorBody) -> Self {
		Self {
			correlation_id,
			ok: false,
			value: None,
			error: Some(error),
		}
	}

	/// Rehydrates the response into a result at the call site.
	///
	/// A successful response without a value yields `Value::Null`. A failed
	/// response without an error body still yields an error.
	pub fn into_result(self) -> Result<Value, ErrorBody> {
		if self.ok {
			Ok(self.value.unwrap_or(Value::Null))
		} else {
			Err(self.error.unwrap_or_else(|| ErrorBody::new("worker reported failure without details")))
		}
	}
}

/// Unsolicited state-change message pushed to every connected client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
	/// Topic the change belongs to, see [`topic`].
	pub topic: String,
	/// Change description; always carries a `kind` field.
	pub payload: Value,
}

impl Notification {
	/// Creates a notification.
	#[must_use]
	pub fn new(topic: impl Into<String>, payload: Value) -> Self {
		Self {
			topic: topic.into(),
			payload,
		}
	}

	/// Returns the payload's `kind` field, if present.
	#[must_use]
	pub fn kind(&self) -> Option<&str> {
		self.payload.get("kind").and_then(Value::as_str)
	}
}

/// Frames sent from a UI client to the worker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ClientFrame {
	/// Connection handshake. Must be the first frame on a connection.
	Hello {
		/// Optional human-readable client label for logs.
		#[serde(default, skip_serializing_if = "Option::is_none")]
		label: Option<String>,
	},
	/// An operation request.
	Request(WorkerRequest),
	/// Explicit unsubscribe; the worker closes the connection afterwards.
	Bye,
}

/// Frames sent from the worker to a UI client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ServerFrame {
	/// Handshake acknowledgement carrying the assigned client id.
	Welcome {
		/// Identity assigned to this connection.
		#[serde(rename = "clientId")]
		client_id: ClientId,
	},
	/// Response to a previously sent request.
	Response(WorkerResponse),
	/// State-change notification.
	Notification(Notification),
}
