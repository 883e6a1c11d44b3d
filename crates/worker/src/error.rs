use switchboard_proto::{ClientId, ErrorBody, ProtoError};

use crate::clients::ClientState;
use crate::config::ConfigError;
use crate::store::StoreError;

/// Errors produced by the worker service and its clients.
#[derive(Debug, thiserror::Error)]
pub enum WorkerError {
	/// The request names an operation the worker does not implement.
	#[error("unknown operation `{0}`")]
	UnknownOperation(String),
	/// The request arguments do not match the operation.
	#[error("invalid arguments for `{operation}`: {reason}")]
	InvalidArgs {
		/// Operation name.
		operation: String,
		/// What was wrong.
		reason: String,
	},
	/// Persisting the new state failed; nothing was mutated.
	#[error("storage failure: {0}")]
	Store(#[from] StoreError),
	/// A result value could not be encoded.
	#[error("failed to encode result: {0}")]
	Encode(String),
	/// A frame could not be delivered to a client's channel.
	#[error("delivery to {client} failed")]
	ChannelDelivery {
		/// Client whose channel is closed.
		client: ClientId,
	},
	/// A client lifecycle transition is not allowed.
	#[error("{client} cannot move from {from:?} to {to:?}")]
	InvalidTransition {
		/// Affected client.
		client: ClientId,
		/// Current state.
		from: ClientState,
		/// Requested state.
		to: ClientState,
	},
	/// No client with this id is registered.
	#[error("unknown client {0}")]
	UnknownClient(ClientId),
	/// The connection did not open with a valid handshake.
	#[error("handshake failed: {0}")]
	Handshake(String),
	/// The service task has stopped.
	#[error("worker service is not running")]
	Unavailable,
	/// The connection to the worker closed before a response arrived.
	#[error("worker connection closed")]
	Disconnected,
	/// The worker answered with a failure.
	#[error("worker operation failed: {0}")]
	Operation(ErrorBody),
	/// Framing or wire encoding failed.
	#[error(transparent)]
	Proto(#[from] ProtoError),
	/// Configuration could not be loaded.
	#[error(transparent)]
	Config(#[from] ConfigError),
	/// Socket setup failed.
	#[error("io error: {0}")]
	Io(#[from] std::io::Error),
}

impl WorkerError {
	pub(crate) fn invalid_args(operation: &str, reason: impl std::fmt::Display) -> Self {
		Self::InvalidArgs {
			operation: operation.to_string(),
			reason: reason.to_string(),
		}
	}

	/// Serializable form sent back in a failed response.
	#[must_use]
	pub fn to_body(&self) -> ErrorBody {
		match self {
			Self::Operation(body) => body.clone(),
			other => ErrorBody::new(other.to_string()),
		}
	}
}
