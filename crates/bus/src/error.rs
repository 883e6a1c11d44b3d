/// Errors surfaced to callers of the bus.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BusError {
	/// Propagation finished without any handler producing a result.
	#[error("no handler produced a result for `{name}`")]
	NoHandler {
		/// Dispatched event name.
		name: String,
	},
	/// An event name is declared by two namespaces.
	#[error("duplicate event name `{name}` declared by `{first}` and `{second}`")]
	DuplicateName {
		/// Colliding event name.
		name: String,
		/// Namespace that declared it first.
		first: String,
		/// Namespace that declared it again.
		second: String,
	},
	/// A scope id does not belong to this registry.
	#[error("unknown scope {0}")]
	UnknownScope(u32),
	/// The request detail does not match the handler's expected shape.
	#[error("invalid detail for `{name}`: {reason}")]
	InvalidDetail {
		/// Dispatched event name.
		name: String,
		/// What was wrong.
		reason: String,
	},
	/// A locally fulfilled capability failed.
	#[error("capability `{name}` failed: {message}")]
	Capability {
		/// Dispatched event name.
		name: String,
		/// Failure description.
		message: String,
	},
	/// The worker process reported a failed operation.
	#[error("worker operation failed: {message}")]
	WorkerOperation {
		/// Error message carried across the worker boundary.
		message: String,
	},
	/// The connection to the worker process closed before a response arrived.
	#[error("worker connection closed")]
	Disconnected,
	/// The operation produced a value of an unexpected shape.
	#[error("unexpected result shape: {0}")]
	Decode(String),
}
