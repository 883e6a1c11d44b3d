//! The unit of communication on the bus.

use std::fmt;
use std::future::Future;
use std::pin::Pin;

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

use crate::error::BusError;
use crate::names::EventName;

/// Boxed future produced by a handler whose work completes elsewhere.
pub type PendingFuture = Pin<Box<dyn Future<Output = Result<Value, BusError>> + Send + 'static>>;

/// Result slot contents written by a handler.
pub enum EnvelopeResult {
	/// The operation completed synchronously.
	Value(Value),
	/// The operation completes asynchronously.
	Pending(PendingFuture),
	/// The handler rejected the request before doing any work.
	Failed(BusError),
}

impl fmt::Debug for EnvelopeResult {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Self::Value(value) => f.debug_tuple("Value").field(value).finish(),
			Self::Pending(_) => f.write_str("Pending(..)"),
			Self::Failed(err) => f.debug_tuple("Failed").field(err).finish(),
		}
	}
}

/// A named request travelling from a target scope towards the root.
///
/// Envelopes always bubble, are cancelable and cross scope boundaries. They
/// are created per dispatch and discarded once the result has been extracted.
#[derive(Debug)]
pub struct Envelope {
	name: EventName,
	detail: Map<String, Value>,
	result: Option<EnvelopeResult>,
	cancelled: bool,
	writes: usize,
}

impl Envelope {
	/// Envelopes propagate from the target scope towards the root.
	pub const BUBBLES: bool = true;
	/// Handlers may stop propagation.
	pub const CANCELABLE: bool = true;
	/// Propagation crosses scope boundaries.
	pub const COMPOSED: bool = true;

	pub(crate) fn new(name: EventName, detail: Map<String, Value>) -> Self {
		Self {
			name,
			detail,
			result: None,
			cancelled: false,
			writes: 0,
		}
	}

	/// Event name this envelope was dispatched under.
	#[must_use]
	pub fn name(&self) -> EventName {
		self.name
	}

	/// Request fields supplied by the caller.
	#[must_use]
	pub fn detail(&self) -> &Map<String, Value> {
		&self.detail
	}

	/// Deserializes one required request field.
	///
	/// # Errors
	///
	/// Returns [`BusError::InvalidDetail`] if the field is missing or has the wrong shape.
	pub fn arg<T: DeserializeOwned>(&self, key: &str) -> Result<T, BusError> {
		match self.arg_opt(key)? {
			Some(value) => Ok(value),
			None => Err(self.invalid(format!("missing field `{key}`"))),
		}
	}

	/// Deserializes one optional request field. `null` counts as absent.
	///
	/// # Errors
	///
	/// Returns [`BusError::InvalidDetail`] if the field has the wrong shape.
	pub fn arg_opt<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, BusError> {
		match self.detail.get(key) {
			None | Some(Value::Null) => Ok(None),
			Some(value) => serde_json::from_value(value.clone())
				.map(Some)
				.map_err(|err| self.invalid(format!("field `{key}`: {err}"))),
		}
	}

	/// Deserializes the whole detail record into a typed request.
	///
	/// # Errors
	///
	/// Returns [`BusError::InvalidDetail`] if the record does not match `T`.
	pub fn detail_as<T: DeserializeOwned>(&self) -> Result<T, BusError> {
		serde_json::from_value(Value::Object(self.detail.clone())).map_err(|err| self.invalid(err.to_string()))
	}

	/// Writes a synchronous result, replacing any earlier write.
	pub fn set_result(&mut self, value: Value) {
		self.write(EnvelopeResult::Value(value));
	}

	/// Serializes and writes a synchronous result.
	pub fn respond<T: Serialize>(&mut self, value: &T) {
		match serde_json::to_value(value) {
			Ok(value) => self.set_result(value),
			Err(err) => {
				let err = self.invalid(format!("result encoding: {err}"));
				self.set_failed(err);
			}
		}
	}

	/// Writes a pending result, replacing any earlier write.
	pub fn set_pending<F>(&mut self, fut: F)
	where
		F: Future<Output = Result<Value, BusError>> + Send + 'static,
	{
		self.write(EnvelopeResult::Pending(Box::pin(fut)));
	}

	/// Writes a synchronous failure, replacing any earlier write.
	pub fn set_failed(&mut self, err: BusError) {
		self.write(EnvelopeResult::Failed(err));
	}

	/// Returns true once any handler has written the result slot.
	#[must_use]
	pub fn has_result(&self) -> bool {
		self.result.is_some()
	}

	/// Number of times the result slot has been written.
	#[must_use]
	pub fn result_writes(&self) -> usize {
		self.writes
	}

	/// Stops propagation after the current handler returns.
	pub fn cancel(&mut self) {
		self.cancelled = true;
	}

	/// Returns true if a handler stopped propagation.
	#[must_use]
	pub fn is_cancelled(&self) -> bool {
		self.cancelled
	}

	pub(crate) fn into_result(self) -> Option<EnvelopeResult> {
		self.result
	}

	fn write(&mut self, result: EnvelopeResult) {
		if self.result.is_some() {
			tracing::debug!(event = %self.name, writes = self.writes + 1, "bus.result_overwritten");
		}
		self.writes += 1;
		self.result = Some(result);
	}

	fn invalid(&self, reason: String) -> BusError {
		BusError::InvalidDetail {
			name: self.name.as_str().to_string(),
			reason,
		}
	}
}
