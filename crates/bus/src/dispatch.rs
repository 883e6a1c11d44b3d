//! Dispatcher used by UI code.

use std::fmt;
use std::future::Future;
use std::ops::ControlFlow;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

use crate::envelope::{Envelope, EnvelopeResult, PendingFuture};
use crate::error::BusError;
use crate::names::EventName;
use crate::registry::{CapabilityRegistry, ScopeId};

/// Outcome of a synchronous dispatch.
pub enum Dispatched {
	/// The handler produced its value during propagation.
	Ready(Value),
	/// The handler delegated the work; await the handle for the value.
	Pending(PendingResult),
}

impl fmt::Debug for Dispatched {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Self::Ready(value) => f.debug_tuple("Ready").field(value).finish(),
			Self::Pending(_) => f.write_str("Pending(..)"),
		}
	}
}

impl Dispatched {
	/// Returns true if the result still has to be awaited.
	#[must_use]
	pub fn is_pending(&self) -> bool {
		matches!(self, Self::Pending(_))
	}

	/// Awaits the result regardless of how it was produced.
	///
	/// # Errors
	///
	/// Propagates the failure of a pending operation.
	pub async fn resolve(self) -> Result<Value, BusError> {
		match self {
			Self::Ready(value) => Ok(value),
			Self::Pending(pending) => pending.await,
		}
	}
}

/// Handle to an asynchronously produced result.
///
/// Dropping the handle does not cancel the underlying operation.
pub struct PendingResult(PendingFuture);

impl Future for PendingResult {
	type Output = Result<Value, BusError>;

	fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
		self.0.as_mut().poll(cx)
	}
}

/// Bus client: emits envelopes and extracts their results.
///
/// Cheap to clone; all clones share one frozen [`CapabilityRegistry`].
#[derive(Clone, Debug)]
pub struct Bus {
	registry: Arc<CapabilityRegistry>,
}

impl Bus {
	/// Freezes `registry` into a ready bus.
	#[must_use]
	pub fn new(registry: CapabilityRegistry) -> Self {
		Self {
			registry: Arc::new(registry),
		}
	}

	/// Read access to the frozen registry.
	#[must_use]
	pub fn registry(&self) -> &CapabilityRegistry {
		&self.registry
	}

	/// Dispatches on the root scope.
	///
	/// # Errors
	///
	/// See [`Bus::dispatch_on`].
	pub fn dispatch(&self, name: EventName, detail: Value) -> Result<Dispatched, BusError> {
		self.dispatch_on(ScopeId::ROOT, name, detail)
	}

	/// Dispatches `name` on `target` and propagates it to the root.
	///
	/// `detail` must be a JSON object or `null`.
	///
	/// # Errors
	///
	/// - [`BusError::NoHandler`] if no handler wrote a result.
	/// - [`BusError::InvalidDetail`] if `detail` is not an object.
	/// - [`BusError::UnknownScope`] if `target` is foreign to the registry.
	/// - Any synchronous failure written by the winning handler.
	pub fn dispatch_on(&self, target: ScopeId, name: EventName, detail: Value) -> Result<Dispatched, BusError> {
		let detail = match detail {
			Value::Object(map) => map,
			Value::Null => Map::new(),
			other => {
				return Err(BusError::InvalidDetail {
					name: name.as_str().to_string(),
					reason: format!("detail must be an object, got {other}"),
				});
			}
		};

		let mut envelope = Envelope::new(name, detail);
		for listener in self.registry.route(target, name)? {
			let flow = (listener.handler)(&mut envelope);
			if flow.is_break() {
				envelope.cancel();
			}
			if envelope.is_cancelled() {
				tracing::trace!(event = %name, owner = listener.owner, "bus.propagation_stopped");
				break;
			}
		}

		match envelope.into_result() {
			None => {
				tracing::debug!(event = %name, "bus.no_handler");
				Err(BusError::NoHandler {
					name: name.as_str().to_string(),
				})
			}
			Some(EnvelopeResult::Value(value)) => Ok(Dispatched::Ready(value)),
			Some(EnvelopeResult::Pending(fut)) => Ok(Dispatched::Pending(PendingResult(fut))),
			Some(EnvelopeResult::Failed(err)) => Err(err),
		}
	}

	/// Dispatches by wire string. Unknown strings yield [`BusError::NoHandler`].
	///
	/// # Errors
	///
	/// See [`Bus::dispatch_on`].
	pub fn dispatch_named(&self, target: ScopeId, name: &str, detail: Value) -> Result<Dispatched, BusError> {
		match EventName::parse(name) {
			Some(event) => self.dispatch_on(target, event, detail),
			None => Err(BusError::NoHandler { name: name.to_string() }),
		}
	}

	/// Typed convenience: dispatch on the root scope, await, and decode.
	///
	/// # Errors
	///
	/// Dispatch and operation failures, or [`BusError::Decode`] if the value
	/// does not match `T`.
	pub async fn request<T, D>(&self, name: EventName, detail: &D) -> Result<T, BusError>
	where
		T: DeserializeOwned,
		D: Serialize + ?Sized,
	{
		let detail = serde_json::to_value(detail).map_err(|err| BusError::InvalidDetail {
			name: name.as_str().to_string(),
			reason: err.to_string(),
		})?;
		let value = self.dispatch(name, detail)?.resolve().await?;
		serde_json::from_value(value).map_err(|err| BusError::Decode(err.to_string()))
	}
}

/// Wraps a closure that always answers and stops propagation.
///
/// Convenience for the common "I own this capability" handler shape.
pub fn answering<F>(f: F) -> impl Fn(&mut Envelope) -> ControlFlow<()> + Send + Sync + 'static
where
	F: Fn(&mut Envelope) + Send + Sync + 'static,
{
	move |envelope| {
		f(envelope);
		ControlFlow::Break(())
	}
}

#[cfg(test)]
mod tests {
	use pretty_assertions::assert_eq;
	use serde_json::json;
	use tokio::sync::oneshot;

	use super::*;

	#[test]
	fn unregistered_name_is_no_handler() {
		let bus = Bus::new(CapabilityRegistry::new());
		let err = bus.dispatch(EventName::HistoryCreate, json!({})).unwrap_err();
		assert_eq!(
			err,
			BusError::NoHandler {
				name: "storehistorycreate".into()
			}
		);

		let err = bus.dispatch_named(ScopeId::ROOT, "madeupevent", json!({})).unwrap_err();
		assert_eq!(err, BusError::NoHandler { name: "madeupevent".into() });
	}

	#[test]
	fn listener_that_never_writes_is_no_handler() {
		let mut registry = CapabilityRegistry::new();
		registry.on(EventName::ConfigRead, "observer", |_| ControlFlow::Continue(()));
		let bus = Bus::new(registry);
		assert!(matches!(
			bus.dispatch(EventName::ConfigRead, Value::Null),
			Err(BusError::NoHandler { .. })
		));
	}

	#[test]
	fn ready_value_is_returned_as_is() {
		let mut registry = CapabilityRegistry::new();
		registry.on(
			EventName::ConfigRead,
			"web",
			answering(|env| {
				let key: String = env.arg("key").unwrap_or_default();
				env.set_result(json!({ "key": key, "value": 4 }));
			}),
		);
		let bus = Bus::new(registry);

		let out = bus.dispatch(EventName::ConfigRead, json!({ "key": "indent" })).unwrap();
		match out {
			Dispatched::Ready(value) => assert_eq!(value, json!({ "key": "indent", "value": 4 })),
			Dispatched::Pending(_) => panic!("expected ready value"),
		}
	}

	#[tokio::test(flavor = "current_thread")]
	async fn pending_value_is_returned_before_completion() {
		let (tx, rx) = oneshot::channel::<Value>();
		let rx = std::sync::Mutex::new(Some(rx));

		let mut registry = CapabilityRegistry::new();
		registry.on(
			EventName::HistoryList,
			"desktop",
			answering(move |env| {
				let Some(rx) = rx.lock().ok().and_then(|mut slot| slot.take()) else {
					env.set_failed(BusError::Disconnected);
					return;
				};
				env.set_pending(async move { rx.await.map_err(|_| BusError::Disconnected) });
			}),
		);
		let bus = Bus::new(registry);

		let out = bus.dispatch(EventName::HistoryList, json!({})).unwrap();
		assert!(out.is_pending());

		tx.send(json!(["https://x"])).unwrap();
		assert_eq!(out.resolve().await.unwrap(), json!(["https://x"]));
	}

	#[test]
	fn scoped_override_that_breaks_shadows_root_default() {
		let mut registry = CapabilityRegistry::new();
		let scope = registry.create_scope(ScopeId::ROOT, "preview").unwrap();
		registry.on(EventName::ConfigRead, "web", answering(|env| env.set_result(json!("default"))));
		registry
			.on_scope(scope, EventName::ConfigRead, "preview", answering(|env| env.set_result(json!("override"))))
			.unwrap();
		let bus = Bus::new(registry);

		let scoped = bus.dispatch_on(scope, EventName::ConfigRead, json!({})).unwrap();
		assert!(matches!(scoped, Dispatched::Ready(ref v) if v == "override"));
		let root = bus.dispatch(EventName::ConfigRead, json!({})).unwrap();
		assert!(matches!(root, Dispatched::Ready(ref v) if v == "default"));
	}

	#[test]
	fn two_writers_without_cancel_last_writer_wins() {
		let mut registry = CapabilityRegistry::new();
		let scope = registry.create_scope(ScopeId::ROOT, "panel").unwrap();
		registry.on(EventName::StoreGet, "root", |env| {
			env.set_result(json!("outer"));
			ControlFlow::Continue(())
		});
		registry
			.on_scope(scope, EventName::StoreGet, "panel", |env| {
				env.set_result(json!("inner"));
				ControlFlow::Continue(())
			})
			.unwrap();
		let bus = Bus::new(registry);

		let out = bus.dispatch_on(scope, EventName::StoreGet, json!({})).unwrap();
		assert!(matches!(out, Dispatched::Ready(ref v) if v == "outer"));
	}

	#[test]
	fn same_scope_listeners_run_in_registration_order() {
		let mut registry = CapabilityRegistry::new();
		registry.on(EventName::StoreGet, "first", |env| {
			env.set_result(json!(1));
			ControlFlow::Continue(())
		});
		registry.on(EventName::StoreGet, "second", |env| {
			env.set_result(json!(2));
			ControlFlow::Continue(())
		});
		let bus = Bus::new(registry);
		let out = bus.dispatch(EventName::StoreGet, json!({})).unwrap();
		assert!(matches!(out, Dispatched::Ready(ref v) if v == 2));
	}

	#[test]
	fn cancel_via_envelope_stops_propagation() {
		let mut registry = CapabilityRegistry::new();
		registry.on(EventName::StoreGet, "first", |env| {
			env.set_result(json!(1));
			env.cancel();
			ControlFlow::Continue(())
		});
		registry.on(EventName::StoreGet, "second", |env| {
			env.set_result(json!(2));
			ControlFlow::Continue(())
		});
		let bus = Bus::new(registry);
		let out = bus.dispatch(EventName::StoreGet, json!({})).unwrap();
		assert!(matches!(out, Dispatched::Ready(ref v) if v == 1));
	}

	#[test]
	fn synchronous_failure_is_raised_from_dispatch() {
		let mut registry = CapabilityRegistry::new();
		registry.on(
			EventName::HistoryCreate,
			"web",
			answering(|env| match env.arg::<String>("url") {
				Ok(url) => env.set_result(json!(url)),
				Err(err) => env.set_failed(err),
			}),
		);
		let bus = Bus::new(registry);
		let err = bus.dispatch(EventName::HistoryCreate, json!({})).unwrap_err();
		assert!(matches!(err, BusError::InvalidDetail { .. }));
	}

	#[test]
	fn non_object_detail_is_rejected() {
		let bus = Bus::new(CapabilityRegistry::new());
		assert!(matches!(
			bus.dispatch(EventName::StoreGet, json!([1, 2])),
			Err(BusError::InvalidDetail { .. })
		));
	}

	#[tokio::test(flavor = "current_thread")]
	async fn request_decodes_typed_value() {
		let mut registry = CapabilityRegistry::new();
		registry.on(EventName::StoreGet, "web", answering(|env| env.set_result(json!([1, 2, 3]))));
		let bus = Bus::new(registry);
		let out: Vec<u32> = bus.request(EventName::StoreGet, &json!({ "key": "k" })).await.unwrap();
		assert_eq!(out, vec![1, 2, 3]);
	}
}
