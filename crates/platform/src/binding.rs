use async_trait::async_trait;
use switchboard_bus::{BusError, CapabilityRegistry};
use switchboard_proto::Notification;
use switchboard_worker::WorkerError;
use tokio::sync::broadcast;

/// Errors that abort application startup.
#[derive(Debug, thiserror::Error)]
pub enum BindingInitError {
	/// A binding's `initialize` failed.
	#[error("binding `{binding}` failed to initialize: {reason}")]
	Failed {
		/// Binding name.
		binding: &'static str,
		/// Failure description.
		reason: String,
	},
	/// A binding could not reach the worker.
	#[error("binding `{binding}` could not reach the worker: {source}")]
	Worker {
		/// Binding name.
		binding: &'static str,
		/// Connection error.
		#[source]
		source: WorkerError,
	},
	/// A binding was asked to register before it initialized.
	#[error("binding `{binding}` registered before initialize completed")]
	NotInitialized {
		/// Binding name.
		binding: &'static str,
	},
	/// The event name tables collide, or a registration targeted an unknown scope.
	#[error(transparent)]
	Bus(#[from] BusError),
}

/// A platform-specific implementation of the capability set.
///
/// Startup calls [`initialize`](Self::initialize) on every binding in order,
/// then [`register`](Self::register) on every binding in the same order. No
/// dispatch can happen before both phases completed for all bindings.
#[async_trait]
pub trait PlatformBinding: Send + Sync {
	/// Name used in logs and errors.
	fn name(&self) -> &'static str;

	/// Acquires whatever the binding needs (connections, stores, handles).
	async fn initialize(&mut self) -> Result<(), BindingInitError>;

	/// Registers the binding's capability handlers.
	fn register(&self, registry: &mut CapabilityRegistry) -> Result<(), BindingInitError>;

	/// State-change notifications from the worker, if this binding is connected to one.
	fn notifications(&self) -> Option<broadcast::Receiver<Notification>> {
		None
	}
}
