//! Binding for builds where every capability runs in the UI's own context.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use serde_json::Value;
use switchboard_bus::{BusError, CapabilityRegistry, EventName, answering};
use switchboard_worker::{MemoryStore, Operation, StateSnapshot, StateStore, StoreError, now_millis};

use crate::binding::{BindingInitError, PlatformBinding};
use crate::capability::{HttpTransport, Navigator, worker_backed, worker_operation};
use crate::local::{self, OfflineTransport, RecordingNavigator};

const NAME: &str = "web";

/// In-memory state plus a counter bumped on every adopted change.
#[derive(Default)]
struct LocalState {
	snapshot: StateSnapshot,
	generation: u64,
}

fn lock(state: &Mutex<LocalState>) -> MutexGuard<'_, LocalState> {
	state.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Writes snapshots to the store, never replacing a newer one with an older one.
#[derive(Clone)]
struct Persister {
	store: Arc<dyn StateStore>,
	saved: Arc<tokio::sync::Mutex<u64>>,
}

impl Persister {
	async fn save(self, generation: u64, snapshot: StateSnapshot) -> Result<(), StoreError> {
		let mut saved = self.saved.lock().await;
		if *saved >= generation {
			return Ok(());
		}
		self.store.save(&snapshot).await?;
		*saved = generation;
		Ok(())
	}
}

/// Fulfils the whole capability set from state held in the UI's context.
///
/// Reads answer with [`switchboard_bus::Dispatched::Ready`]. A write that
/// changes state is visible to later reads at once and answers with a
/// pending result that resolves once the snapshot reached the store. If the
/// save fails, the caller gets the error and the change stays in memory until
/// the next successful save persists it. HTTP is always pending.
pub struct WebBinding {
	store: Arc<dyn StateStore>,
	state: Arc<Mutex<LocalState>>,
	navigator: Arc<dyn Navigator>,
	http: Arc<dyn HttpTransport>,
	history_limit: usize,
	initialized: bool,
}

impl Default for WebBinding {
	fn default() -> Self {
		Self::new()
	}
}

impl WebBinding {
	/// Binding with volatile state, a recording navigator and no network.
	#[must_use]
	pub fn new() -> Self {
		Self {
			store: Arc::new(MemoryStore::new()),
			state: Arc::default(),
			navigator: Arc::new(RecordingNavigator::default()),
			http: Arc::new(OfflineTransport),
			history_limit: 500,
			initialized: false,
		}
	}

	/// Loads the initial state from `store` during `initialize` and saves every change back to it.
	#[must_use]
	pub fn with_seed(mut self, store: Arc<dyn StateStore>) -> Self {
		self.store = store;
		self
	}

	/// Uses `navigator` for navigation capabilities.
	#[must_use]
	pub fn with_navigator(mut self, navigator: Arc<dyn Navigator>) -> Self {
		self.navigator = navigator;
		self
	}

	/// Uses `http` for the HTTP passthrough.
	#[must_use]
	pub fn with_http(mut self, http: Arc<dyn HttpTransport>) -> Self {
		self.http = http;
		self
	}

	/// Caps the local URL history.
	#[must_use]
	pub fn with_history_limit(mut self, limit: usize) -> Self {
		self.history_limit = limit.max(1);
		self
	}
}

#[async_trait]
impl PlatformBinding for WebBinding {
	fn name(&self) -> &'static str {
		NAME
	}

	async fn initialize(&mut self) -> Result<(), BindingInitError> {
		let snapshot = self.store.load().await.map_err(|err| BindingInitError::Failed {
			binding: NAME,
			reason: err.to_string(),
		})?;
		lock(&self.state).snapshot = snapshot;
		self.initialized = true;
		Ok(())
	}

	fn register(&self, registry: &mut CapabilityRegistry) -> Result<(), BindingInitError> {
		if !self.initialized {
			return Err(BindingInitError::NotInitialized { binding: NAME });
		}

		let persister = Persister {
			store: self.store.clone(),
			saved: Arc::default(),
		};
		for name in worker_backed() {
			let Some(operation) = worker_operation(name) else {
				continue;
			};
			let state = self.state.clone();
			let persister = persister.clone();
			let limit = self.history_limit;
			registry.on(
				name,
				NAME,
				answering(move |env| {
					let op = match Operation::decode(operation, env.detail()) {
						Ok(op) => op,
						Err(err) => {
							env.set_failed(BusError::InvalidDetail {
								name: name.as_str().to_string(),
								reason: err.to_string(),
							});
							return;
						}
					};
					let operation = op.name();

					let outcome = {
						let mut local = lock(&state);
						match local.snapshot.apply(op, now_millis(), limit) {
							Ok((value, changes)) if changes.is_empty() => Ok((value, None)),
							Ok((value, _)) => {
								local.generation += 1;
								Ok((value, Some((local.generation, local.snapshot.clone()))))
							}
							Err(err) => Err(err),
						}
					};

					match outcome {
						Ok((value, None)) => env.set_result(value),
						Ok((value, Some((generation, snapshot)))) => {
							let save = persister.clone().save(generation, snapshot);
							let saved = async move {
								save.await.map(|()| value).map_err(|err| {
									tracing::warn!(operation, error = %err, "platform.web.persist_failed");
									local::capability_error(name, err.to_string())
								})
							};
							set_persisting(env, name, saved);
						}
						Err(err) => env.set_failed(local::capability_error(name, err.to_string())),
					}
				}),
			);
		}

		local::register_navigation(registry, NAME, &self.navigator);
		local::register_http(registry, NAME, &self.http);
		tracing::debug!(events = EventName::ALL.len(), "platform.web.registered");
		Ok(())
	}
}

/// Runs the save as its own task when a runtime is available, so dropping the
/// pending result does not abandon it.
fn set_persisting<F>(env: &mut switchboard_bus::Envelope, name: EventName, saved: F)
where
	F: Future<Output = Result<Value, BusError>> + Send + 'static,
{
	match tokio::runtime::Handle::try_current() {
		Ok(runtime) => {
			let task = runtime.spawn(saved);
			env.set_pending(async move {
				task.await
					.map_err(|err| local::capability_error(name, err.to_string()))?
			});
		}
		Err(_) => env.set_pending(saved),
	}
}
