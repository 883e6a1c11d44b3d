//! Binding for native-shell builds backed by the worker process.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use switchboard_bus::{CapabilityRegistry, answering};
use switchboard_proto::Notification;
use switchboard_worker::{WorkerClient, WorkerHandle};
use tokio::sync::broadcast;

use crate::binding::{BindingInitError, PlatformBinding};
use crate::capability::{HttpTransport, Navigator, worker_backed, worker_operation};
use crate::local::{self, OfflineTransport, RecordingNavigator};

const NAME: &str = "desktop";

/// How the desktop binding reaches the worker.
#[derive(Debug, Clone)]
pub enum WorkerEndpoint {
	/// A `switchboard-worker` daemon listening on a Unix socket.
	Socket(PathBuf),
	/// A worker service running in this process.
	InProcess(WorkerHandle),
}

/// Forwards durable-state capabilities to the worker; navigation and HTTP run locally.
///
/// Forwarded capabilities always dispatch as pending: the request frame is
/// queued during dispatch and the caller awaits the correlated response.
pub struct DesktopBinding {
	endpoint: WorkerEndpoint,
	label: Option<String>,
	client: Option<Arc<WorkerClient>>,
	navigator: Arc<dyn Navigator>,
	http: Arc<dyn HttpTransport>,
}

impl DesktopBinding {
	/// Binding that connects to `endpoint` during `initialize`.
	#[must_use]
	pub fn new(endpoint: WorkerEndpoint) -> Self {
		Self {
			endpoint,
			label: None,
			client: None,
			navigator: Arc::new(RecordingNavigator::default()),
			http: Arc::new(OfflineTransport),
		}
	}

	/// Label reported to the worker in the handshake.
	#[must_use]
	pub fn with_label(mut self, label: impl Into<String>) -> Self {
		self.label = Some(label.into());
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

	/// The worker connection, once initialized.
	#[must_use]
	pub fn client(&self) -> Option<&Arc<WorkerClient>> {
		self.client.as_ref()
	}
}

#[async_trait]
impl PlatformBinding for DesktopBinding {
	fn name(&self) -> &'static str {
		NAME
	}

	async fn initialize(&mut self) -> Result<(), BindingInitError> {
		let label = self.label.clone();
		let connected = match &self.endpoint {
			WorkerEndpoint::Socket(path) => WorkerClient::connect_unix(path, label).await,
			WorkerEndpoint::InProcess(handle) => WorkerClient::connect_in_process(handle, label).await,
		};
		let client = connected.map_err(|source| BindingInitError::Worker { binding: NAME, source })?;
		tracing::info!(client = %client.client_id(), "platform.desktop.connected");
		self.client = Some(Arc::new(client));
		Ok(())
	}

	fn register(&self, registry: &mut CapabilityRegistry) -> Result<(), BindingInitError> {
		let Some(client) = &self.client else {
			return Err(BindingInitError::NotInitialized { binding: NAME });
		};

		for name in worker_backed() {
			let Some(operation) = worker_operation(name) else {
				continue;
			};
			let client = client.clone();
			registry.on(
				name,
				NAME,
				answering(move |env| {
					let args = serde_json::Value::Object(env.detail().clone());
					let pending = client.request(operation, args);
					env.set_pending(async move { pending.await.map_err(local::from_worker) });
				}),
			);
		}

		local::register_navigation(registry, NAME, &self.navigator);
		local::register_http(registry, NAME, &self.http);
		Ok(())
	}

	fn notifications(&self) -> Option<broadcast::Receiver<Notification>> {
		self.client.as_ref().map(|client| client.subscribe())
	}
}
