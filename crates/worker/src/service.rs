//! The worker service actor.
//!
//! One task owns the state snapshot, the store and the client registry.
//! Commands are processed strictly in mailbox order, so mutations never
//! interleave and every notification reflects a committed state.

use std::sync::Arc;

use serde_json::Value;
use switchboard_proto::{ClientId, ServerFrame, WorkerRequest, WorkerResponse};
use tokio::sync::{mpsc, oneshot};

use crate::clients::{ClientRegistry, ClientSink};
use crate::config::WorkerConfig;
use crate::error::WorkerError;
use crate::operation::Operation;
use crate::state::{Change, StateSnapshot, now_millis};
use crate::store::StateStore;

/// Where the response to an [`WorkerCmd::Execute`] goes.
#[derive(Debug)]
pub enum Reply {
	/// Queue a response frame on a registered client's channel.
	Client(ClientId),
	/// Hand the response to an in-process caller.
	Direct(oneshot::Sender<WorkerResponse>),
}

/// Commands for the worker service actor.
#[derive(Debug)]
pub enum WorkerCmd {
	/// Register a client and deliver its welcome frame.
	Connect {
		/// Optional label for logs.
		label: Option<String>,
		/// Outbound channel of the connection.
		sink: ClientSink,
		/// Receives the assigned id.
		reply: oneshot::Sender<Result<ClientId, WorkerError>>,
	},
	/// Forget a client. Idempotent.
	Disconnect {
		/// Client to remove.
		client: ClientId,
	},
	/// Run one request.
	Execute {
		/// The request.
		request: WorkerRequest,
		/// Response destination.
		reply: Reply,
	},
	/// List currently connected clients.
	Clients {
		/// Receives the ids.
		reply: oneshot::Sender<Vec<ClientId>>,
	},
}

/// Cloneable handle to the [`WorkerService`].
#[derive(Clone, Debug)]
pub struct WorkerHandle {
	tx: mpsc::Sender<WorkerCmd>,
}

impl WorkerHandle {
	/// Registers a client connection; its welcome frame is queued on `sink`.
	///
	/// # Errors
	///
	/// [`WorkerError::Unavailable`] if the service stopped, or the handshake error.
	pub async fn connect(&self, label: Option<String>, sink: ClientSink) -> Result<ClientId, WorkerError> {
		let (reply, rx) = oneshot::channel();
		self.send(WorkerCmd::Connect { label, sink, reply }).await?;
		rx.await.map_err(|_| WorkerError::Unavailable)?
	}

	/// Removes a client. Unknown ids are ignored.
	pub async fn disconnect(&self, client: ClientId) {
		let _ = self.send(WorkerCmd::Disconnect { client }).await;
	}

	/// Queues a request whose response is delivered on `client`'s channel.
	///
	/// # Errors
	///
	/// [`WorkerError::Unavailable`] if the service stopped.
	pub async fn submit(&self, client: ClientId, request: WorkerRequest) -> Result<(), WorkerError> {
		self.send(WorkerCmd::Execute {
			request,
			reply: Reply::Client(client),
		})
		.await
	}

	/// Runs a request and waits for its response.
	///
	/// # Errors
	///
	/// [`WorkerError::Unavailable`] if the service stopped. Operation failures
	/// are carried inside the returned response.
	pub async fn execute(&self, request: WorkerRequest) -> Result<WorkerResponse, WorkerError> {
		let (reply, rx) = oneshot::channel();
		self.send(WorkerCmd::Execute {
			request,
			reply: Reply::Direct(reply),
		})
		.await?;
		rx.await.map_err(|_| WorkerError::Unavailable)
	}

	/// Runs `operation` with `args` and rehydrates the result.
	///
	/// # Errors
	///
	/// [`WorkerError::Operation`] carrying the worker's failure, or [`WorkerError::Unavailable`].
	pub async fn call(&self, operation: &str, args: Value) -> Result<Value, WorkerError> {
		self.execute(WorkerRequest::new(operation, args))
			.await?
			.into_result()
			.map_err(WorkerError::Operation)
	}

	/// Ids of currently connected clients.
	///
	/// # Errors
	///
	/// [`WorkerError::Unavailable`] if the service stopped.
	pub async fn clients(&self) -> Result<Vec<ClientId>, WorkerError> {
		let (reply, rx) = oneshot::channel();
		self.send(WorkerCmd::Clients { reply }).await?;
		rx.await.map_err(|_| WorkerError::Unavailable)
	}

	async fn send(&self, cmd: WorkerCmd) -> Result<(), WorkerError> {
		self.tx.send(cmd).await.map_err(|_| WorkerError::Unavailable)
	}
}

/// Actor owning the durable state and the connected clients.
pub struct WorkerService {
	rx: mpsc::Receiver<WorkerCmd>,
	state: StateSnapshot,
	store: Arc<dyn StateStore>,
	clients: ClientRegistry,
	history_limit: usize,
}

impl WorkerService {
	/// Loads the persisted state and spawns the service actor.
	///
	/// The task ends once every [`WorkerHandle`] has been dropped.
	///
	/// # Errors
	///
	/// Returns the store error if the initial load fails.
	pub async fn start(config: &WorkerConfig, store: Arc<dyn StateStore>) -> Result<WorkerHandle, WorkerError> {
		let state = store.load().await?;
		tracing::info!(
			history = state.history.len(),
			config_keys = state.config.len(),
			projects = state.projects.len(),
			"worker.state.loaded"
		);

		let (tx, rx) = mpsc::channel(config.mailbox_capacity.max(1));
		let service = Self {
			rx,
			state,
			store,
			clients: ClientRegistry::new(),
			history_limit: config.history_limit.max(1),
		};
		tokio::spawn(service.run());
		Ok(WorkerHandle { tx })
	}

	async fn run(mut self) {
		while let Some(cmd) = self.rx.recv().await {
			match cmd {
				WorkerCmd::Connect { label, sink, reply } => {
					let id = self.clients.register(label, sink);
					let result = self.clients.complete_handshake(id).map(|()| id);
					let _ = reply.send(result);
				}
				WorkerCmd::Disconnect { client } => {
					self.clients.disconnect(client);
				}
				WorkerCmd::Execute { request, reply } => {
					let response = self.execute(request).await;
					match reply {
						Reply::Client(client) => {
							if let Err(err) = self.clients.send_to(client, ServerFrame::Response(response)) {
								tracing::debug!(%client, error = %err, "worker.response.dropped");
							}
						}
						Reply::Direct(tx) => {
							let _ = tx.send(response);
						}
					}
				}
				WorkerCmd::Clients { reply } => {
					let _ = reply.send(self.clients.connected());
				}
			}
		}
		tracing::debug!("worker.service.stopped");
	}

	async fn execute(&mut self, request: WorkerRequest) -> WorkerResponse {
		let WorkerRequest {
			correlation_id,
			operation,
			args,
		} = request;

		let result = match Operation::decode(&operation, &args) {
			Ok(op) => self.apply(op).await,
			Err(err) => Err(err),
		};

		match result {
			Ok(value) => {
				tracing::trace!(%correlation_id, %operation, "worker.op.ok");
				WorkerResponse::success(correlation_id, value)
			}
			Err(err) => {
				tracing::warn!(%correlation_id, %operation, error = %err, "worker.op.failed");
				WorkerResponse::failure(correlation_id, err.to_body())
			}
		}
	}

	async fn apply(&mut self, op: Operation) -> Result<Value, WorkerError> {
		if !op.is_mutating() {
			let (value, _) = self.state.apply(op, now_millis(), self.history_limit)?;
			return Ok(value);
		}
		let mut next = self.state.clone();
		let (value, changes) = next.apply(op, now_millis(), self.history_limit)?;
		self.commit(next, changes).await?;
		Ok(value)
	}

	/// Persists `next`, adopts it, then notifies every connected client.
	///
	/// No changes means no write and no notification. A failed save leaves the
	/// in-memory state untouched and sends nothing.
	async fn commit(&mut self, next: StateSnapshot, changes: Vec<Change>) -> Result<(), WorkerError> {
		if changes.is_empty() {
			return Ok(());
		}
		self.store.save(&next).await?;
		self.state = next;
		for change in &changes {
			self.clients.broadcast(&change.to_notification());
		}
		Ok(())
	}
}
