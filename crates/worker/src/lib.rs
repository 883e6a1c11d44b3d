//! Data-owning worker process for the switchboard command bus.
//!
//! # Purpose
//!
//! - Own the durable application state (URL history, named configuration, projects, key-value storage) on behalf of every UI context.
//! - Serve worker operations requested over the wire protocol in [`switchboard_proto`].
//! - Fan every committed change out to all connected clients, the requester included.
//! - Exclude capability routing inside a UI context; see `switchboard_bus`.
//!
//! # Mental model
//!
//! - A single actor task ([`WorkerService`]) owns the state, the [`StateStore`] and the [`ClientRegistry`].
//! - Connections are thin: each one registers a [`ClientSink`], forwards requests to the actor and drains the sink onto the transport.
//! - A mutation runs on a copy of the state. The copy is persisted, adopted, broadcast, and only then answered.
//! - Responses and notifications share one outbound channel per client, so a client sees its own notification before the response that caused it.
//!
//! # Key types
//!
//! | Type | Meaning | Constraints | Constructed / mutated in |
//! |---|---|---|---|
//! | [`WorkerService`] | State-owning actor | MUST be the only writer of the snapshot | `WorkerService::start` |
//! | [`WorkerHandle`] | Cloneable command sender | Fails with `Unavailable` once the actor stopped | `WorkerService::start` |
//! | [`StateSnapshot`] | Durable state | Mutations report exactly the changes they made | `StateSnapshot::*` |
//! | [`ClientRegistry`] | Connected clients | Only `Connected` clients receive notifications | `ClientRegistry::register`, `ClientRegistry::disconnect` |
//! | [`WorkerClient`] | One client connection | Pending requests fail with `Disconnected` when the connection closes | `WorkerClient::handshake` |
//!
//! # Invariants
//!
//! 1. A notification MUST only be sent after the change it describes is persisted.
//!    - Enforced in: `WorkerService::commit`
//!    - Tested by: `worker_fanout::failed_persist_leaves_state_and_clients_untouched`
//!    - Failure symptom: clients refresh from a state that is lost on restart.
//!
//! 2. Mutations MUST be applied one at a time in arrival order.
//!    - Enforced in: `WorkerService::run`
//!    - Tested by: `worker_fanout::concurrent_adds_are_serialized`
//!    - Failure symptom: lost updates to visit counts.
//!
//! 3. A closed client channel MUST NOT prevent delivery to other clients.
//!    - Enforced in: `ClientRegistry::broadcast`
//!    - Tested by: `clients::tests::closed_channel_does_not_block_other_recipients`
//!    - Failure symptom: one crashed tab silences every other tab.
//!
//! 4. Every request MUST receive exactly one response with its correlation id.
//!    - Enforced in: `WorkerService::execute`
//!    - Tested by: `worker_fanout::unknown_operation_fails_with_same_correlation_id`
//!    - Failure symptom: callers hang on a pending result.

mod client;
mod clients;
mod config;
mod connection;
mod error;
#[cfg(unix)]
mod ipc;
mod operation;
mod service;
mod state;
mod store;

pub use client::{NOTIFICATION_BUFFER, WorkerClient};
pub use clients::{ClientRegistry, ClientSink, ClientState, FanOut};
pub use config::{ConfigError, WorkerConfig};
pub use connection::{drive_connection, spawn_connection};
pub use error::WorkerError;
#[cfg(unix)]
pub use ipc::serve;
pub use operation::Operation;
pub use service::{Reply, WorkerCmd, WorkerHandle, WorkerService};
pub use state::{Change, Project, StateSnapshot, UrlHistoryEntry, now_millis};
pub use store::{FileStore, MemoryStore, StateStore, StoreError};
