//! Platform bindings for the switchboard command bus.
//!
//! A platform binding implements the capability set UI code reaches through
//! the bus: configuration, key-value storage, navigation, URL history,
//! projects and HTTP passthrough. [`WebBinding`] fulfils everything in the UI's
//! own context; [`DesktopBinding`] forwards durable state to the worker
//! process and answers with pending results.
//!
//! [`Startup`] runs every binding's `initialize` in order, then lets each one
//! register its handlers, and only then hands out the [`switchboard_bus::Bus`].
//! Any initialization failure aborts startup.

mod binding;
pub mod capability;
mod desktop;
mod local;
mod startup;
mod web;

pub use binding::{BindingInitError, PlatformBinding};
pub use desktop::{DesktopBinding, WorkerEndpoint};
pub use local::{OfflineTransport, RecordingNavigator};
pub use startup::{Ready, Startup};
pub use web::WebBinding;
