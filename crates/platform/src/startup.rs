//! Ordered binding initialization and the transition to the ready state.

use switchboard_bus::{Bus, BusError, CapabilityRegistry, NameTable, builtin_tables, check_unique};
use switchboard_proto::Notification;
use tokio::sync::broadcast;

use crate::binding::{BindingInitError, PlatformBinding};

type Configure = Box<dyn FnOnce(&mut CapabilityRegistry) -> Result<(), BusError> + Send>;

/// Builder for the application's startup sequence.
///
/// A [`Bus`] only comes out of [`Startup::run`], after every binding has
/// initialized and registered, so UI code cannot dispatch any earlier.
#[derive(Default)]
pub struct Startup {
	bindings: Vec<Box<dyn PlatformBinding>>,
	extra_names: Vec<NameTable>,
	configure: Vec<Configure>,
}

impl Startup {
	/// Empty startup sequence.
	#[must_use]
	pub fn new() -> Self {
		Self::default()
	}

	/// Appends a binding. Bindings initialize and register in insertion order.
	#[must_use]
	pub fn binding(mut self, binding: impl PlatformBinding + 'static) -> Self {
		self.bindings.push(Box::new(binding));
		self
	}

	/// Adds an extension name table to the startup uniqueness check.
	#[must_use]
	pub fn names(mut self, table: NameTable) -> Self {
		self.extra_names.push(table);
		self
	}

	/// Runs `f` on the registry after every binding registered.
	///
	/// Used for scoped overrides that shadow a binding's root handlers.
	#[must_use]
	pub fn configure<F>(mut self, f: F) -> Self
	where
		F: FnOnce(&mut CapabilityRegistry) -> Result<(), BusError> + Send + 'static,
	{
		self.configure.push(Box::new(f));
		self
	}

	/// Checks names, initializes and registers every binding, and returns the ready application.
	///
	/// # Errors
	///
	/// The first [`BindingInitError`]; startup does not continue past it.
	pub async fn run(self) -> Result<Ready, BindingInitError> {
		let Self {
			mut bindings,
			extra_names,
			configure,
		} = self;

		let mut tables = builtin_tables();
		tables.extend(extra_names);
		check_unique(&tables)?;

		for binding in &mut bindings {
			let name = binding.name();
			tracing::debug!(binding = name, "platform.binding.initializing");
			if let Err(err) = binding.initialize().await {
				tracing::error!(binding = name, error = %err, "platform.binding.init_failed");
				return Err(err);
			}
		}

		let mut registry = CapabilityRegistry::new();
		for binding in &bindings {
			binding.register(&mut registry)?;
		}
		for f in configure {
			f(&mut registry)?;
		}

		tracing::info!(
			bindings = ?bindings.iter().map(|b| b.name()).collect::<Vec<_>>(),
			"platform.ready"
		);
		Ok(Ready {
			bus: Bus::new(registry),
			bindings,
		})
	}
}

/// The application after startup: a frozen bus and the bindings that back it.
pub struct Ready {
	bus: Bus,
	bindings: Vec<Box<dyn PlatformBinding>>,
}

impl Ready {
	/// The bus UI code dispatches on.
	#[must_use]
	pub fn bus(&self) -> &Bus {
		&self.bus
	}

	/// Subscribes to worker notifications through the first binding that offers them.
	///
	/// Returns `None` when no binding talks to a worker.
	#[must_use]
	pub fn notifications(&self) -> Option<broadcast::Receiver<Notification>> {
		self.bindings.iter().find_map(|b| b.notifications())
	}

	/// Names of the active bindings, in startup order.
	#[must_use]
	pub fn binding_names(&self) -> Vec<&'static str> {
		self.bindings.iter().map(|b| b.name()).collect()
	}
}
