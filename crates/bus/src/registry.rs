//! Capability registration and scope-chain routing.
//!
//! Scopes form a tree rooted at [`ScopeId::ROOT`]. A dispatch on a target
//! scope visits the target's handlers first, then its parent's, and so on up
//! to the root. Registering a handler on an inner scope therefore shadows a
//! default registered on the root, provided the inner handler breaks
//! propagation after writing its result.

use std::collections::HashMap;
use std::fmt;
use std::ops::ControlFlow;
use std::sync::Arc;

use crate::envelope::Envelope;
use crate::error::BusError;
use crate::names::EventName;

/// Capability handler. Return [`ControlFlow::Break`] to stop propagation.
pub type Handler = Arc<dyn Fn(&mut Envelope) -> ControlFlow<()> + Send + Sync>;

/// Identifier of one node in the scope tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ScopeId(u32);

impl ScopeId {
	/// The root scope every dispatch eventually reaches.
	pub const ROOT: Self = Self(0);
}

pub(crate) struct Listener {
	pub(crate) owner: &'static str,
	pub(crate) handler: Handler,
}

struct ScopeNode {
	parent: Option<ScopeId>,
	label: String,
	listeners: HashMap<EventName, Vec<Listener>>,
}

/// Lookup table from event name to handlers, per scope.
///
/// Built during the startup phase and frozen inside a [`crate::Bus`]
/// afterwards; there is no registration after the bus is ready.
pub struct CapabilityRegistry {
	scopes: Vec<ScopeNode>,
}

impl fmt::Debug for CapabilityRegistry {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("CapabilityRegistry")
			.field("scopes", &self.scopes.iter().map(|s| s.label.as_str()).collect::<Vec<_>>())
			.field("listeners", &self.scopes.iter().map(|s| s.listeners.len()).sum::<usize>())
			.finish()
	}
}

impl Default for CapabilityRegistry {
	fn default() -> Self {
		Self::new()
	}
}

impl CapabilityRegistry {
	/// Creates a registry containing only the root scope.
	#[must_use]
	pub fn new() -> Self {
		Self {
			scopes: vec![ScopeNode {
				parent: None,
				label: "root".to_string(),
				listeners: HashMap::new(),
			}],
		}
	}

	/// Creates a child scope under `parent`.
	///
	/// # Errors
	///
	/// Returns [`BusError::UnknownScope`] if `parent` is not part of this registry.
	pub fn create_scope(&mut self, parent: ScopeId, label: impl Into<String>) -> Result<ScopeId, BusError> {
		self.node(parent)?;
		let id = u32::try_from(self.scopes.len()).map_err(|_| BusError::UnknownScope(u32::MAX))?;
		self.scopes.push(ScopeNode {
			parent: Some(parent),
			label: label.into(),
			listeners: HashMap::new(),
		});
		Ok(ScopeId(id))
	}

	/// Registers `handler` for `name` on the root scope.
	pub fn on<F>(&mut self, name: EventName, owner: &'static str, handler: F)
	where
		F: Fn(&mut Envelope) -> ControlFlow<()> + Send + Sync + 'static,
	{
		self.scopes[0]
			.listeners
			.entry(name)
			.or_default()
			.push(Listener {
				owner,
				handler: Arc::new(handler),
			});
	}

	/// Registers `handler` for `name` on `scope`.
	///
	/// # Errors
	///
	/// Returns [`BusError::UnknownScope`] if `scope` is not part of this registry.
	pub fn on_scope<F>(&mut self, scope: ScopeId, name: EventName, owner: &'static str, handler: F) -> Result<(), BusError>
	where
		F: Fn(&mut Envelope) -> ControlFlow<()> + Send + Sync + 'static,
	{
		let node = self.node_mut(scope)?;
		node.listeners.entry(name).or_default().push(Listener {
			owner,
			handler: Arc::new(handler),
		});
		tracing::trace!(event = %name, owner, scope = scope.0, "bus.register");
		Ok(())
	}

	/// Owners of every handler reachable for `name` from `target`, in visit order.
	///
	/// # Errors
	///
	/// Returns [`BusError::UnknownScope`] if `target` is not part of this registry.
	pub fn owners(&self, target: ScopeId, name: EventName) -> Result<Vec<&'static str>, BusError> {
		Ok(self.route(target, name)?.into_iter().map(|l| l.owner).collect())
	}

	/// Returns true if any scope has a handler for `name`.
	#[must_use]
	pub fn handles(&self, name: EventName) -> bool {
		self.scopes
			.iter()
			.any(|s| s.listeners.get(&name).is_some_and(|l| !l.is_empty()))
	}

	/// Collects the handlers for `name` from `target` up to the root.
	pub(crate) fn route(&self, target: ScopeId, name: EventName) -> Result<Vec<&Listener>, BusError> {
		let mut out = Vec::new();
		let mut cursor = Some(target);
		while let Some(id) = cursor {
			let node = self.node(id)?;
			if let Some(listeners) = node.listeners.get(&name) {
				out.extend(listeners.iter());
			}
			cursor = node.parent;
		}
		Ok(out)
	}

	fn node(&self, id: ScopeId) -> Result<&ScopeNode, BusError> {
		self.scopes.get(id.0 as usize).ok_or(BusError::UnknownScope(id.0))
	}

	fn node_mut(&mut self, id: ScopeId) -> Result<&mut ScopeNode, BusError> {
		self.scopes.get_mut(id.0 as usize).ok_or(BusError::UnknownScope(id.0))
	}
}
