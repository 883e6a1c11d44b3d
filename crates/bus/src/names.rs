//! Process-wide event name registry.
//!
//! Every name that may travel over the bus is declared once in the
//! [`event_names!`] table below. Names are flat, dot-free strings built by
//! concatenating a namespace prefix with an action (e.g. `storehistorycreate`).
//! Uniqueness of the built-in table is asserted at compile time; tables added
//! by extensions are checked at startup with [`check_unique`].

use std::collections::HashMap;
use std::fmt;

use crate::error::BusError;

macro_rules! event_names {
	(
		$(
			$(#[$ns_doc:meta])*
			$ns:ident => $ns_label:literal {
				$( $(#[$doc:meta])* $variant:ident => $name:literal ),* $(,)?
			}
		)*
	) => {
		/// Identifier of one bus operation.
		#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
		pub enum EventName {
			$( $( $(#[$doc])* $variant, )* )*
		}

		/// Grouping of event names by capability.
		#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
		pub enum Namespace {
			$( $(#[$ns_doc])* $ns, )*
		}

		impl EventName {
			/// Every built-in event name.
			pub const ALL: &'static [EventName] = &[ $( $( EventName::$variant, )* )* ];

			const NAME_STRINGS: &'static [&'static str] = &[ $( $( $name, )* )* ];

			/// Returns the wire string for this name.
			#[must_use]
			pub const fn as_str(self) -> &'static str {
				match self {
					$( $( EventName::$variant => $name, )* )*
				}
			}

			/// Returns the namespace this name belongs to.
			#[must_use]
			pub const fn namespace(self) -> Namespace {
				match self {
					$( $( EventName::$variant => Namespace::$ns, )* )*
				}
			}
		}

		impl Namespace {
			/// Every namespace.
			pub const ALL: &'static [Namespace] = &[ $( Namespace::$ns, )* ];

			/// Returns the namespace label used in diagnostics.
			#[must_use]
			pub const fn label(self) -> &'static str {
				match self {
					$( Namespace::$ns => $ns_label, )*
				}
			}

			/// Returns the names declared in this namespace as a checkable table.
			#[must_use]
			pub const fn table(self) -> NameTable {
				match self {
					$( Namespace::$ns => NameTable::new($ns_label, &[ $( $name, )* ]), )*
				}
			}
		}
	};
}

event_names! {
	/// Named configuration access.
	Config => "config" {
		/// Read one configuration key, or the whole map.
		ConfigRead => "configread",
		/// Write one configuration key.
		ConfigUpdate => "configupdate",
		/// Remove one configuration key.
		ConfigDelete => "configdelete",
	}
	/// Durable key-value storage.
	Store => "store" {
		/// Read a stored value.
		StoreGet => "storekvget",
		/// Write a stored value.
		StoreSet => "storekvset",
		/// Remove a stored value.
		StoreDelete => "storekvdelete",
	}
	/// Opening named screens and windows.
	Navigation => "navigation" {
		/// Open an application screen.
		NavigateApp => "navigateapp",
		/// Open an external URL.
		NavigateExternal => "navigateexternal",
	}
	/// Application-local URL history.
	History => "history" {
		/// Record a visited URL.
		HistoryCreate => "storehistorycreate",
		/// Search the history by substring.
		HistoryQuery => "storehistoryquery",
		/// List recent history entries.
		HistoryList => "storehistorylist",
		/// Remove one history entry.
		HistoryDelete => "storehistorydelete",
		/// Remove all history entries.
		HistoryClear => "storehistoryclear",
	}
	/// Stored projects.
	Project => "project" {
		/// Read one project.
		ProjectRead => "storeprojectread",
		/// List all projects.
		ProjectList => "storeprojectlist",
		/// Create or replace a project.
		ProjectUpdate => "storeprojectupdate",
		/// Remove one project.
		ProjectDelete => "storeprojectdelete",
		/// Remove all projects.
		ProjectClear => "storeprojectclear",
	}
	/// Outbound HTTP passthrough.
	Transport => "transport" {
		/// Send an HTTP request on behalf of the UI.
		TransportHttp => "transporthttp",
	}
}

const _: () = assert!(
	all_distinct(EventName::NAME_STRINGS),
	"duplicate event name in the built-in registry"
);

const fn str_eq(a: &str, b: &str) -> bool {
	let (a, b) = (a.as_bytes(), b.as_bytes());
	if a.len() != b.len() {
		return false;
	}
	let mut i = 0;
	while i < a.len() {
		if a[i] != b[i] {
			return false;
		}
		i += 1;
	}
	true
}

const fn all_distinct(names: &[&str]) -> bool {
	let mut i = 0;
	while i < names.len() {
		let mut j = i + 1;
		while j < names.len() {
			if str_eq(names[i], names[j]) {
				return false;
			}
			j += 1;
		}
		i += 1;
	}
	true
}

impl EventName {
	/// Looks up a built-in name by its wire string.
	#[must_use]
	pub fn parse(name: &str) -> Option<Self> {
		Self::ALL.iter().copied().find(|event| event.as_str() == name)
	}
}

impl fmt::Display for EventName {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

/// A named list of event strings, checked for collisions at startup.
#[derive(Debug, Clone, Copy)]
pub struct NameTable {
	/// Namespace label reported in collision errors.
	pub namespace: &'static str,
	/// Event strings declared by the namespace.
	pub names: &'static [&'static str],
}

impl NameTable {
	/// Creates a table.
	#[must_use]
	pub const fn new(namespace: &'static str, names: &'static [&'static str]) -> Self {
		Self { namespace, names }
	}
}

/// Returns one table per built-in namespace.
#[must_use]
pub fn builtin_tables() -> Vec<NameTable> {
	Namespace::ALL.iter().map(|ns| ns.table()).collect()
}

/// Scans all tables and fails on the first name declared twice.
///
/// # Errors
///
/// Returns [`BusError::DuplicateName`] naming the colliding key and the two
/// namespaces that declare it.
pub fn check_unique<'a>(tables: impl IntoIterator<Item = &'a NameTable>) -> Result<(), BusError> {
	let mut seen: HashMap<&'static str, &'static str> = HashMap::new();
	for table in tables {
		for &name in table.names {
			if let Some(first) = seen.insert(name, table.namespace) {
				return Err(BusError::DuplicateName {
					name: name.to_string(),
					first: first.to_string(),
					second: table.namespace.to_string(),
				});
			}
		}
	}
	Ok(())
}

#[cfg(test)]
mod tests {
	use pretty_assertions::assert_eq;

	use super::*;

	#[test]
	fn builtin_tables_have_no_collisions() {
		let tables = builtin_tables();
		assert!(check_unique(&tables).is_ok());
		let total: usize = tables.iter().map(|t| t.names.len()).sum();
		assert_eq!(total, EventName::ALL.len());
	}

	#[test]
	fn names_are_flat_and_parse_back() {
		for &event in EventName::ALL {
			assert!(!event.as_str().contains('.'), "{event} must be dot-free");
			assert_eq!(EventName::parse(event.as_str()), Some(event));
			assert!(event.namespace().table().names.contains(&event.as_str()));
		}
		assert_eq!(EventName::parse("nosuchevent"), None);
	}

	#[test]
	fn check_unique_reports_colliding_key() {
		static EXTRA: NameTable = NameTable::new("plugin", &["pluginping", "storehistorycreate"]);
		let mut tables = builtin_tables();
		tables.push(EXTRA);

		let err = check_unique(&tables).unwrap_err();
		assert_eq!(
			err,
			BusError::DuplicateName {
				name: "storehistorycreate".into(),
				first: "history".into(),
				second: "plugin".into(),
			}
		);
	}

	#[test]
	fn const_distinct_check_detects_duplicates() {
		assert!(all_distinct(&["a", "b", "c"]));
		assert!(!all_distinct(&["a", "b", "a"]));
		assert!(!str_eq("ab", "abc"));
	}
}
