//! Durable worker state and its pure mutations.
//!
//! Every mutating method either changes the snapshot and reports the
//! [`Change`]s it made, or leaves the snapshot untouched and reports nothing.
//! The service relies on this to decide whether to persist and notify.

use std::collections::BTreeMap;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use switchboard_proto::{Notification, topic};

use crate::error::WorkerError;
use crate::operation::Operation;

/// One visited URL.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UrlHistoryEntry {
	/// Visited URL; unique within the history.
	pub url: String,
	/// Last visit, milliseconds since the Unix epoch.
	pub time: u64,
	/// Number of recorded visits.
	pub count: u32,
	/// Monotonic write stamp used to order entries by recency.
	#[serde(default)]
	pub revision: u64,
}

/// A stored request collection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Project {
	/// Stable project id.
	pub id: String,
	/// Display name.
	#[serde(default)]
	pub name: String,
	/// Saved request identifiers.
	#[serde(default)]
	pub requests: Vec<String>,
	/// Last update, milliseconds since the Unix epoch. Set by the worker.
	#[serde(default)]
	pub updated: u64,
}

/// Everything the worker persists.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StateSnapshot {
	/// URL history keyed by URL.
	pub history: BTreeMap<String, UrlHistoryEntry>,
	/// Named configuration values.
	pub config: Map<String, Value>,
	/// Projects keyed by id.
	pub projects: BTreeMap<String, Project>,
	/// Durable key-value storage shared by every UI context.
	pub kv: Map<String, Value>,
	/// Last issued history revision.
	pub revision: u64,
}

/// One externally visible state change.
#[derive(Debug, Clone, PartialEq)]
pub enum Change {
	/// A new URL was recorded.
	UrlCreated(UrlHistoryEntry),
	/// An existing URL was visited again.
	UrlUpdated(UrlHistoryEntry),
	/// A URL was removed, explicitly or by eviction.
	UrlDeleted(String),
	/// The whole history was removed.
	HistoryCleared,
	/// A configuration key was written.
	ConfigUpdated {
		/// Key.
		key: String,
		/// New value.
		value: Value,
	},
	/// A configuration key was removed.
	ConfigDeleted(String),
	/// A new project was stored.
	ProjectCreated(Project),
	/// An existing project was replaced.
	ProjectUpdated(Project),
	/// A project was removed.
	ProjectDeleted(String),
	/// Every project was removed.
	ProjectsCleared,
	/// A stored value was written.
	KvUpdated {
		/// Key.
		key: String,
		/// New value.
		value: Value,
	},
	/// A stored value was removed.
	KvDeleted(String),
}

impl Change {
	/// Notification broadcast to every connected client for this change.
	#[must_use]
	pub fn to_notification(&self) -> Notification {
		match self {
			Self::UrlCreated(entry) => Notification::new(topic::URL_HISTORY, json!({ "kind": "create", "entry": entry })),
			Self::UrlUpdated(entry) => Notification::new(topic::URL_HISTORY, json!({ "kind": "update", "entry": entry })),
			Self::UrlDeleted(url) => Notification::new(topic::URL_HISTORY, json!({ "kind": "delete", "url": url })),
			Self::HistoryCleared => Notification::new(topic::URL_HISTORY, json!({ "kind": "clear" })),
			Self::ConfigUpdated { key, value } => {
				Notification::new(topic::CONFIG, json!({ "kind": "update", "key": key, "value": value }))
			}
			Self::ConfigDeleted(key) => Notification::new(topic::CONFIG, json!({ "kind": "delete", "key": key })),
			Self::ProjectCreated(project) => {
				Notification::new(topic::PROJECT, json!({ "kind": "create", "project": project }))
			}
			Self::ProjectUpdated(project) => {
				Notification::new(topic::PROJECT, json!({ "kind": "update", "project": project }))
			}
			Self::ProjectDeleted(id) => Notification::new(topic::PROJECT, json!({ "kind": "delete", "id": id })),
			Self::ProjectsCleared => Notification::new(topic::PROJECT, json!({ "kind": "clear" })),
			Self::KvUpdated { key, value } => {
				Notification::new(topic::KV, json!({ "kind": "update", "key": key, "value": value }))
			}
			Self::KvDeleted(key) => Notification::new(topic::KV, json!({ "kind": "delete", "key": key })),
		}
	}
}

/// Milliseconds since the Unix epoch.
#[must_use]
pub fn now_millis() -> u64 {
	SystemTime::now()
		.duration_since(UNIX_EPOCH)
		.map(|d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
		.unwrap_or(0)
}

impl StateSnapshot {
	/// Records a visit to `url`, evicting the oldest entries beyond `limit`.
	///
	/// Returns the stored entry. A repeat visit bumps `count` and `time` of the
	/// existing entry instead of adding a second one.
	pub fn add_url(&mut self, url: &str, now: u64, limit: usize) -> (UrlHistoryEntry, Vec<Change>) {
		self.revision += 1;
		let revision = self.revision;
		let mut changes = Vec::new();

		let entry = match self.history.get_mut(url) {
			Some(existing) => {
				existing.count = existing.count.saturating_add(1);
				existing.time = now;
				existing.revision = revision;
				let entry = existing.clone();
				changes.push(Change::UrlUpdated(entry.clone()));
				entry
			}
			None => {
				let entry = UrlHistoryEntry {
					url: url.to_string(),
					time: now,
					count: 1,
					revision,
				};
				self.history.insert(url.to_string(), entry.clone());
				changes.push(Change::UrlCreated(entry.clone()));
				entry
			}
		};

		while self.history.len() > limit {
			let Some(oldest) = self
				.history
				.values()
				.min_by_key(|e| e.revision)
				.map(|e| e.url.clone())
			else {
				break;
			};
			self.history.remove(&oldest);
			changes.push(Change::UrlDeleted(oldest));
		}

		(entry, changes)
	}

	/// Entries whose URL contains `q`, ignoring case, newest first.
	#[must_use]
	pub fn query_urls(&self, q: &str) -> Vec<UrlHistoryEntry> {
		let needle = q.to_lowercase();
		let mut hits: Vec<_> = self
			.history
			.values()
			.filter(|e| e.url.to_lowercase().contains(&needle))
			.cloned()
			.collect();
		hits.sort_by(|a, b| b.revision.cmp(&a.revision));
		hits
	}

	/// Most recent entries first, at most `limit` when given.
	#[must_use]
	pub fn list_urls(&self, limit: Option<usize>) -> Vec<UrlHistoryEntry> {
		let mut all = self.query_urls("");
		if let Some(limit) = limit {
			all.truncate(limit);
		}
		all
	}

	/// Removes one URL. Deleting an absent URL changes nothing.
	pub fn delete_url(&mut self, url: &str) -> Option<Change> {
		self.history
			.remove(url)
			.map(|_| Change::UrlDeleted(url.to_string()))
	}

	/// Removes every URL. Clearing an empty history changes nothing.
	pub fn clear_urls(&mut self) -> Option<Change> {
		if self.history.is_empty() {
			return None;
		}
		self.history.clear();
		Some(Change::HistoryCleared)
	}

	/// One config value (`null` when unset), or the whole map when `key` is `None`.
	#[must_use]
	pub fn read_config(&self, key: Option<&str>) -> Value {
		match key {
			Some(key) => self.config.get(key).cloned().unwrap_or(Value::Null),
			None => Value::Object(self.config.clone()),
		}
	}

	/// Writes a config value. Writing the current value changes nothing.
	pub fn update_config(&mut self, key: &str, value: Value) -> Option<Change> {
		write_entry(&mut self.config, key, value.clone()).then(|| Change::ConfigUpdated {
			key: key.to_string(),
			value,
		})
	}

	/// Removes a config key. Removing an absent key changes nothing.
	pub fn delete_config(&mut self, key: &str) -> Option<Change> {
		self.config
			.remove(key)
			.map(|_| Change::ConfigDeleted(key.to_string()))
	}

	/// Stored value, `null` when unset.
	#[must_use]
	pub fn read_kv(&self, key: &str) -> Value {
		self.kv.get(key).cloned().unwrap_or(Value::Null)
	}

	/// Writes a stored value. Writing the current value changes nothing.
	pub fn update_kv(&mut self, key: &str, value: Value) -> Option<Change> {
		write_entry(&mut self.kv, key, value.clone()).then(|| Change::KvUpdated {
			key: key.to_string(),
			value,
		})
	}

	/// Removes a stored value. Removing an absent key changes nothing.
	pub fn delete_kv(&mut self, key: &str) -> Option<Change> {
		self.kv.remove(key).map(|_| Change::KvDeleted(key.to_string()))
	}

	/// Stored project by id.
	#[must_use]
	pub fn read_project(&self, id: &str) -> Option<&Project> {
		self.projects.get(id)
	}

	/// Every project, ordered by id.
	#[must_use]
	pub fn list_projects(&self) -> Vec<Project> {
		self.projects.values().cloned().collect()
	}

	/// Creates or replaces a project, stamping `updated` with `now`.
	pub fn update_project(&mut self, mut project: Project, now: u64) -> (Project, Change) {
		project.updated = now;
		let change = match self.projects.insert(project.id.clone(), project.clone()) {
			Some(_) => Change::ProjectUpdated(project.clone()),
			None => Change::ProjectCreated(project.clone()),
		};
		(project, change)
	}

	/// Removes a project. Removing an absent id changes nothing.
	pub fn delete_project(&mut self, id: &str) -> Option<Change> {
		self.projects
			.remove(id)
			.map(|_| Change::ProjectDeleted(id.to_string()))
	}

	/// Removes every project. Clearing an empty set changes nothing.
	pub fn clear_projects(&mut self) -> Option<Change> {
		if self.projects.is_empty() {
			return None;
		}
		self.projects.clear();
		Some(Change::ProjectsCleared)
	}
}

impl StateSnapshot {
	/// Runs one decoded operation against this snapshot.
	///
	/// Returns the response value and the changes made. Read operations never
	/// change the snapshot.
	///
	/// # Errors
	///
	/// [`WorkerError::Encode`] if the result cannot be represented as JSON.
	pub fn apply(&mut self, op: Operation, now: u64, history_limit: usize) -> Result<(Value, Vec<Change>), WorkerError> {
		let (value, changes) = match op {
			Operation::Ping => (Value::String("pong".into()), Vec::new()),
			Operation::AddUrlHistory { url } => {
				let (entry, changes) = self.add_url(&url, now, history_limit);
				(encode(&entry)?, changes)
			}
			Operation::QueryUrlHistory { q } => (encode(&self.query_urls(&q))?, Vec::new()),
			Operation::ListUrlHistory { limit } => (encode(&self.list_urls(limit))?, Vec::new()),
			Operation::DeleteUrlHistory { url } => deleted(self.delete_url(&url)),
			Operation::ClearUrlHistory => cleared(self.clear_urls()),
			Operation::ReadConfig { key } => (self.read_config(key.as_deref()), Vec::new()),
			Operation::UpdateConfig { key, value } => {
				let change = self.update_config(&key, value.clone());
				(value, change.into_iter().collect())
			}
			Operation::DeleteConfig { key } => deleted(self.delete_config(&key)),
			Operation::ReadProject { id } => (encode(&self.read_project(&id))?, Vec::new()),
			Operation::ListProjects => (encode(&self.list_projects())?, Vec::new()),
			Operation::UpdateProject { project } => {
				let (stored, change) = self.update_project(project, now);
				(encode(&stored)?, vec![change])
			}
			Operation::DeleteProject { id } => deleted(self.delete_project(&id)),
			Operation::ClearProjects => cleared(self.clear_projects()),
			Operation::ReadKv { key } => (self.read_kv(&key), Vec::new()),
			Operation::UpdateKv { key, value } => {
				let change = self.update_kv(&key, value.clone());
				(value, change.into_iter().collect())
			}
			Operation::DeleteKv { key } => deleted(self.delete_kv(&key)),
		};
		Ok((value, changes))
	}
}

/// Inserts `value` under `key`; false if it was already stored there.
fn write_entry(map: &mut Map<String, Value>, key: &str, value: Value) -> bool {
	if map.get(key) == Some(&value) {
		return false;
	}
	map.insert(key.to_string(), value);
	true
}

fn encode<T: Serialize>(value: &T) -> Result<Value, WorkerError> {
	serde_json::to_value(value).map_err(|err| WorkerError::Encode(err.to_string()))
}

fn deleted(change: Option<Change>) -> (Value, Vec<Change>) {
	(json!({ "deleted": change.is_some() }), change.into_iter().collect())
}

fn cleared(change: Option<Change>) -> (Value, Vec<Change>) {
	(json!({ "cleared": change.is_some() }), change.into_iter().collect())
}

#[cfg(test)]
mod tests {
	use pretty_assertions::assert_eq;

	use super::*;

	fn urls(entries: &[UrlHistoryEntry]) -> Vec<&str> {
		entries.iter().map(|e| e.url.as_str()).collect()
	}

	#[test]
	fn repeat_visit_bumps_existing_entry() {
		let mut state = StateSnapshot::default();
		let (first, changes) = state.add_url("https://a", 10, 500);
		assert_eq!(first.count, 1);
		assert!(matches!(changes.as_slice(), [Change::UrlCreated(_)]));

		let (second, changes) = state.add_url("https://a", 20, 500);
		assert_eq!(second.count, 2);
		assert_eq!(second.time, 20);
		assert!(matches!(changes.as_slice(), [Change::UrlUpdated(_)]));
		assert_eq!(state.history.len(), 1);
	}

	#[test]
	fn query_is_case_insensitive_and_newest_first() {
		let mut state = StateSnapshot::default();
		state.add_url("https://Example.com/a", 1, 500);
		state.add_url("https://other.org", 1, 500);
		state.add_url("https://example.com/b", 1, 500);

		assert_eq!(
			urls(&state.query_urls("EXAMPLE")),
			vec!["https://example.com/b", "https://Example.com/a"]
		);
	}

	#[test]
	fn revisit_moves_entry_to_front() {
		let mut state = StateSnapshot::default();
		state.add_url("https://a", 1, 500);
		state.add_url("https://b", 2, 500);
		state.add_url("https://a", 3, 500);
		assert_eq!(urls(&state.list_urls(None)), vec!["https://a", "https://b"]);
		assert_eq!(urls(&state.list_urls(Some(1))), vec!["https://a"]);
	}

	#[test]
	fn limit_evicts_least_recent() {
		let mut state = StateSnapshot::default();
		state.add_url("https://a", 1, 2);
		state.add_url("https://b", 2, 2);
		let (_, changes) = state.add_url("https://c", 3, 2);

		assert_eq!(urls(&state.list_urls(None)), vec!["https://c", "https://b"]);
		assert_eq!(changes.last(), Some(&Change::UrlDeleted("https://a".into())));
	}

	#[test]
	fn deleting_absent_entries_changes_nothing() {
		let mut state = StateSnapshot::default();
		assert_eq!(state.delete_url("https://nope"), None);
		assert_eq!(state.clear_urls(), None);
		assert_eq!(state.delete_config("nope"), None);
		assert_eq!(state.delete_project("nope"), None);
		assert_eq!(state.clear_projects(), None);
		assert_eq!(state, StateSnapshot::default());
	}

	#[test]
	fn same_config_value_is_not_a_change() {
		let mut state = StateSnapshot::default();
		assert!(state.update_config("theme", json!("dark")).is_some());
		assert_eq!(state.update_config("theme", json!("dark")), None);
		assert_eq!(state.read_config(Some("theme")), json!("dark"));
		assert_eq!(state.read_config(Some("missing")), Value::Null);
		assert_eq!(state.read_config(None), json!({ "theme": "dark" }));
	}

	#[test]
	fn kv_writes_notify_on_their_own_topic() {
		let mut state = StateSnapshot::default();
		let (value, changes) = state
			.apply(
				Operation::UpdateKv {
					key: "draft".into(),
					value: json!({ "body": "hi" }),
				},
				1,
				500,
			)
			.unwrap();
		assert_eq!(value, json!({ "body": "hi" }));
		let [change] = changes.as_slice() else {
			panic!("expected one change, got {changes:?}");
		};
		let n = change.to_notification();
		assert_eq!((n.topic.as_str(), n.kind()), (topic::KV, Some("update")));

		assert_eq!(state.update_kv("draft", json!({ "body": "hi" })), None);
		assert_eq!(state.read_kv("draft"), json!({ "body": "hi" }));
		assert_eq!(state.delete_kv("draft"), Some(Change::KvDeleted("draft".into())));
		assert_eq!(state.delete_kv("draft"), None);
		assert_eq!(state.read_kv("draft"), Value::Null);
		assert!(state.config.is_empty());
	}

	#[test]
	fn project_update_distinguishes_create_and_replace() {
		let mut state = StateSnapshot::default();
		let project = Project {
			id: "p1".into(),
			name: "API".into(),
			requests: vec![],
			updated: 0,
		};
		let (stored, change) = state.update_project(project.clone(), 5);
		assert_eq!(stored.updated, 5);
		assert!(matches!(change, Change::ProjectCreated(_)));

		let (_, change) = state.update_project(project, 6);
		assert!(matches!(change, Change::ProjectUpdated(_)));
		assert_eq!(state.read_project("p1").map(|p| p.updated), Some(6));
	}

	#[test]
	fn apply_reports_results_and_changes() {
		let mut state = StateSnapshot::default();
		let (value, changes) = state
			.apply(Operation::AddUrlHistory { url: "https://a".into() }, 7, 500)
			.unwrap();
		assert_eq!(value["count"], json!(1));
		assert_eq!(changes.len(), 1);

		let (value, changes) = state
			.apply(Operation::DeleteUrlHistory { url: "https://zzz".into() }, 8, 500)
			.unwrap();
		assert_eq!(value, json!({ "deleted": false }));
		assert!(changes.is_empty());

		let (value, _) = state
			.apply(Operation::ReadProject { id: "none".into() }, 9, 500)
			.unwrap();
		assert_eq!(value, Value::Null);
	}

	#[test]
	fn notifications_carry_topic_and_kind() {
		let n = Change::UrlDeleted("https://a".into()).to_notification();
		assert_eq!(n.topic, topic::URL_HISTORY);
		assert_eq!(n.kind(), Some("delete"));
		assert_eq!(n.payload["url"], json!("https://a"));

		let n = Change::ProjectsCleared.to_notification();
		assert_eq!(n.topic, topic::PROJECT);
		assert_eq!(n.kind(), Some("clear"));
	}
}
