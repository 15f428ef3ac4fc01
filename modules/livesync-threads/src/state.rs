//! The normalized store state and its read-side selectors.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::types::ThreadData;

/// Prefix marking an internal thread ID passed where an external ID is expected.
pub const INTERNAL_ID_PREFIX: &str = "internal:";

/// Expose an internal ID through an external-ID-shaped handle.
pub fn externalize_id(id: &str) -> String {
    format!("{INTERNAL_ID_PREFIX}{id}")
}

/// Inverse of [`externalize_id`]; `None` for genuine external IDs.
pub fn extract_internal_id(external_id: &str) -> Option<&str> {
    external_id
        .strip_prefix(INTERNAL_ID_PREFIX)
        .filter(|id| !id.is_empty())
}

/// Where the store's threads are shown. Affects nothing in the reducer itself.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ThreadsLocation {
    Chat,
    Inbox,
    #[default]
    Elsewhere,
}

/// Normalized thread cache.
///
/// Invariants, maintained by every reducer transition:
/// - `thread_ids` holds each key of `threads_data` exactly once.
/// - every value of `external_id_map` and `message_external_id_map` is a key of
///   `threads_data`, and `external_id_map` maps each thread's external ID to it.
/// - `local_only_thread_ids` is a subset of `thread_ids`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ThreadsState {
    pub location: ThreadsLocation,
    /// Display order.
    pub thread_ids: Vec<String>,
    pub threads_data: HashMap<String, Arc<ThreadData>>,
    /// External thread ID to internal thread ID.
    pub external_id_map: HashMap<String, String>,
    /// Optimistic threads the server has not confirmed yet.
    pub local_only_thread_ids: HashSet<String>,
    /// External message ID to the internal ID of its thread.
    pub message_external_id_map: HashMap<String, String>,
    pub draft_message_in_composer: bool,
}

impl ThreadsState {
    pub fn new(location: ThreadsLocation) -> Self {
        Self {
            location,
            ..Default::default()
        }
    }

    pub fn thread(&self, thread_id: &str) -> Option<&Arc<ThreadData>> {
        self.threads_data.get(thread_id)
    }

    /// Look a thread up by external ID, or by an externalized internal ID.
    pub fn thread_by_external_id(&self, external_id: &str) -> Option<&Arc<ThreadData>> {
        if let Some(internal) = extract_internal_id(external_id) {
            return self.threads_data.get(internal);
        }
        self.external_id_map
            .get(external_id)
            .and_then(|id| self.threads_data.get(id))
    }

    pub fn thread_by_external_message_id(&self, external_message_id: &str) -> Option<&Arc<ThreadData>> {
        self.message_external_id_map
            .get(external_message_id)
            .and_then(|id| self.threads_data.get(id))
    }

    /// Threads in display order.
    pub fn threads(&self) -> impl Iterator<Item = &Arc<ThreadData>> {
        self.thread_ids
            .iter()
            .filter_map(|id| self.threads_data.get(id))
    }

    pub fn thread_ids_with_undeleted_messages(&self) -> Vec<String> {
        self.threads()
            .filter(|t| t.messages_count_excluding_deleted > 0)
            .map(|t| t.id.clone())
            .collect()
    }

    pub fn thread_ids_with_messages_including_deleted(&self) -> Vec<String> {
        self.threads()
            .filter(|t| t.all_messages_count > 0)
            .map(|t| t.id.clone())
            .collect()
    }

    pub fn resolved_thread_ids(&self) -> HashSet<String> {
        self.threads()
            .filter(|t| t.resolved)
            .map(|t| t.id.clone())
            .collect()
    }

    pub fn is_local_only(&self, thread_id: &str) -> bool {
        self.local_only_thread_ids.contains(thread_id)
    }

    /// Describe every broken invariant. Empty when the state is consistent.
    pub fn invariant_violations(&self) -> Vec<String> {
        let mut problems = Vec::new();

        let unique: HashSet<&String> = self.thread_ids.iter().collect();
        if unique.len() != self.thread_ids.len() {
            problems.push("thread_ids contains duplicates".to_string());
        }
        if unique.len() != self.threads_data.len()
            || !self.threads_data.keys().all(|id| unique.contains(id))
        {
            problems.push("thread_ids does not match threads_data".to_string());
        }

        for (external, id) in &self.external_id_map {
            match self.threads_data.get(id) {
                None => problems.push(format!("external ID {external} points at missing thread {id}")),
                Some(thread) if &thread.external_id != external => problems.push(format!(
                    "external ID {external} points at thread {id} whose external ID is {}",
                    thread.external_id
                )),
                Some(_) => {}
            }
        }
        for thread in self.threads_data.values() {
            if self.external_id_map.get(&thread.external_id) != Some(&thread.id) {
                problems.push(format!("thread {} missing from external_id_map", thread.id));
            }
        }

        for (external, id) in &self.message_external_id_map {
            if !self.threads_data.contains_key(id) {
                problems.push(format!("message {external} points at missing thread {id}"));
            }
        }

        for id in &self.local_only_thread_ids {
            if !self.threads_data.contains_key(id) {
                problems.push(format!("local-only thread {id} is missing"));
            }
        }

        problems
    }
}
