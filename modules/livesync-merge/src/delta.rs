use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

pub type JsonObject = Map<String, Value>;

/// A write against a JSON object.
///
/// Serialized as `{"data": {...}}` for a replacement or
/// `{"update": {...}, "delete": [...]}` for a patch (both fields optional).
/// Any other key is rejected.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged, deny_unknown_fields)]
pub enum Delta {
    Replace {
        data: JsonObject,
    },
    Patch {
        #[serde(default)]
        update: JsonObject,
        #[serde(default)]
        delete: BTreeSet<String>,
    },
}

impl Default for Delta {
    /// The identity: changes nothing.
    fn default() -> Self {
        Delta::Patch {
            update: JsonObject::new(),
            delete: BTreeSet::new(),
        }
    }
}

impl Delta {
    pub fn replace(data: JsonObject) -> Self {
        Delta::Replace { data }
    }

    pub fn patch(update: JsonObject, delete: impl IntoIterator<Item = String>) -> Self {
        Delta::Patch {
            update,
            delete: delete.into_iter().collect(),
        }
    }

    /// Patch that sets a single key.
    pub fn set(key: impl Into<String>, value: Value) -> Self {
        let mut update = JsonObject::new();
        update.insert(key.into(), value);
        Self::patch(update, [])
    }

    /// Patch that removes a single key.
    pub fn remove(key: impl Into<String>) -> Self {
        Self::patch(JsonObject::new(), [key.into()])
    }

    /// The minimal patch turning `before` into `after`.
    pub fn diff(before: &JsonObject, after: &JsonObject) -> Self {
        let update = after
            .iter()
            .filter(|(k, v)| before.get(*k) != Some(*v))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        let delete = before
            .keys()
            .filter(|k| !after.contains_key(*k))
            .cloned()
            .collect();
        Delta::Patch { update, delete }
    }

    pub fn is_identity(&self) -> bool {
        matches!(self, Delta::Patch { update, delete } if update.is_empty() && delete.is_empty())
    }

    /// Same effect, with keys present in both `update` and `delete` dropped
    /// from `update` (delete wins inside a single delta).
    pub fn normalized(&self) -> Self {
        match self {
            Delta::Replace { .. } => self.clone(),
            Delta::Patch { update, delete } => Delta::Patch {
                update: update
                    .iter()
                    .filter(|(k, _)| !delete.contains(*k))
                    .map(|(k, v)| (k.clone(), v.clone()))
                    .collect(),
                delete: delete.clone(),
            },
        }
    }

    pub fn apply(&self, state: &JsonObject) -> JsonObject {
        fold(state, self)
    }

    pub fn then(&self, next: &Delta) -> Delta {
        compose(self, next)
    }
}

/// Apply `delta` to `state`.
pub fn fold(state: &JsonObject, delta: &Delta) -> JsonObject {
    match delta {
        Delta::Replace { data } => data.clone(),
        Delta::Patch { update, delete } => {
            let mut next = state.clone();
            for (k, v) in update {
                next.insert(k.clone(), v.clone());
            }
            for k in delete {
                next.remove(k);
            }
            next
        }
    }
}

/// Combine `a` then `b` into one delta.
///
/// A later update of a key cancels an earlier pending delete of it. The result
/// is normalized: its `update` and `delete` never share a key.
pub fn compose(a: &Delta, b: &Delta) -> Delta {
    match (a.normalized(), b.normalized()) {
        (_, b @ Delta::Replace { .. }) => b,
        (Delta::Replace { data }, b) => Delta::Replace {
            data: fold(&data, &b),
        },
        (
            Delta::Patch {
                update: mut update,
                delete: a_delete,
            },
            Delta::Patch {
                update: b_update,
                delete: b_delete,
            },
        ) => {
            update.retain(|k, _| !b_delete.contains(k));
            let mut delete: BTreeSet<String> = a_delete
                .into_iter()
                .filter(|k| !b_update.contains_key(k))
                .collect();
            delete.extend(b_delete);
            for (k, v) in b_update {
                update.insert(k, v);
            }
            Delta::Patch { update, delete }
        }
    }
}

/// Compose a sequence of deltas left to right.
pub fn compose_all<'a, I>(deltas: I) -> Delta
where
    I: IntoIterator<Item = &'a Delta>,
{
    deltas
        .into_iter()
        .fold(Delta::default(), |acc, next| compose(&acc, next))
}
