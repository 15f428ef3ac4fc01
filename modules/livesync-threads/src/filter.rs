//! Thread list filters, matched client-side against cached threads.

use livesync_merge::JsonObject;
use serde::{Deserialize, Serialize};

use crate::types::{ThreadData, Viewer};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolvedStatus {
    #[default]
    Any,
    Resolved,
    Unresolved,
}

/// Relationship the viewer must have with a thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ViewerFilter {
    Subscribed,
    Participating,
    Authored,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocationFilter {
    pub value: JsonObject,
    /// Match threads whose location contains `value` rather than equals it.
    #[serde(default)]
    pub partial_match: bool,
}

/// Conjunction of optional constraints. The default filter matches every thread.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ThreadFilter {
    #[serde(default)]
    pub location: Option<LocationFilter>,
    /// Every listed key must be present with an equal value.
    #[serde(default)]
    pub metadata: Option<JsonObject>,
    #[serde(default)]
    pub resolved_status: ResolvedStatus,
    #[serde(default)]
    pub viewer: Vec<ViewerFilter>,
}

pub fn thread_matches(thread: &ThreadData, viewer: &Viewer, filter: &ThreadFilter) -> bool {
    if let Some(location) = &filter.location {
        let matched = if location.partial_match {
            contains_all(&thread.location, &location.value)
        } else {
            thread.location == location.value
        };
        if !matched {
            return false;
        }
    }

    if let Some(metadata) = &filter.metadata {
        if !contains_all(&thread.metadata, metadata) {
            return false;
        }
    }

    let resolved_ok = match filter.resolved_status {
        ResolvedStatus::Any => true,
        ResolvedStatus::Resolved => thread.resolved,
        ResolvedStatus::Unresolved => !thread.resolved,
    };
    if !resolved_ok {
        return false;
    }

    filter.viewer.iter().all(|relation| match relation {
        ViewerFilter::Subscribed => thread.subscribed,
        ViewerFilter::Participating => thread.viewer_is_thread_participant,
        ViewerFilter::Authored => thread
            .first_message()
            .and_then(|m| m.author_external_id.as_deref())
            == Some(viewer.external_user_id.as_str()),
    })
}

fn contains_all(haystack: &JsonObject, needle: &JsonObject) -> bool {
    needle.iter().all(|(k, v)| haystack.get(k) == Some(v))
}
