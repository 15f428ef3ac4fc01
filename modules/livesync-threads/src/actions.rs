//! The closed set of state transitions.

use livesync_merge::{Delta, JsonObject};

use crate::filter::ThreadFilter;
use crate::types::{MessageFragment, ThreadData, Viewer};

#[derive(Debug, Clone, PartialEq)]
pub struct MarkThreadsSeen {
    /// Restrict to one thread; `None` applies to every matching thread.
    pub external_thread_id: Option<String>,
    pub viewer: Viewer,
    pub filter: ThreadFilter,
    pub seen: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ThreadsAction {
    /// Upsert a server-confirmed thread, superseding any optimistic
    /// placeholder bound to the same external ID.
    MergeThread { thread: ThreadData },

    /// Drop one message; a thread losing its last message is dropped too.
    RemoveMessage { thread_id: String, message_id: String },

    MarkThreadsSeen(MarkThreadsSeen),

    /// Create an optimistic, local-only thread holding its first message.
    AddThread {
        new_thread_id: String,
        external_id: String,
        name: String,
        location: JsonObject,
        message: MessageFragment,
    },

    RemoveThread { thread_id: String },

    /// Upsert one message. `is_new_message` distinguishes a freshly posted
    /// message from a backfilled older one that the counters already include.
    MergeMessage {
        thread_id: String,
        message: MessageFragment,
        viewer_is_author: bool,
        is_new_message: bool,
    },

    /// Replace a message that is already loaded. Unknown messages are ignored.
    UpdateMessage {
        thread_id: String,
        message: MessageFragment,
    },

    /// Reorder threads. Unknown IDs are ignored, omitted ones keep their relative order at the end.
    SetThreadIds { thread_ids: Vec<String> },

    SetProperties {
        thread_id: String,
        name: Option<String>,
        resolved: Option<bool>,
        metadata: Option<Delta>,
    },

    SetSubscribed { thread_id: String, subscribed: bool },

    SetDraftMessageInComposer { draft: bool },
}

impl ThreadsAction {
    pub fn name(&self) -> &'static str {
        match self {
            ThreadsAction::MergeThread { .. } => "merge_thread",
            ThreadsAction::RemoveMessage { .. } => "remove_message",
            ThreadsAction::MarkThreadsSeen(_) => "mark_threads_seen",
            ThreadsAction::AddThread { .. } => "add_thread",
            ThreadsAction::RemoveThread { .. } => "remove_thread",
            ThreadsAction::MergeMessage { .. } => "merge_message",
            ThreadsAction::UpdateMessage { .. } => "update_message",
            ThreadsAction::SetThreadIds { .. } => "set_thread_ids",
            ThreadsAction::SetProperties { .. } => "set_properties",
            ThreadsAction::SetSubscribed { .. } => "set_subscribed",
            ThreadsAction::SetDraftMessageInComposer { .. } => "set_draft_message_in_composer",
        }
    }
}
