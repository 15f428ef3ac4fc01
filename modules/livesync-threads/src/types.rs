//! Thread and message records as held by the store.

use chrono::{DateTime, Utc};
use livesync_merge::JsonObject;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageType {
    UserMessage,
    ActionMessage,
}

/// The subset of a message the store needs for bookkeeping.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageFragment {
    pub id: String,
    #[serde(rename = "externalID")]
    pub external_id: String,
    #[serde(rename = "type")]
    pub message_type: MessageType,
    #[serde(rename = "authorExternalID", default)]
    pub author_external_id: Option<String>,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub deleted_timestamp: Option<DateTime<Utc>>,
    #[serde(default)]
    pub seen: bool,
    #[serde(default)]
    pub reaction_count: u32,
}

impl MessageFragment {
    pub fn is_deleted(&self) -> bool {
        self.deleted_timestamp.is_some()
    }
}

/// A thread with its loaded messages and derived counters.
///
/// Counters cover the whole thread, including the `older_messages_count`
/// messages that have not been loaded yet:
/// `all_messages_count == messages.len() + older_messages_count`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ThreadData {
    pub id: String,
    #[serde(rename = "externalID")]
    pub external_id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub location: JsonObject,
    #[serde(default)]
    pub metadata: JsonObject,
    #[serde(default)]
    pub resolved: bool,
    #[serde(default)]
    pub subscribed: bool,
    pub messages: Vec<MessageFragment>,
    pub all_messages_count: u32,
    pub user_messages_count: u32,
    pub action_messages_count: u32,
    pub messages_count_excluding_deleted: u32,
    pub reply_count: u32,
    pub new_messages_count: u32,
    pub new_reactions_count: u32,
    #[serde(default)]
    pub older_messages_count: u32,
    #[serde(rename = "firstUnseenMessageID", default)]
    pub first_unseen_message_id: Option<String>,
    pub has_new_messages: bool,
    pub viewer_is_thread_participant: bool,
}

impl ThreadData {
    /// A fully loaded thread whose counters are derived from `messages`.
    pub fn from_messages(
        id: impl Into<String>,
        external_id: impl Into<String>,
        messages: Vec<MessageFragment>,
    ) -> Self {
        let mut thread = Self {
            id: id.into(),
            external_id: external_id.into(),
            name: String::new(),
            location: JsonObject::new(),
            metadata: JsonObject::new(),
            resolved: false,
            subscribed: false,
            messages,
            all_messages_count: 0,
            user_messages_count: 0,
            action_messages_count: 0,
            messages_count_excluding_deleted: 0,
            reply_count: 0,
            new_messages_count: 0,
            new_reactions_count: 0,
            older_messages_count: 0,
            first_unseen_message_id: None,
            has_new_messages: false,
            viewer_is_thread_participant: false,
        };
        thread.recount();
        thread
    }

    /// Recompute every counter from the loaded messages plus `older_messages_count`.
    pub fn recount(&mut self) {
        let count = |pred: &dyn Fn(&MessageFragment) -> bool| {
            self.messages.iter().filter(|m| pred(m)).count() as u32
        };

        let loaded = self.messages.len() as u32;
        let user = count(&|m| m.message_type == MessageType::UserMessage);
        let action = count(&|m| m.message_type == MessageType::ActionMessage);
        let live = count(&|m| !m.is_deleted());
        let unseen = count(&|m| !m.seen);
        let first_unseen = self.messages.iter().find(|m| !m.seen).map(|m| m.id.clone());

        self.all_messages_count = loaded + self.older_messages_count;
        self.user_messages_count = user;
        self.action_messages_count = action;
        self.messages_count_excluding_deleted = live;
        self.reply_count = self.all_messages_count.saturating_sub(1);
        self.new_messages_count = unseen;
        self.has_new_messages = unseen > 0;
        self.first_unseen_message_id = first_unseen;
    }

    /// Total reactions across the loaded messages.
    pub fn total_reactions(&self) -> u32 {
        self.messages.iter().map(|m| m.reaction_count).sum()
    }

    pub fn message(&self, message_id: &str) -> Option<&MessageFragment> {
        self.messages.iter().find(|m| m.id == message_id)
    }

    pub fn first_message(&self) -> Option<&MessageFragment> {
        self.messages.first()
    }
}

/// Who is looking at the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Viewer {
    #[serde(rename = "userID")]
    pub user_id: String,
    #[serde(rename = "externalUserID")]
    pub external_user_id: String,
}
