//! Core pub/sub types. Transport-agnostic.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// What happened. The closed set of event names flowing through the bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TopicName {
    ThreadCreated,
    ThreadDeleted,
    ThreadMessageAdded,
    ThreadMessageUpdated,
    ThreadMessageRemoved,
    ThreadPropertiesUpdated,
    ThreadParticipantsUpdated,
    InboxUpdated,
    UserPreferenceUpdated,
    NotificationAdded,
    PubSubHealthCheck,
}

impl TopicName {
    pub fn as_str(&self) -> &'static str {
        match self {
            TopicName::ThreadCreated => "thread-created",
            TopicName::ThreadDeleted => "thread-deleted",
            TopicName::ThreadMessageAdded => "thread-message-added",
            TopicName::ThreadMessageUpdated => "thread-message-updated",
            TopicName::ThreadMessageRemoved => "thread-message-removed",
            TopicName::ThreadPropertiesUpdated => "thread-properties-updated",
            TopicName::ThreadParticipantsUpdated => "thread-participants-updated",
            TopicName::InboxUpdated => "inbox-updated",
            TopicName::UserPreferenceUpdated => "user-preference-updated",
            TopicName::NotificationAdded => "notification-added",
            TopicName::PubSubHealthCheck => "pub-sub-health-check",
        }
    }
}

impl fmt::Display for TopicName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A subscribable channel: event name plus routing key.
///
/// The routing key is a JSON object (e.g. `{"threadID": "..."}`) so that one
/// event name fans out into one channel per entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Topic {
    pub name: TopicName,
    pub args: Value,
}

impl Topic {
    pub fn new(name: TopicName, args: Value) -> Self {
        Self { name, args }
    }

    /// Topic routed by thread, e.g. `thread-message-added` for one thread.
    pub fn thread(name: TopicName, thread_id: impl Into<String>) -> Self {
        Self::new(name, json!({ "threadID": thread_id.into() }))
    }

    /// Topic routed by user, e.g. `inbox-updated` for one viewer.
    pub fn user(name: TopicName, user_id: impl Into<String>) -> Self {
        Self::new(name, json!({ "userID": user_id.into() }))
    }

    /// Topic with no routing key.
    pub fn global(name: TopicName) -> Self {
        Self::new(name, Value::Null)
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.name, self.args)
    }
}

/// An event instance as delivered to subscribers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PubSubEvent {
    pub name: TopicName,
    pub args: Value,
    pub payload: Value,
}

impl PubSubEvent {
    pub fn new(topic: &Topic, payload: Value) -> Self {
        Self {
            name: topic.name,
            args: topic.args.clone(),
            payload,
        }
    }

    pub fn topic(&self) -> Topic {
        Topic::new(self.name, self.args.clone())
    }
}

/// Handle returned by `subscribe`, passed back to `unsubscribe`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(pub u64);

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sub-{}", self.0)
    }
}
