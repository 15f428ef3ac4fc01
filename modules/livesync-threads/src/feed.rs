//! Server push events and the glue that feeds them into a [`ThreadStore`].

use anyhow::Result;
use futures::{Stream, StreamExt};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::actions::ThreadsAction;
use crate::store::ThreadStore;
use crate::types::{MessageFragment, ThreadData};

/// One change pushed by the server for a subscribed thread.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ThreadEvent {
    ThreadUpdated {
        thread: ThreadData,
    },
    ThreadDeleted {
        #[serde(rename = "threadID")]
        thread_id: String,
    },
    MessageAdded {
        #[serde(rename = "threadID")]
        thread_id: String,
        message: MessageFragment,
        #[serde(rename = "viewerIsAuthor", default)]
        viewer_is_author: bool,
    },
    MessageUpdated {
        #[serde(rename = "threadID")]
        thread_id: String,
        message: MessageFragment,
    },
    MessageRemoved {
        #[serde(rename = "threadID")]
        thread_id: String,
        #[serde(rename = "messageID")]
        message_id: String,
    },
}

impl ThreadEvent {
    pub fn into_action(self) -> ThreadsAction {
        match self {
            ThreadEvent::ThreadUpdated { thread } => ThreadsAction::MergeThread { thread },
            ThreadEvent::ThreadDeleted { thread_id } => ThreadsAction::RemoveThread { thread_id },
            ThreadEvent::MessageAdded {
                thread_id,
                message,
                viewer_is_author,
            } => ThreadsAction::MergeMessage {
                thread_id,
                message,
                viewer_is_author,
                is_new_message: true,
            },
            ThreadEvent::MessageUpdated { thread_id, message } => {
                ThreadsAction::UpdateMessage { thread_id, message }
            }
            ThreadEvent::MessageRemoved {
                thread_id,
                message_id,
            } => ThreadsAction::RemoveMessage {
                thread_id,
                message_id,
            },
        }
    }
}

/// Dispatch every event from `events` into `store` until the stream ends.
///
/// Returns how many events changed the state. The first stream error stops
/// the loop and is returned; events before it stay applied.
pub async fn follow<S>(store: &ThreadStore, events: S) -> Result<usize>
where
    S: Stream<Item = Result<ThreadEvent>>,
{
    let mut events = std::pin::pin!(events);
    let mut received = 0usize;
    let mut applied = 0usize;

    while let Some(event) = events.next().await {
        let event = match event {
            Ok(event) => event,
            Err(e) => {
                warn!(error = %e, received, "Thread feed failed");
                return Err(e);
            }
        };
        received += 1;
        if store.dispatch(event.into_action()) {
            applied += 1;
        }
    }

    info!(received, applied, "Thread feed ended");
    Ok(applied)
}
