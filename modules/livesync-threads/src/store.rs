use std::sync::Arc;

use tokio::sync::watch;
use tracing::debug;

use crate::actions::{MarkThreadsSeen, ThreadsAction};
use crate::filter::ThreadFilter;
use crate::reducer::reduce;
use crate::state::{ThreadsLocation, ThreadsState};
use crate::types::Viewer;

/// Owns the current [`ThreadsState`] and applies actions to it in dispatch order.
///
/// Each dispatch runs the reducer to completion while holding the watch
/// channel's lock, so no reader or other dispatcher sees a half-applied
/// action. Subscribers from [`ThreadStore::watch`] are woken only when the
/// state actually changed.
pub struct ThreadStore {
    tx: watch::Sender<Arc<ThreadsState>>,
}

impl ThreadStore {
    pub fn new(location: ThreadsLocation) -> Self {
        Self::from_state(ThreadsState::new(location))
    }

    pub fn from_state(state: ThreadsState) -> Self {
        let (tx, _rx) = watch::channel(Arc::new(state));
        Self { tx }
    }

    /// Apply one action. Returns whether the state changed.
    pub fn dispatch(&self, action: ThreadsAction) -> bool {
        let name = action.name();
        let changed = self.tx.send_if_modified(|current| {
            let next = reduce(current, action);
            if Arc::ptr_eq(current, &next) {
                return false;
            }
            *current = next;
            true
        });
        debug!(action = name, changed, "Dispatched");
        changed
    }

    /// Snapshot of the current state.
    pub fn state(&self) -> Arc<ThreadsState> {
        Arc::clone(&self.tx.borrow())
    }

    /// Receiver that observes every state change after this call.
    pub fn watch(&self) -> watch::Receiver<Arc<ThreadsState>> {
        self.tx.subscribe()
    }

    /// Mark one thread, addressed by external ID, as seen or unseen.
    pub fn mark_thread_seen(&self, external_thread_id: &str, viewer: &Viewer, seen: bool) -> bool {
        self.dispatch(ThreadsAction::MarkThreadsSeen(MarkThreadsSeen {
            external_thread_id: Some(external_thread_id.to_string()),
            viewer: viewer.clone(),
            filter: ThreadFilter::default(),
            seen,
        }))
    }
}

impl Default for ThreadStore {
    fn default() -> Self {
        Self::new(ThreadsLocation::default())
    }
}
