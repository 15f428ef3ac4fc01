//! Normalized client-side thread store.
//!
//! State lives in an immutable [`ThreadsState`] behind an `Arc`. Every change
//! goes through [`reduce`], which returns a new `Arc` only when something
//! actually changed. Threads that an action does not touch keep their `Arc`,
//! so consumers can detect changes with `Arc::ptr_eq`.

pub mod actions;
pub mod feed;
pub mod filter;
pub mod reducer;
pub mod state;
pub mod store;
pub mod types;

pub use actions::{MarkThreadsSeen, ThreadsAction};
pub use feed::{follow, ThreadEvent};
pub use filter::{thread_matches, LocationFilter, ResolvedStatus, ThreadFilter, ViewerFilter};
pub use reducer::reduce;
pub use state::{externalize_id, extract_internal_id, ThreadsLocation, ThreadsState};
pub use store::ThreadStore;
pub use types::{MessageFragment, MessageType, ThreadData, Viewer};
