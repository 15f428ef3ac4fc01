//! Live queries: a consistent snapshot followed by values derived from bus events.
//!
//! Subscriptions are opened before the snapshot is read, so nothing that
//! happens between the read and the subscription can be missed.

pub mod live_query;
pub mod throttle;

pub use live_query::LiveQuery;
pub use throttle::{throttle, throttle_by_key};
