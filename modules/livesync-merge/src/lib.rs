//! Partial-update algebra over JSON objects.
//!
//! A [`Delta`] is either a full replacement or an update/delete patch.
//! [`fold`] applies one to a state; [`compose`] pre-merges two deltas so that
//! `fold(fold(s, a), b) == fold(s, compose(a, b))`. Composition is associative
//! with `Delta::default()` as identity, so queues of pending writes can be
//! collapsed before they are applied or sent.

pub mod delta;

pub use delta::{compose, compose_all, fold, Delta, JsonObject};
