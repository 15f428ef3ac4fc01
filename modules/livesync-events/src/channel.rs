//! Channel naming. A topic maps to exactly one transport channel string.

use serde_json::json;
use sha2::{Digest, Sha256};

use crate::types::Topic;

/// Stable channel name for a topic, never longer than `max_len` characters.
///
/// The name is the key-sorted JSON of `{name, args}`. Names over the limit are
/// prefixed with the hex SHA-256 of the full name (keeping them distinct) and
/// then truncated.
pub fn channel_name(topic: &Topic, max_len: usize) -> String {
    // serde_json objects are BTreeMap-backed, so keys serialize sorted.
    let channel = json!({ "name": topic.name, "args": topic.args }).to_string();
    if channel.chars().count() <= max_len {
        return channel;
    }

    let digest = hex::encode(Sha256::digest(channel.as_bytes()));
    format!("{digest}:{channel}").chars().take(max_len).collect()
}
