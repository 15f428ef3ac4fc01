//! Topic-keyed publish/subscribe contract.
//!
//! The transport itself (Redis, NATS, ...) lives behind the [`PubSub`] trait.
//! [`MemoryPubSub`] delivers in-process and is what tests and single-node
//! deployments use.

pub mod bus;
pub mod channel;
pub mod memory;
pub mod types;

pub use bus::{EventHandler, PubSub};
pub use channel::channel_name;
pub use memory::MemoryPubSub;
pub use types::{PubSubEvent, SubscriptionId, Topic, TopicName};
