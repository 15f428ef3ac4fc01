pub mod config;
pub mod error;

pub use config::{Config, LockConfig, PubSubConfig};
pub use error::LiveSyncError;
