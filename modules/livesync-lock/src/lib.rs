//! Named mutual exclusion across cooperating processes.
//!
//! [`MutationLock::with_lock`] runs a critical section while holding every
//! requested name, renewing the lease in the background and releasing it when
//! the section finishes.

pub mod backend;
pub mod error;
pub mod lock;
pub mod postgres;

pub use backend::{LockBackend, MemoryLockBackend};
pub use error::LockError;
pub use lock::{AbortCheck, MutationLock};
pub use postgres::PgLockBackend;
