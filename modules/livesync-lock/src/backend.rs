use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use tokio::time::Instant;

/// Keyed lease store. Every call covers a whole set of names at once and is
/// identified by the holder's token.
#[async_trait]
pub trait LockBackend: Send + Sync {
    /// Take every name for `ttl`, or none of them. Expired leases are free.
    async fn try_acquire(&self, names: &[String], token: &str, ttl: Duration) -> Result<bool>;

    /// Extend leases still held by `token`. `false` means at least one was lost.
    async fn renew(&self, names: &[String], token: &str, ttl: Duration) -> Result<bool>;

    /// Drop leases held by `token`. Names held by someone else are untouched.
    async fn release(&self, names: &[String], token: &str) -> Result<()>;
}

struct Lease {
    token: String,
    expires_at: Instant,
}

impl Lease {
    fn live(&self, now: Instant) -> bool {
        self.expires_at > now
    }
}

/// In-process backend. Serializes sections within one process only.
#[derive(Default)]
pub struct MemoryLockBackend {
    leases: Mutex<HashMap<String, Lease>>,
}

impl MemoryLockBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Names currently held by a live lease.
    pub fn held(&self) -> Vec<String> {
        let now = Instant::now();
        let mut names: Vec<String> = self
            .leases()
            .iter()
            .filter(|(_, lease)| lease.live(now))
            .map(|(name, _)| name.clone())
            .collect();
        names.sort();
        names
    }

    fn leases(&self) -> MutexGuard<'_, HashMap<String, Lease>> {
        self.leases
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl LockBackend for MemoryLockBackend {
    async fn try_acquire(&self, names: &[String], token: &str, ttl: Duration) -> Result<bool> {
        let now = Instant::now();
        let mut leases = self.leases();

        let blocked = names.iter().any(|name| {
            leases
                .get(name)
                .is_some_and(|lease| lease.live(now) && lease.token != token)
        });
        if blocked {
            return Ok(false);
        }

        for name in names {
            leases.insert(
                name.clone(),
                Lease {
                    token: token.to_string(),
                    expires_at: now + ttl,
                },
            );
        }
        Ok(true)
    }

    async fn renew(&self, names: &[String], token: &str, ttl: Duration) -> Result<bool> {
        let now = Instant::now();
        let mut leases = self.leases();

        let held = names.iter().all(|name| {
            leases
                .get(name)
                .is_some_and(|lease| lease.live(now) && lease.token == token)
        });
        if !held {
            return Ok(false);
        }

        for name in names {
            if let Some(lease) = leases.get_mut(name) {
                lease.expires_at = now + ttl;
            }
        }
        Ok(true)
    }

    async fn release(&self, names: &[String], token: &str) -> Result<()> {
        let mut leases = self.leases();
        for name in names {
            if leases.get(name).is_some_and(|lease| lease.token == token) {
                leases.remove(name);
            }
        }
        Ok(())
    }
}
