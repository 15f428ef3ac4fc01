use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use livesync_common::LockConfig;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::backend::{LockBackend, MemoryLockBackend};
use crate::error::LockError;

/// Cooperative signal handed to a critical section.
///
/// Call [`AbortCheck::check`] after a suspension point to fail fast once a
/// lease renewal has failed. Loss is best effort: the lease may already have
/// expired before the renewal task notices.
#[derive(Debug, Clone)]
pub struct AbortCheck {
    names: Arc<[String]>,
    aborted: Arc<AtomicBool>,
}

impl AbortCheck {
    pub fn is_aborted(&self) -> bool {
        self.aborted.load(Ordering::SeqCst)
    }

    pub fn check(&self) -> Result<(), LockError> {
        if self.is_aborted() {
            return Err(LockError::Lost {
                names: self.names.to_vec(),
            });
        }
        Ok(())
    }
}

/// Runs critical sections under named leases from a [`LockBackend`].
#[derive(Clone)]
pub struct MutationLock {
    backend: Arc<dyn LockBackend>,
    config: LockConfig,
}

impl MutationLock {
    pub fn new(backend: Arc<dyn LockBackend>, config: LockConfig) -> Self {
        Self { backend, config }
    }

    /// Lock that only coordinates sections within this process.
    pub fn in_memory(config: LockConfig) -> Self {
        Self::new(Arc::new(MemoryLockBackend::new()), config)
    }

    pub fn config(&self) -> &LockConfig {
        &self.config
    }

    /// Run `section` while holding every name in `names`.
    ///
    /// Fails with [`LockError::NotAcquired`] without running the section if
    /// the names stay taken through every retry. The section's own result is
    /// returned unchanged; the lease is released either way.
    pub async fn with_lock<I, S, F, Fut, T, E>(&self, names: I, section: F) -> Result<T, E>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
        F: FnOnce(AbortCheck) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: From<LockError>,
    {
        let names = normalize(names);
        if names.is_empty() {
            return Err(LockError::NoNames.into());
        }
        let token = Uuid::new_v4().to_string();

        self.acquire(&names, &token).await?;
        let lease = Lease {
            backend: self.backend.clone(),
            names: names.clone(),
            token: token.clone(),
            held: true,
        };

        let aborted = Arc::new(AtomicBool::new(false));
        let renewal = RenewalTask(tokio::spawn(renew_until_lost(
            self.backend.clone(),
            names.clone(),
            token.clone(),
            self.config.clone(),
            aborted.clone(),
        )));

        let check = AbortCheck {
            names: names.clone().into(),
            aborted,
        };
        let result = section(check).await;

        drop(renewal);

        // Always release lock
        lease.release().await;

        result
    }

    async fn acquire(&self, names: &[String], token: &str) -> Result<(), LockError> {
        let attempts = self.config.retry_count.saturating_add(1);

        for attempt in 1..=attempts {
            if self.backend.try_acquire(names, token, self.config.ttl).await? {
                debug!(names = ?names, attempt, "Lock acquired");
                return Ok(());
            }
            if attempt < attempts {
                tokio::time::sleep(self.config.retry_delay).await;
            }
        }

        info!(names = ?names, attempts, "Lock held elsewhere, giving up");
        Err(LockError::NotAcquired {
            names: names.to_vec(),
            attempts,
        })
    }
}

/// Sorted, deduplicated lock names. Sorting keeps multi-name acquisition
/// order identical across callers.
fn normalize<I, S>(names: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    let mut names: Vec<String> = names.into_iter().map(Into::into).collect();
    names.sort();
    names.dedup();
    names
}

/// Aborts the renewal loop when dropped, including when the section's
/// future is cancelled.
struct RenewalTask(JoinHandle<()>);

impl Drop for RenewalTask {
    fn drop(&mut self) {
        self.0.abort();
    }
}

/// A held lease. Released explicitly on the normal path; if the section's
/// future is dropped first, the release is spawned onto the runtime instead.
struct Lease {
    backend: Arc<dyn LockBackend>,
    names: Vec<String>,
    token: String,
    held: bool,
}

impl Lease {
    async fn release(mut self) {
        release_logged(self.backend.as_ref(), &self.names, &self.token).await;
        self.held = false;
    }
}

impl Drop for Lease {
    fn drop(&mut self) {
        if !self.held {
            return;
        }
        let backend = self.backend.clone();
        let names = std::mem::take(&mut self.names);
        let token = std::mem::take(&mut self.token);

        match Handle::try_current() {
            Ok(handle) => {
                debug!(names = ?names, "Section cancelled, releasing lock in background");
                handle.spawn(async move {
                    release_logged(backend.as_ref(), &names, &token).await;
                });
            }
            Err(_) => warn!(names = ?names, "No runtime to release lock, lease will expire"),
        }
    }
}

async fn release_logged(backend: &dyn LockBackend, names: &[String], token: &str) {
    match backend.release(names, token).await {
        Ok(()) => debug!(names = ?names, "Lock released"),
        Err(e) => error!(names = ?names, error = %e, "Failed to release lock"),
    }
}

async fn renew_until_lost(
    backend: Arc<dyn LockBackend>,
    names: Vec<String>,
    token: String,
    config: LockConfig,
    aborted: Arc<AtomicBool>,
) {
    let mut ticker = tokio::time::interval(config.renew_interval);
    // The first tick completes immediately; the lease was just taken.
    ticker.tick().await;

    loop {
        ticker.tick().await;
        match backend.renew(&names, &token, config.ttl).await {
            Ok(true) => debug!(names = ?names, "Lock renewed"),
            Ok(false) => {
                warn!(names = ?names, "Lock renewal rejected, lease lost");
                break;
            }
            Err(e) => {
                warn!(names = ?names, error = %e, "Lock renewal failed");
                break;
            }
        }
    }

    aborted.store(true, Ordering::SeqCst);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_are_sorted_and_deduplicated() {
        assert_eq!(normalize(["b", "a", "b"]), vec!["a".to_string(), "b".to_string()]);
    }

    #[test]
    fn abort_check_reports_lost_names() {
        let check = AbortCheck {
            names: vec!["x".to_string()].into(),
            aborted: Arc::new(AtomicBool::new(false)),
        };
        assert!(check.check().is_ok());

        check.aborted.store(true, Ordering::SeqCst);
        assert!(matches!(check.check(), Err(LockError::Lost { names }) if names == ["x"]));
    }
}
