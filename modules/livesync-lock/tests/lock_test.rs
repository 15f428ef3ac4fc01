//! Behaviour of `with_lock` over the in-memory backend.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use livesync_common::LockConfig;
use livesync_lock::{LockBackend, LockError, MemoryLockBackend, MutationLock};
use tokio::sync::Barrier;

fn fast_config() -> LockConfig {
    LockConfig {
        ttl: Duration::from_secs(5),
        renew_interval: Duration::from_secs(1),
        retry_count: 200,
        retry_delay: Duration::from_millis(2),
    }
}

fn lock_over(backend: Arc<MemoryLockBackend>, config: LockConfig) -> MutationLock {
    MutationLock::new(backend, config)
}

#[tokio::test]
async fn same_name_sections_never_overlap() {
    let lock = MutationLock::in_memory(fast_config());
    let active = Arc::new(AtomicUsize::new(0));
    let peak = Arc::new(AtomicUsize::new(0));

    let run = |lock: MutationLock, active: Arc<AtomicUsize>, peak: Arc<AtomicUsize>| async move {
        lock.with_lock(["X"], |_check| async move {
            let now = active.fetch_add(1, Ordering::SeqCst) + 1;
            peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(20)).await;
            active.fetch_sub(1, Ordering::SeqCst);
            Ok::<_, LockError>(())
        })
        .await
    };

    let (a, b) = tokio::join!(
        run(lock.clone(), active.clone(), peak.clone()),
        run(lock.clone(), active.clone(), peak.clone()),
    );

    a.unwrap();
    b.unwrap();
    assert_eq!(peak.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn different_names_run_concurrently() {
    let lock = MutationLock::in_memory(fast_config());
    let barrier = Arc::new(Barrier::new(2));

    let run = |name: &'static str| {
        let lock = lock.clone();
        let barrier = barrier.clone();
        async move {
            lock.with_lock([name], |_check| async move {
                // Deadlocks unless both sections hold their locks at once.
                barrier.wait().await;
                Ok::<_, LockError>(name)
            })
            .await
        }
    };

    let both = tokio::time::timeout(Duration::from_secs(5), async {
        tokio::join!(run("left"), run("right"))
    })
    .await
    .expect("sections should not serialize");

    assert_eq!(both.0.unwrap(), "left");
    assert_eq!(both.1.unwrap(), "right");
}

#[tokio::test]
async fn acquisition_failure_rejects_without_running_section() {
    let backend = Arc::new(MemoryLockBackend::new());
    backend
        .try_acquire(&["b".to_string()], "someone-else", Duration::from_secs(60))
        .await
        .unwrap();
    let lock = lock_over(
        backend.clone(),
        LockConfig {
            retry_count: 2,
            ..fast_config()
        },
    );
    let ran = Arc::new(AtomicUsize::new(0));

    let counter = ran.clone();
    let err = lock
        .with_lock(["a", "b"], |_check| async move {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok::<_, LockError>(())
        })
        .await
        .unwrap_err();

    assert!(matches!(err, LockError::NotAcquired { attempts: 3, ref names } if names == &["a", "b"]));
    assert_eq!(ran.load(Ordering::SeqCst), 0);
    // All-or-nothing: the free name was not left behind.
    assert_eq!(backend.held(), vec!["b".to_string()]);
}

#[tokio::test]
async fn lock_is_released_when_section_fails() {
    let backend = Arc::new(MemoryLockBackend::new());
    let lock = lock_over(backend.clone(), fast_config());

    let result: Result<()> = lock
        .with_lock(["X"], |_check| async { Err(anyhow!("section blew up")) })
        .await;

    assert!(result.unwrap_err().to_string().contains("section blew up"));
    assert!(backend.held().is_empty());
}

#[tokio::test]
async fn empty_name_list_is_rejected() {
    let lock = MutationLock::in_memory(fast_config());

    let err = lock
        .with_lock(Vec::<String>::new(), |_check| async { Ok::<_, LockError>(()) })
        .await
        .unwrap_err();

    assert!(matches!(err, LockError::NoNames));
}

#[tokio::test]
async fn duplicate_names_are_taken_once() {
    let backend = Arc::new(MemoryLockBackend::new());
    let lock = lock_over(backend.clone(), fast_config());
    let held = backend.clone();

    let during = lock
        .with_lock(["X", "X"], |_check| async move { Ok::<_, LockError>(held.held()) })
        .await
        .unwrap();

    assert_eq!(during, vec!["X".to_string()]);
}

// ---------------------------------------------------------------------------
// Lost leases
// ---------------------------------------------------------------------------

/// Grants leases but refuses every renewal.
#[derive(Default)]
struct NoRenewBackend {
    inner: MemoryLockBackend,
    renewals: AtomicUsize,
}

#[async_trait]
impl LockBackend for NoRenewBackend {
    async fn try_acquire(&self, names: &[String], token: &str, ttl: Duration) -> Result<bool> {
        self.inner.try_acquire(names, token, ttl).await
    }

    async fn renew(&self, _names: &[String], _token: &str, _ttl: Duration) -> Result<bool> {
        self.renewals.fetch_add(1, Ordering::SeqCst);
        Ok(false)
    }

    async fn release(&self, names: &[String], token: &str) -> Result<()> {
        self.inner.release(names, token).await
    }
}

#[tokio::test(start_paused = true)]
async fn failed_renewal_is_visible_through_abort_check() {
    let backend = Arc::new(NoRenewBackend::default());
    let lock = MutationLock::new(
        backend.clone(),
        LockConfig {
            ttl: Duration::from_millis(300),
            renew_interval: Duration::from_millis(100),
            ..fast_config()
        },
    );

    let err = lock
        .with_lock(["X"], |check| async move {
            check.check()?;
            tokio::time::sleep(Duration::from_millis(250)).await;
            check.check()?;
            Ok::<_, LockError>(())
        })
        .await
        .unwrap_err();

    assert!(matches!(err, LockError::Lost { .. }));
    assert_eq!(backend.renewals.load(Ordering::SeqCst), 1);
    assert!(backend.inner.held().is_empty());
}

#[tokio::test(start_paused = true)]
async fn section_may_ignore_abort_signal() {
    let backend = Arc::new(NoRenewBackend::default());
    let lock = MutationLock::new(
        backend.clone(),
        LockConfig {
            ttl: Duration::from_millis(300),
            renew_interval: Duration::from_millis(100),
            ..fast_config()
        },
    );

    let value = lock
        .with_lock(["X"], |check| async move {
            tokio::time::sleep(Duration::from_millis(250)).await;
            Ok::<_, LockError>(check.is_aborted())
        })
        .await
        .unwrap();

    assert!(value);
}

// ---------------------------------------------------------------------------
// Cancelled sections
// ---------------------------------------------------------------------------

#[tokio::test]
async fn cancelled_section_releases_its_lease() {
    let backend = Arc::new(MemoryLockBackend::new());
    let lock = lock_over(backend.clone(), fast_config());

    let cancelled = tokio::time::timeout(
        Duration::from_millis(10),
        lock.with_lock(["X"], |_check| async {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok::<_, LockError>(())
        }),
    )
    .await;
    assert!(cancelled.is_err());

    // Let the background release run.
    for _ in 0..10 {
        if backend.held().is_empty() {
            break;
        }
        tokio::task::yield_now().await;
    }
    assert!(backend.held().is_empty());

    let impatient = lock_over(
        backend.clone(),
        LockConfig {
            retry_count: 0,
            ..fast_config()
        },
    );
    let value = impatient
        .with_lock(["X"], |_check| async { Ok::<_, LockError>(7) })
        .await
        .unwrap();
    assert_eq!(value, 7);
}

#[tokio::test]
async fn aborted_task_releases_its_lease() {
    let backend = Arc::new(MemoryLockBackend::new());
    let lock = lock_over(backend.clone(), fast_config());
    let (entered_tx, entered_rx) = tokio::sync::oneshot::channel();

    let task = tokio::spawn(async move {
        lock.with_lock(["Y"], |_check| async move {
            let _ = entered_tx.send(());
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok::<_, LockError>(())
        })
        .await
    });
    entered_rx.await.unwrap();
    assert_eq!(backend.held(), vec!["Y".to_string()]);

    task.abort();
    assert!(task.await.unwrap_err().is_cancelled());
    for _ in 0..10 {
        if backend.held().is_empty() {
            break;
        }
        tokio::task::yield_now().await;
    }

    assert!(backend.held().is_empty());
}
