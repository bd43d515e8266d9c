//! Bounded task group.
//!
//! Runs futures on the tokio runtime, at most `concurrency` at a time, and
//! keeps the first error any of them returns.

use crate::config::Concurrency;
use std::future::Future;
use std::sync::{Arc, Mutex};
use tokio::sync::Semaphore;
use tokio::task::{JoinError, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

pub struct TaskGroup<E> {
    tasks: JoinSet<()>,
    limiter: Option<Arc<Semaphore>>,
    token: CancellationToken,
    first_error: Arc<Mutex<Option<E>>>,
}

impl<E: Send + 'static> TaskGroup<E> {
    pub fn new(concurrency: Concurrency) -> Self {
        Self::with_token(&CancellationToken::new(), concurrency).0
    }

    /// Build a group whose token is a child of `parent`.
    ///
    /// The returned token is cancelled when `parent` is cancelled, when a
    /// task fails, or once `wait` returns.
    pub fn with_token(
        parent: &CancellationToken,
        concurrency: Concurrency,
    ) -> (Self, CancellationToken) {
        let token = parent.child_token();
        let limiter = concurrency
            .limit()
            .map(|n| Arc::new(Semaphore::new(n.min(Semaphore::MAX_PERMITS))));
        let group = Self {
            tasks: JoinSet::new(),
            limiter,
            token: token.clone(),
            first_error: Arc::new(Mutex::new(None)),
        };
        (group, token)
    }

    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    /// Tasks spawned and not yet reaped. Finished tasks are reaped on the
    /// next `spawn`.
    pub fn in_flight(&self) -> usize {
        self.tasks.len()
    }

    /// Free slots, or `None` when unlimited.
    pub fn available_permits(&self) -> Option<usize> {
        self.limiter.as_ref().map(|sem| sem.available_permits())
    }

    /// Spawn `fut`, waiting for a free slot first when the group is full.
    ///
    /// The slot is released when `fut` completes.
    pub async fn spawn<Fut>(&mut self, fut: Fut)
    where
        Fut: Future<Output = Result<(), E>> + Send + 'static,
    {
        // The semaphore is owned by this group and never closed.
        let permit = match &self.limiter {
            Some(sem) => sem.clone().acquire_owned().await.ok(),
            None => None,
        };
        self.reap_finished();

        let token = self.token.clone();
        let first_error = Arc::clone(&self.first_error);
        self.tasks.spawn(async move {
            let _permit = permit;
            if let Err(err) = fut.await {
                record_error(&first_error, &token, err);
            }
        });
    }

    /// Drop finished tasks so a long run keeps only live ones.
    fn reap_finished(&mut self) {
        while let Some(joined) = self.tasks.try_join_next() {
            resume_panic(joined);
        }
    }

    /// Wait for every spawned task and return the first error.
    ///
    /// A task panic is resumed here.
    pub async fn wait(mut self) -> Result<(), E> {
        while let Some(joined) = self.tasks.join_next().await {
            resume_panic(joined);
        }
        self.token.cancel();

        let first = match self.first_error.lock() {
            Ok(mut slot) => slot.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        match first {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

fn resume_panic(joined: Result<(), JoinError>) {
    if let Err(err) = joined {
        if err.is_panic() {
            std::panic::resume_unwind(err.into_panic());
        }
    }
}

fn record_error<E>(slot: &Mutex<Option<E>>, token: &CancellationToken, err: E) {
    let mut slot = match slot.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    };
    if slot.is_none() {
        *slot = Some(err);
        drop(slot);
        warn!("task failed, cancelling group");
        token.cancel();
    } else {
        debug!("discarding error from later task failure");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::num::NonZeroUsize;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn limited(n: usize) -> Concurrency {
        Concurrency::Limited(NonZeroUsize::new(n).unwrap())
    }

    #[tokio::test]
    async fn test_empty_group_waits_ok() {
        let group: TaskGroup<String> = TaskGroup::new(limited(2));
        assert_eq!(group.in_flight(), 0);
        assert!(group.wait().await.is_ok());
    }

    #[tokio::test]
    async fn test_first_error_wins() {
        let mut group = TaskGroup::new(Concurrency::Unlimited);
        group.spawn(async { Err::<(), _>("first") }).await;
        let token = group.token().clone();
        token.cancelled().await;

        group
            .spawn(async {
                tokio::time::sleep(Duration::from_millis(5)).await;
                Err("second")
            })
            .await;
        assert_eq!(group.wait().await, Err("first"));
    }

    #[tokio::test]
    async fn test_failure_cancels_token() {
        let parent = CancellationToken::new();
        let (mut group, token) = TaskGroup::with_token(&parent, limited(1));
        assert!(!token.is_cancelled());

        group.spawn(async { Err::<(), _>(42) }).await;
        tokio::time::timeout(Duration::from_secs(1), token.cancelled())
            .await
            .expect("token should be cancelled after failure");
        assert!(!parent.is_cancelled());
        assert_eq!(group.wait().await, Err(42));
    }

    #[tokio::test]
    async fn test_parent_cancellation_propagates() {
        let parent = CancellationToken::new();
        let (group, token) = TaskGroup::<()>::with_token(&parent, Concurrency::Unlimited);
        parent.cancel();
        assert!(token.is_cancelled());
        assert!(group.token().is_cancelled());
    }

    #[tokio::test]
    async fn test_wait_cancels_token() {
        let (mut group, token) =
            TaskGroup::<()>::with_token(&CancellationToken::new(), limited(2));
        group.spawn(async { Ok(()) }).await;
        assert!(group.wait().await.is_ok());
        assert!(token.is_cancelled());
    }

    #[tokio::test]
    async fn test_spawn_respects_limit() {
        let mut group: TaskGroup<()> = TaskGroup::new(limited(2));
        let running = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        for _ in 0..8 {
            let running = Arc::clone(&running);
            let peak = Arc::clone(&peak);
            group
                .spawn(async move {
                    let now = running.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(10)).await;
                    running.fetch_sub(1, Ordering::SeqCst);
                    Ok(())
                })
                .await;
            // The task just spawned is still sleeping on its slot.
            assert!(group.available_permits().unwrap() < 2);
        }

        assert!(group.wait().await.is_ok());
        assert!(peak.load(Ordering::SeqCst) <= 2);
    }

    #[tokio::test]
    async fn test_finished_tasks_are_reaped() {
        let mut group: TaskGroup<()> = TaskGroup::new(limited(1));
        for _ in 0..10_000 {
            group.spawn(async { Ok(()) }).await;
            assert!(group.in_flight() <= 1);
        }
        tokio::task::yield_now().await;
        assert!(group.in_flight() <= 1);
        assert!(group.wait().await.is_ok());
    }

    #[tokio::test]
    async fn test_unlimited_group_reaps_on_spawn() {
        let mut group: TaskGroup<()> = TaskGroup::new(Concurrency::Unlimited);
        for _ in 0..1_000 {
            group.spawn(async { Ok(()) }).await;
            tokio::task::yield_now().await;
        }
        // Everything but the last spawn has finished and been dropped.
        assert!(group.in_flight() <= 2);
        assert!(group.wait().await.is_ok());
    }

    #[tokio::test]
    #[should_panic(expected = "early")]
    async fn test_panic_surfaces_on_next_spawn() {
        let mut group: TaskGroup<()> = TaskGroup::new(limited(1));
        group
            .spawn(async {
                if true {
                    panic!("early");
                }
                Ok(())
            })
            .await;
        group.spawn(async { Ok(()) }).await;
    }

    #[tokio::test]
    #[should_panic(expected = "boom")]
    async fn test_panic_resumed_on_wait() {
        let mut group: TaskGroup<()> = TaskGroup::new(Concurrency::Unlimited);
        group
            .spawn(async {
                if true {
                    panic!("boom");
                }
                Ok(())
            })
            .await;
        let _ = group.wait().await;
    }
}
