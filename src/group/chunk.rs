//! Chunk group.

use super::handler::BatchHandler;
use super::tasks::TaskGroup;
use crate::config::{ChunkConfig, Concurrency};
use crate::Result;
use futures::{Stream, StreamExt};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

/// Collects items into fixed-size batches and runs `handler` on each full
/// batch, with at most `concurrency` batches in flight.
///
/// Batch `k` always holds items `[k * size, (k + 1) * size)` in submission
/// order; only the last batch may be shorter. Batches may complete in any
/// order unless the concurrency limit is 1.
///
/// Dropping a group without calling [`ChunkGroup::finalize`] aborts the
/// batches still running.
pub struct ChunkGroup<T, H>
where
    T: Send + 'static,
    H: BatchHandler<T>,
{
    items: Vec<T>,
    size: usize,
    handler: Arc<H>,
    tasks: TaskGroup<H::Error>,
    dispatched: usize,
}

impl<T, H> ChunkGroup<T, H>
where
    T: Send + 'static,
    H: BatchHandler<T>,
{
    /// Create a group with its own root token.
    ///
    /// A negative `concurrency` means unlimited; zero is rejected, as is a
    /// zero `size`.
    pub fn new(size: usize, concurrency: isize, handler: H) -> Result<Self> {
        let config = ChunkConfig::new()
            .with_size(size)
            .with_concurrency(Concurrency::from_limit(concurrency)?);
        Self::from_config(config, handler)
    }

    /// Create a group whose token derives from `parent`.
    ///
    /// The returned token is cancelled when the first batch fails, when
    /// `parent` is cancelled, or once `finalize` returns.
    pub fn with_token(
        parent: &CancellationToken,
        size: usize,
        concurrency: isize,
        handler: H,
    ) -> Result<(Self, CancellationToken)> {
        let config = ChunkConfig::new()
            .with_size(size)
            .with_concurrency(Concurrency::from_limit(concurrency)?);
        Self::from_config_with_token(parent, config, handler)
    }

    pub fn from_config(config: ChunkConfig, handler: H) -> Result<Self> {
        Self::from_config_with_token(&CancellationToken::new(), config, handler)
            .map(|(group, _)| group)
    }

    pub fn from_config_with_token(
        parent: &CancellationToken,
        config: ChunkConfig,
        handler: H,
    ) -> Result<(Self, CancellationToken)> {
        config.validate()?;
        let (tasks, token) = TaskGroup::with_token(parent, config.concurrency);
        let group = Self {
            items: Vec::with_capacity(config.size),
            size: config.size,
            handler: Arc::new(handler),
            tasks,
            dispatched: 0,
        };
        Ok((group, token))
    }

    /// Add an item. When this fills the batch, the batch is handed to the
    /// handler; if every slot is busy this waits until one frees up.
    ///
    /// Batches keep being dispatched after the token is cancelled. Failures
    /// are reported by [`ChunkGroup::finalize`].
    ///
    /// Not cancel safe: dropping this future while it waits for a slot drops
    /// the batch it was dispatching.
    pub async fn submit(&mut self, item: T) {
        self.items.push(item);
        if self.items.len() == self.size {
            self.dispatch().await;
        }
    }

    pub async fn submit_all<I>(&mut self, items: I)
    where
        I: IntoIterator<Item = T>,
    {
        for item in items {
            self.submit(item).await;
        }
    }

    pub async fn submit_stream<S>(&mut self, stream: S)
    where
        S: Stream<Item = T>,
    {
        futures::pin_mut!(stream);
        while let Some(item) = stream.next().await {
            self.submit(item).await;
        }
    }

    /// Dispatch any remaining items, wait for every batch, and return the
    /// first error a batch produced.
    pub async fn finalize(mut self) -> std::result::Result<(), H::Error> {
        if !self.items.is_empty() {
            debug!(remaining = self.items.len(), "flushing partial batch");
            self.dispatch().await;
        }
        debug!(batches = self.dispatched, "waiting for batches");
        self.tasks.wait().await
    }

    async fn dispatch(&mut self) {
        // The batch gets its own allocation; `items` keeps its capacity.
        let batch: Vec<T> = self.items.drain(..).collect();
        let index = self.dispatched;
        self.dispatched += 1;

        let token = self.tasks.token().clone();
        if token.is_cancelled() {
            trace!(batch = index, "dispatching after cancellation");
        }
        debug!(batch = index, len = batch.len(), "dispatching batch");

        let handler = Arc::clone(&self.handler);
        self.tasks
            .spawn(async move { handler.handle(token, batch).await })
            .await;
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// Items staged for the next batch.
    pub fn pending(&self) -> usize {
        self.items.len()
    }

    /// Batches handed to the handler so far.
    pub fn dispatched(&self) -> usize {
        self.dispatched
    }

    pub fn token(&self) -> &CancellationToken {
        self.tasks.token()
    }
}
