//! Batch handler.

use async_trait::async_trait;
use std::future::Future;
use tokio_util::sync::CancellationToken;

/// Processes one batch of items.
///
/// The token is shared by every batch of a group and is cancelled as soon as
/// any batch fails. Nothing is aborted on cancellation; handlers that want to
/// stop early should check `token.is_cancelled()` or select on
/// `token.cancelled()`.
///
/// Any `Fn(CancellationToken, Vec<T>) -> impl Future<Output = Result<(), E>>`
/// closure is a handler.
#[async_trait]
pub trait BatchHandler<T: Send + 'static>: Send + Sync + 'static {
    type Error: Send + 'static;

    async fn handle(&self, token: CancellationToken, batch: Vec<T>) -> Result<(), Self::Error>;
}

#[async_trait]
impl<T, E, F, Fut> BatchHandler<T> for F
where
    F: Fn(CancellationToken, Vec<T>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), E>> + Send + 'static,
    T: Send + 'static,
    E: Send + 'static,
{
    type Error = E;

    async fn handle(&self, token: CancellationToken, batch: Vec<T>) -> Result<(), E> {
        self(token, batch).await
    }
}
