//! Chunked batch execution.
//!
//! ## Key Components
//!
//! | Component | Description |
//! |-----------|-------------|
//! | [`ChunkGroup`] | Stages items and dispatches full batches to a handler |
//! | [`BatchHandler`] | Processes one batch; implemented by async closures |
//! | [`TaskGroup`] | Bounded set of tasks with first-error tracking and a shared cancellation token |
//!
//! ## Example
//!
//! ```rust
//! use chunk_group::ChunkGroup;
//! use tokio_util::sync::CancellationToken;
//!
//! # #[tokio::main]
//! # async fn main() {
//! // Batches of 100, at most 4 running at once.
//! let mut group = ChunkGroup::new(100, 4, |token: CancellationToken, rows: Vec<u64>| async move {
//!     if token.is_cancelled() {
//!         return Ok(());
//!     }
//!     let _sum: u64 = rows.iter().sum();
//!     Ok::<(), std::io::Error>(())
//! })
//! .unwrap();
//!
//! for row in 0..1_000u64 {
//!     group.submit(row).await;
//! }
//! group.finalize().await.unwrap();
//! # }
//! ```
//!
//! ## Failure Handling
//!
//! - The first batch error is kept and returned by [`ChunkGroup::finalize`]; later ones are dropped
//! - The group token is cancelled on that first error; handlers decide whether to stop early
//! - Submitting never fails

mod chunk;
mod handler;
mod tasks;

pub use chunk::ChunkGroup;
pub use handler::BatchHandler;
pub use tasks::TaskGroup;
