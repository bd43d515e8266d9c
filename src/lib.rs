//! # chunk-group
//!
//! Chunked, bounded-concurrency batch execution on tokio.
//!
//! ## Overview
//!
//! Items are submitted one at a time. Every time `size` items have been
//! staged they are handed, as one batch, to a user handler running on its own
//! task. At most `concurrency` handlers run at once; when all slots are busy,
//! submitting the item that completes a batch waits for a slot to free up.
//! [`ChunkGroup::finalize`] flushes the last partial batch, waits for all of
//! them, and returns the first error.
//!
//! ## Module Organization
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`group`] | Chunk group, batch handler and bounded task group |
//! | [`config`] | Batch size and concurrency settings (builder, serde, env) |
//! | [`error`] | Configuration errors |

pub mod config;
pub mod group;

pub use config::{ChunkConfig, Concurrency};
pub use group::{BatchHandler, ChunkGroup, TaskGroup};
pub use tokio_util::sync::CancellationToken;

/// Result type alias for the library
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for the library
pub mod error;
pub use error::{Error, ErrorContext};
