//! Chunked Ingest Example
//!
//! Streams synthetic records into a `ChunkGroup` that "writes" them in
//! batches, with a bounded number of writes in flight. One batch is made to
//! fail so the cancellation path is visible in the logs.
//!
//! Usage:
//!   RUST_LOG=chunk_group=debug cargo run --example chunked_ingest
//!
//! Batch size and concurrency come from `CHUNK_GROUP_SIZE` and
//! `CHUNK_GROUP_CONCURRENCY` when set.

use anyhow::Context;
use chunk_group::{CancellationToken, ChunkConfig, ChunkGroup};
use std::time::Duration;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone)]
struct Record {
    id: u64,
    payload: String,
}

#[derive(Debug, thiserror::Error)]
#[error("write failed for batch starting at record {first_id}")]
struct WriteError {
    first_id: u64,
}

async fn write_batch(token: CancellationToken, batch: Vec<Record>) -> Result<(), WriteError> {
    let first_id = batch.first().map(|r| r.id).unwrap_or_default();
    if token.is_cancelled() {
        tracing::info!(first_id, "skipping batch, group already failed");
        return Ok(());
    }

    let bytes: usize = batch.iter().map(|r| r.payload.len()).sum();
    tokio::select! {
        _ = token.cancelled() => {
            tracing::info!(first_id, "write interrupted");
            return Ok(());
        }
        _ = tokio::time::sleep(Duration::from_millis(20)) => {}
    }

    if first_id == 120 {
        return Err(WriteError { first_id });
    }
    tracing::info!(first_id, records = batch.len(), bytes, "batch written");
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let config = ChunkConfig::from_env().context("loading chunk group config")?;
    println!(
        "=== Chunked ingest: size {}, concurrency {:?} ===\n",
        config.size, config.concurrency
    );

    let shutdown = CancellationToken::new();
    let (mut group, token) = ChunkGroup::from_config_with_token(&shutdown, config, write_batch)?;

    let records = (0..250u64).map(|id| Record {
        id,
        payload: format!("record-{}", id),
    });
    group.submit_stream(futures::stream::iter(records)).await;

    println!("Dispatched {} batches", group.dispatched());
    match group.finalize().await {
        Ok(()) => println!("All batches written"),
        Err(err) => println!("Ingest failed: {}", err),
    }
    println!("Group token cancelled: {}", token.is_cancelled());
    Ok(())
}
