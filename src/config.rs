//! Group configuration: batch size and concurrency limit.
//!
//! Values can be set through the builder, deserialized, or read from the
//! environment:
//! - `CHUNK_GROUP_SIZE` (default 10)
//! - `CHUNK_GROUP_CONCURRENCY` (default 5, negative means unlimited)

use crate::{Error, ErrorContext, Result};
use serde::Deserialize;
use std::num::NonZeroUsize;

pub const ENV_SIZE: &str = "CHUNK_GROUP_SIZE";
pub const ENV_CONCURRENCY: &str = "CHUNK_GROUP_CONCURRENCY";

const DEFAULT_SIZE: usize = 10;
const DEFAULT_CONCURRENCY: usize = 5;

/// Maximum number of batches processed at the same time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(try_from = "i64")]
pub enum Concurrency {
    Unlimited,
    Limited(NonZeroUsize),
}

impl Concurrency {
    /// Map a raw limit: negative means unlimited, zero is rejected.
    pub fn from_limit(limit: isize) -> Result<Self> {
        if limit < 0 {
            return Ok(Concurrency::Unlimited);
        }
        NonZeroUsize::new(limit as usize)
            .map(Concurrency::Limited)
            .ok_or_else(|| {
                Error::configuration_with_context(
                    "concurrency limit must not be zero",
                    ErrorContext::new()
                        .with_field_path("concurrency")
                        .with_details("use a negative value for unlimited")
                        .with_source("chunk_config"),
                )
            })
    }

    pub fn limit(&self) -> Option<usize> {
        match self {
            Concurrency::Unlimited => None,
            Concurrency::Limited(n) => Some(n.get()),
        }
    }
}

impl Default for Concurrency {
    fn default() -> Self {
        NonZeroUsize::new(DEFAULT_CONCURRENCY).map_or(Concurrency::Unlimited, Concurrency::Limited)
    }
}

impl TryFrom<i64> for Concurrency {
    type Error = Error;

    fn try_from(limit: i64) -> Result<Self> {
        let limit = isize::try_from(limit).unwrap_or(if limit < 0 { -1 } else { isize::MAX });
        Concurrency::from_limit(limit)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ChunkConfig {
    /// Number of items per batch.
    pub size: usize,
    pub concurrency: Concurrency,
}

impl Default for ChunkConfig {
    fn default() -> Self {
        Self {
            size: DEFAULT_SIZE,
            concurrency: Concurrency::default(),
        }
    }
}

impl ChunkConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_size(mut self, size: usize) -> Self {
        self.size = size;
        self
    }

    pub fn with_concurrency(mut self, concurrency: Concurrency) -> Self {
        self.concurrency = concurrency;
        self
    }

    /// Defaults overlaid with `CHUNK_GROUP_SIZE` and `CHUNK_GROUP_CONCURRENCY`.
    pub fn from_env() -> Result<Self> {
        let mut cfg = Self::default();
        if let Some(size) = read_env::<usize>(ENV_SIZE)? {
            cfg.size = size;
        }
        if let Some(limit) = read_env::<isize>(ENV_CONCURRENCY)? {
            cfg.concurrency = Concurrency::from_limit(limit).map_err(|_| {
                Error::configuration_with_context(
                    "concurrency limit must not be zero",
                    ErrorContext::new()
                        .with_field_path(ENV_CONCURRENCY)
                        .with_source("env"),
                )
            })?;
        }
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<()> {
        if self.size == 0 {
            return Err(Error::configuration_with_context(
                "batch size must be positive",
                ErrorContext::new()
                    .with_field_path("size")
                    .with_details("got 0")
                    .with_source("chunk_config"),
            ));
        }
        Ok(())
    }
}

fn read_env<V: std::str::FromStr>(name: &str) -> Result<Option<V>> {
    let Ok(raw) = std::env::var(name) else {
        return Ok(None);
    };
    raw.trim().parse::<V>().map(Some).map_err(|_| {
        Error::configuration_with_context(
            "invalid environment value",
            ErrorContext::new()
                .with_field_path(name)
                .with_details(format!("cannot parse {:?}", raw))
                .with_source("env"),
        )
    })
}
