// Copyright 2022 Toolchain Labs, Inc. All rights reserved.
// Licensed under the Apache License, Version 2.0 (see LICENSE).

use std::fmt;

use async_trait::async_trait;
use redis::RedisError;

/// Metadata returned for a registry entry. A fresh entry is at version
/// 0; every write bumps it.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct NodeStat {
    pub version: i64,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StoreError {
    Unavailable(String),
    Internal(String),
}

impl std::error::Error for StoreError {}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreError::Unavailable(msg) => write!(f, "Registry unavailable: {msg}"),
            StoreError::Internal(msg) => write!(f, "Registry error: {msg}"),
        }
    }
}

impl From<RedisError> for StoreError {
    fn from(err: RedisError) -> Self {
        let err_str = format!("Redis error: {err}");
        if err.is_io_error()
            || err.is_cluster_error()
            || err.is_connection_refusal()
            || err.is_connection_dropped()
            || err.is_timeout()
        {
            StoreError::Unavailable(err_str)
        } else {
            StoreError::Internal(err_str)
        }
    }
}

/// A rooted, versioned key-value registry of divergence entries.
///
/// The semantics mirror a hierarchical store with per-node version
/// counters: writes bump versions, listings are consistent snapshots,
/// and deletes are conditional on the version read at dispatch time.
#[async_trait]
pub trait DivergenceStore: Send + Sync {
    /// Create the entry or overwrite it, bumping the version counter.
    async fn create_or_set(&self, name: &str, content: &[u8]) -> Result<NodeStat, StoreError>;

    /// All entries with their stats, from one consistent snapshot, in
    /// ascending name order.
    async fn get_children_with_stats(&self) -> Result<Vec<(String, NodeStat)>, StoreError>;

    /// Delete the entry iff its current version equals
    /// `expected_version` (`-1` deletes unconditionally). Returns
    /// whether anything was deleted; a mismatch or a missing entry is a
    /// no-op, not an error.
    async fn delete(&self, name: &str, expected_version: i64) -> Result<bool, StoreError>;
}

#[async_trait]
impl<S> DivergenceStore for Box<S>
where
    S: DivergenceStore + ?Sized,
{
    async fn create_or_set(&self, name: &str, content: &[u8]) -> Result<NodeStat, StoreError> {
        (**self).create_or_set(name, content).await
    }

    async fn get_children_with_stats(&self) -> Result<Vec<(String, NodeStat)>, StoreError> {
        (**self).get_children_with_stats().await
    }

    async fn delete(&self, name: &str, expected_version: i64) -> Result<bool, StoreError> {
        (**self).delete(name, expected_version).await
    }
}
