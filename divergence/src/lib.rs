// Copyright 2022 Toolchain Labs, Inc. All rights reserved.
// Licensed under the Apache License, Version 2.0 (see LICENSE).

//! The divergence registry: a versioned set of (tenant, group) pairs
//! that need convergence, plus the bucket partitioner that divides the
//! registry among worker processes.

mod memory;
mod partition;
mod redis_store;
mod store;

pub use memory::MemoryStore;
pub use partition::{bucket_for_tenant, get_divergent_groups, DivergentGroup, Partitioner};
pub use redis_store::RedisStore;
pub use store::{DivergenceStore, NodeStat, StoreError};

/// Default root path for divergence entries.
pub const DEFAULT_DIVERGENT_ROOT: &str = "/groups/divergent";

/// Default number of partitioner buckets.
pub const DEFAULT_NUM_BUCKETS: u32 = 10;

/// Registry child name for a group: `<tenant>_<group>`.
pub fn entry_name(tenant_id: &str, group_id: &str) -> String {
    format!("{tenant_id}_{group_id}")
}

/// Mark a group as needing convergence. Idempotent: re-marking bumps
/// the entry's version, which protects it from a concurrent
/// compare-and-clear by an in-flight convergence.
pub async fn mark_divergent(
    store: &dyn DivergenceStore,
    tenant_id: &str,
    group_id: &str,
) -> Result<NodeStat, StoreError> {
    store
        .create_or_set(&entry_name(tenant_id, group_id), b"dirty")
        .await
}
