// Copyright 2022 Toolchain Labs, Inc. All rights reserved.
// Licensed under the Apache License, Version 2.0 (see LICENSE).

use std::collections::BTreeSet;
use std::sync::Arc;

use parking_lot::RwLock;
use sha1::{Digest, Sha1};

use crate::store::{DivergenceStore, StoreError};

/// One divergence entry annotated with the version read at dispatch
/// time, which is the compare-and-clear token on success.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DivergentGroup {
    pub tenant_id: String,
    pub group_id: String,
    pub version: i64,
}

/// Bucket index for a tenant: the sha1 digest of the tenant id taken
/// as a big-endian integer, mod the bucket count. All of a tenant's
/// groups land in the same bucket.
pub fn bucket_for_tenant(tenant_id: &str, num_buckets: u32) -> u32 {
    let digest = Sha1::digest(tenant_id.as_bytes());
    digest
        .iter()
        .fold(0u64, |acc, &byte| {
            ((acc << 8) | u64::from(byte)) % u64::from(num_buckets)
        }) as u32
}

/// Registry entries whose bucket is in `buckets`, in listing order.
/// Names that do not parse as `<tenant>_<group>` are skipped.
pub async fn get_divergent_groups(
    store: &dyn DivergenceStore,
    buckets: &BTreeSet<u32>,
    num_buckets: u32,
) -> Result<Vec<DivergentGroup>, StoreError> {
    let children = store.get_children_with_stats().await?;
    Ok(children
        .into_iter()
        .filter_map(|(name, stat)| {
            let (tenant_id, group_id) = match name.split_once('_') {
                Some(parts) => parts,
                None => {
                    log::warn!("Skipping malformed divergence entry: {name}");
                    return None;
                }
            };
            if !buckets.contains(&bucket_for_tenant(tenant_id, num_buckets)) {
                return None;
            }
            Some(DivergentGroup {
                tenant_id: tenant_id.to_string(),
                group_id: group_id.to_string(),
                version: stat.version,
            })
        })
        .collect())
}

/// Which buckets this worker currently owns. Ownership is disjoint
/// among live workers; the membership protocol rebalances through the
/// shared handle.
#[derive(Clone)]
pub struct Partitioner {
    owned: Arc<RwLock<BTreeSet<u32>>>,
    num_buckets: u32,
}

impl Partitioner {
    /// Static assignment: bucket `b` belongs to worker
    /// `b % worker_count`.
    pub fn for_worker(worker_index: u32, worker_count: u32, num_buckets: u32) -> Self {
        let owned = (0..num_buckets)
            .filter(|bucket| bucket % worker_count == worker_index)
            .collect();
        Self::with_buckets(owned, num_buckets)
    }

    pub fn with_buckets(owned: BTreeSet<u32>, num_buckets: u32) -> Self {
        Partitioner {
            owned: Arc::new(RwLock::new(owned)),
            num_buckets,
        }
    }

    pub fn owned_buckets(&self) -> BTreeSet<u32> {
        self.owned.read().clone()
    }

    pub fn num_buckets(&self) -> u32 {
        self.num_buckets
    }

    /// Replace the owned set on a membership change.
    pub fn rebalance(&self, owned: BTreeSet<u32>) {
        *self.owned.write() = owned;
    }
}
