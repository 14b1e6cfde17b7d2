// Copyright 2022 Toolchain Labs, Inc. All rights reserved.
// Licensed under the Apache License, Version 2.0 (see LICENSE).

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::store::{DivergenceStore, NodeStat, StoreError};

struct Entry {
    content: Vec<u8>,
    version: i64,
}

/// In-process registry used by tests and single-worker deployments.
#[derive(Clone)]
pub struct MemoryStore {
    inner: Arc<Mutex<BTreeMap<String, Entry>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        MemoryStore {
            inner: Arc::new(Mutex::new(BTreeMap::new())),
        }
    }

    /// Content of an entry, for assertions.
    pub fn content(&self, name: &str) -> Option<Vec<u8>> {
        self.inner.lock().get(name).map(|e| e.content.clone())
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DivergenceStore for MemoryStore {
    async fn create_or_set(&self, name: &str, content: &[u8]) -> Result<NodeStat, StoreError> {
        let mut inner = self.inner.lock();
        let entry = inner
            .entry(name.to_string())
            .and_modify(|entry| {
                entry.version += 1;
                entry.content = content.to_vec();
            })
            .or_insert_with(|| Entry {
                content: content.to_vec(),
                version: 0,
            });
        Ok(NodeStat {
            version: entry.version,
        })
    }

    async fn get_children_with_stats(&self) -> Result<Vec<(String, NodeStat)>, StoreError> {
        let inner = self.inner.lock();
        Ok(inner
            .iter()
            .map(|(name, entry)| {
                (
                    name.clone(),
                    NodeStat {
                        version: entry.version,
                    },
                )
            })
            .collect())
    }

    async fn delete(&self, name: &str, expected_version: i64) -> Result<bool, StoreError> {
        let mut inner = self.inner.lock();
        match inner.get(name) {
            Some(entry) if expected_version == -1 || entry.version == expected_version => {
                inner.remove(name);
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}
