// Copyright 2022 Toolchain Labs, Inc. All rights reserved.
// Licensed under the Apache License, Version 2.0 (see LICENSE).

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use model::{ClbDescription, DesiredGroupState, GroupState};
use parking_lot::Mutex;
use serde::Deserialize;
use serde_json::{json, Value};

/// Metadata key stamped on every server the autoscaler creates, which
/// is how observed servers are tied back to their group.
pub const GROUP_ID_METADATA_KEY: &str = "autoscale:group-id";

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum GroupError {
    NoSuchScalingGroup {
        tenant_id: String,
        group_id: String,
    },
    Backend(String),
}

impl std::error::Error for GroupError {}

impl fmt::Display for GroupError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GroupError::NoSuchScalingGroup {
                tenant_id,
                group_id,
            } => write!(f, "No such scaling group {group_id} for tenant {tenant_id}"),
            GroupError::Backend(msg) => write!(f, "Group store error: {msg}"),
        }
    }
}

/// A group's launch configuration: the server template plus the
/// attachments every server of the group should have.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct LaunchConfig {
    /// The `server` object POSTed to the compute API, without the
    /// ownership metadata (stamped at plan time).
    pub server: Value,
    #[serde(default)]
    pub load_balancers: Vec<ClbDescription>,
    #[serde(default)]
    pub rcv3_pools: BTreeSet<String>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GroupInfo {
    pub state: GroupState,
    pub launch: LaunchConfig,
}

/// Persistent group configuration is an external collaborator; this is
/// the contract the converger needs from it.
#[async_trait]
pub trait GroupStore: Send + Sync {
    async fn get_scaling_group_info(
        &self,
        tenant_id: &str,
        group_id: &str,
    ) -> Result<GroupInfo, GroupError>;

    /// Replace the group's active map. The converger is the only
    /// writer; servers now active leave the pending map.
    async fn update_active(
        &self,
        tenant_id: &str,
        group_id: &str,
        active: BTreeMap<String, Value>,
    ) -> Result<(), GroupError>;
}

/// Derive the planner's input from a group's configuration and state.
pub fn desired_group_state(group_id: &str, launch: &LaunchConfig, state: &GroupState) -> DesiredGroupState {
    let mut server_config = launch.server.clone();
    if let Some(config) = server_config.as_object_mut() {
        let metadata = config
            .entry("metadata".to_string())
            .or_insert_with(|| json!({}));
        if let Some(metadata) = metadata.as_object_mut() {
            metadata.insert(GROUP_ID_METADATA_KEY.to_string(), json!(group_id));
        }
    }
    let mut desired_lbs: BTreeMap<String, Vec<ClbDescription>> = BTreeMap::new();
    for desc in &launch.load_balancers {
        desired_lbs
            .entry(desc.lb_id.clone())
            .or_default()
            .push(desc.clone());
    }
    DesiredGroupState {
        server_config,
        capacity: state.desired,
        desired_lbs,
        rcv3_pools: launch.rcv3_pools.clone(),
    }
}

/// In-process group store backing tests and single-node deployments.
#[derive(Clone, Default)]
pub struct MemoryGroupStore {
    inner: Arc<Mutex<HashMap<(String, String), GroupInfo>>>,
}

impl MemoryGroupStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, info: GroupInfo) {
        let key = (info.state.tenant_id.clone(), info.state.group_id.clone());
        self.inner.lock().insert(key, info);
    }

    /// Current state snapshot, for assertions.
    pub fn state(&self, tenant_id: &str, group_id: &str) -> Option<GroupState> {
        self.inner
            .lock()
            .get(&(tenant_id.to_string(), group_id.to_string()))
            .map(|info| info.state.clone())
    }
}

#[async_trait]
impl GroupStore for MemoryGroupStore {
    async fn get_scaling_group_info(
        &self,
        tenant_id: &str,
        group_id: &str,
    ) -> Result<GroupInfo, GroupError> {
        self.inner
            .lock()
            .get(&(tenant_id.to_string(), group_id.to_string()))
            .cloned()
            .ok_or_else(|| GroupError::NoSuchScalingGroup {
                tenant_id: tenant_id.to_string(),
                group_id: group_id.to_string(),
            })
    }

    async fn update_active(
        &self,
        tenant_id: &str,
        group_id: &str,
        active: BTreeMap<String, Value>,
    ) -> Result<(), GroupError> {
        let mut inner = self.inner.lock();
        let info = inner
            .get_mut(&(tenant_id.to_string(), group_id.to_string()))
            .ok_or_else(|| GroupError::NoSuchScalingGroup {
                tenant_id: tenant_id.to_string(),
                group_id: group_id.to_string(),
            })?;
        for server_id in active.keys() {
            info.state.pending.remove(server_id);
        }
        info.state.active = active;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use model::{ClbDescription, GroupState};
    use serde_json::json;

    use super::{
        desired_group_state, GroupInfo, GroupStore, LaunchConfig, MemoryGroupStore,
        GROUP_ID_METADATA_KEY,
    };

    fn launch() -> LaunchConfig {
        LaunchConfig {
            server: json!({"name": "foo", "imageRef": "img", "flavorRef": "flv"}),
            load_balancers: vec![ClbDescription::new("23", 80)],
            rcv3_pools: Default::default(),
        }
    }

    #[test]
    fn desired_state_stamps_ownership_metadata() {
        let state = GroupState::new("t1", "g1", "web", 3);
        let desired = desired_group_state("g1", &launch(), &state);
        assert_eq!(desired.capacity, 3);
        assert_eq!(
            desired.server_config["metadata"][GROUP_ID_METADATA_KEY],
            json!("g1")
        );
        assert_eq!(desired.server_config["name"], json!("foo"));
        assert_eq!(desired.desired_lbs["23"], vec![ClbDescription::new("23", 80)]);
    }

    #[tokio::test]
    async fn update_active_clears_pending_for_promoted_servers() {
        let store = MemoryGroupStore::new();
        let mut state = GroupState::new("t1", "g1", "web", 2);
        state
            .pending
            .insert("a".to_string(), chrono::Utc::now());
        state
            .pending
            .insert("b".to_string(), chrono::Utc::now());
        store.insert(GroupInfo {
            state,
            launch: launch(),
        });

        let mut active = BTreeMap::new();
        active.insert("a".to_string(), json!({"id": "a"}));
        store.update_active("t1", "g1", active).await.unwrap();

        let state = store.state("t1", "g1").unwrap();
        assert_eq!(state.active.len(), 1);
        assert!(state.pending.contains_key("b"));
        assert!(!state.pending.contains_key("a"));
    }

    #[tokio::test]
    async fn missing_group_is_a_distinct_error() {
        let store = MemoryGroupStore::new();
        let err = store.get_scaling_group_info("t1", "g1").await.unwrap_err();
        assert_eq!(
            err,
            super::GroupError::NoSuchScalingGroup {
                tenant_id: "t1".to_string(),
                group_id: "g1".to_string(),
            }
        );
    }
}
