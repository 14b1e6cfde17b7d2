// Copyright 2022 Toolchain Labs, Inc. All rights reserved.
// Licensed under the Apache License, Version 2.0 (see LICENSE).

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::ClbDescription;

/// Persisted state of one scaling group.
///
/// The active map is authoritative for "which servers are serving?" and
/// is written only by the converger, strictly after a successful step
/// execution. `active` and `pending` are disjoint at rest.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupState {
    pub tenant_id: String,
    pub group_id: String,
    pub group_name: String,
    pub desired: usize,
    #[serde(default)]
    pub pending: BTreeMap<String, DateTime<Utc>>,
    #[serde(default)]
    pub active: BTreeMap<String, Value>,
    #[serde(default)]
    pub paused: bool,
    #[serde(default)]
    pub policy_touched: Option<DateTime<Utc>>,
}

impl GroupState {
    pub fn new(
        tenant_id: impl Into<String>,
        group_id: impl Into<String>,
        group_name: impl Into<String>,
        desired: usize,
    ) -> Self {
        GroupState {
            tenant_id: tenant_id.into(),
            group_id: group_id.into(),
            group_name: group_name.into(),
            desired,
            pending: BTreeMap::new(),
            active: BTreeMap::new(),
            paused: false,
            policy_touched: None,
        }
    }
}

/// What the planner converges toward: the server template, the target
/// capacity and the desired load-balancer attachments.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DesiredGroupState {
    /// Request body template for creating one server.
    pub server_config: Value,
    pub capacity: usize,
    pub desired_lbs: BTreeMap<String, Vec<ClbDescription>>,
    #[serde(default)]
    pub rcv3_pools: BTreeSet<String>,
}
