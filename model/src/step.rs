// Copyright 2022 Toolchain Labs, Inc. All rights reserved.
// Licensed under the Apache License, Version 2.0 (see LICENSE).

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{ClbDescription, NodeCondition, NodeType};

/// One remediating action emitted by the planner and consumed by the
/// executor. Steps are plain comparable values; the executor turns each
/// variant into a single provider request.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Step {
    CreateServer {
        server_config: Value,
    },
    DeleteServer {
        server_id: String,
    },
    SetMetadataItemOnServer {
        server_id: String,
        key: String,
        value: String,
    },
    AddNodesToClb {
        lb_id: String,
        /// (address, description) pairs to attach.
        address_configs: Vec<(String, ClbDescription)>,
    },
    RemoveNodesFromClb {
        lb_id: String,
        node_ids: Vec<String>,
    },
    ChangeClbNode {
        lb_id: String,
        node_id: String,
        condition: NodeCondition,
        weight: u16,
        node_type: NodeType,
    },
    BulkAddToRcv3 {
        /// (pool id, server id) pairs.
        lb_node_pairs: Vec<(String, String)>,
    },
    BulkRemoveFromRcv3 {
        lb_node_pairs: Vec<(String, String)>,
    },
}

impl Step {
    /// Deterministic ordering key: variant rank first, then the ids the
    /// step touches. The optimizer sorts by this so two planners with
    /// identical inputs emit identical output.
    pub fn sort_key(&self) -> (u8, String) {
        match self {
            Step::DeleteServer { server_id } => (0, server_id.clone()),
            Step::CreateServer { .. } => (1, String::new()),
            Step::SetMetadataItemOnServer { server_id, key, .. } => {
                (2, format!("{server_id}/{key}"))
            }
            Step::RemoveNodesFromClb { lb_id, .. } => (3, lb_id.clone()),
            Step::ChangeClbNode { lb_id, node_id, .. } => (4, format!("{lb_id}/{node_id}")),
            Step::AddNodesToClb { lb_id, .. } => (5, lb_id.clone()),
            Step::BulkRemoveFromRcv3 { .. } => (6, String::new()),
            Step::BulkAddToRcv3 { .. } => (7, String::new()),
        }
    }
}
