// Copyright 2022 Toolchain Labs, Inc. All rights reserved.
// Licensed under the Apache License, Version 2.0 (see LICENSE).

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::ModelError;

/// Condition of a load-balancer node, using the CLB wire spelling.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NodeCondition {
    Enabled,
    Disabled,
    Draining,
}

impl NodeCondition {
    fn from_wire(value: &str) -> Result<Self, ModelError> {
        match value {
            "ENABLED" => Ok(NodeCondition::Enabled),
            "DISABLED" => Ok(NodeCondition::Disabled),
            "DRAINING" => Ok(NodeCondition::Draining),
            other => Err(ModelError::Invalid {
                field: "condition",
                value: other.to_string(),
            }),
        }
    }
}

/// Type of a load-balancer node, using the CLB wire spelling.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NodeType {
    Primary,
    Secondary,
}

impl NodeType {
    fn from_wire(value: &str) -> Result<Self, ModelError> {
        match value {
            "PRIMARY" => Ok(NodeType::Primary),
            "SECONDARY" => Ok(NodeType::Secondary),
            other => Err(ModelError::Invalid {
                field: "type",
                value: other.to_string(),
            }),
        }
    }
}

/// How a server should be (or is) attached to one cloud load balancer.
///
/// Two descriptions are equivalent iff all fields are equal; that
/// equivalence decides whether an observed node already satisfies a
/// desired attachment.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ClbDescription {
    pub lb_id: String,
    pub port: u16,
    #[serde(default = "default_weight")]
    pub weight: u16,
    #[serde(default = "default_condition")]
    pub condition: NodeCondition,
    #[serde(default = "default_node_type", rename = "type")]
    pub node_type: NodeType,
}

fn default_weight() -> u16 {
    1
}

fn default_condition() -> NodeCondition {
    NodeCondition::Enabled
}

fn default_node_type() -> NodeType {
    NodeType::Primary
}

impl ClbDescription {
    pub fn new(lb_id: impl Into<String>, port: u16) -> Self {
        ClbDescription {
            lb_id: lb_id.into(),
            port,
            weight: default_weight(),
            condition: default_condition(),
            node_type: default_node_type(),
        }
    }

    /// Whether `other` differs only in fields the CLB API can update in
    /// place (weight, condition, type). A port difference requires a
    /// remove-and-add instead.
    pub fn same_immutable_fields(&self, other: &ClbDescription) -> bool {
        self.lb_id == other.lb_id && self.port == other.port
    }
}

/// An observed node on a cloud load balancer.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ClbNode {
    pub node_id: String,
    pub description: ClbDescription,
    pub address: String,
}

impl ClbNode {
    /// Build a node from one element of a `GET /loadbalancers/{id}/nodes`
    /// response. Node ids arrive as JSON numbers and are kept opaque as
    /// strings.
    pub fn from_node_json(lb_id: &str, value: &Value) -> Result<Self, ModelError> {
        let node_id = opaque_id(value.get("id")).ok_or(ModelError::MissingField("id"))?;
        let address = value
            .get("address")
            .and_then(Value::as_str)
            .ok_or(ModelError::MissingField("address"))?
            .to_string();
        let port = value
            .get("port")
            .and_then(Value::as_u64)
            .ok_or(ModelError::MissingField("port"))? as u16;
        let weight = value.get("weight").and_then(Value::as_u64).unwrap_or(1) as u16;
        let condition = match value.get("condition").and_then(Value::as_str) {
            Some(s) => NodeCondition::from_wire(s)?,
            None => default_condition(),
        };
        let node_type = match value.get("type").and_then(Value::as_str) {
            Some(s) => NodeType::from_wire(s)?,
            None => default_node_type(),
        };
        Ok(ClbNode {
            node_id,
            address,
            description: ClbDescription {
                lb_id: lb_id.to_string(),
                port,
                weight,
                condition,
                node_type,
            },
        })
    }
}

/// One observed (pool, server) attachment pair in RackConnect v3.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Rcv3Node {
    pub lb_id: String,
    pub server_id: String,
}

/// Provider ids are opaque but arrive as either strings or numbers.
pub(crate) fn opaque_id(value: Option<&Value>) -> Option<String> {
    match value {
        Some(Value::String(s)) => Some(s.clone()),
        Some(Value::Number(n)) => Some(n.to_string()),
        _ => None,
    }
}
