// Copyright 2022 Toolchain Labs, Inc. All rights reserved.
// Licensed under the Apache License, Version 2.0 (see LICENSE).

use std::collections::BTreeMap;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::clb::{opaque_id, ClbDescription};
use crate::ModelError;

/// Provider lifecycle state of a server.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "UPPERCASE")]
pub enum ServerState {
    Build,
    Active,
    Error,
    Deleted,
    Unknown,
}

impl ServerState {
    /// Map a provider status string. Unrecognized statuses never fail a
    /// fetch; they classify as `Unknown` and the planner treats the
    /// server as a delete candidate.
    pub fn from_provider(status: &str) -> Self {
        match status {
            "BUILD" => ServerState::Build,
            "ACTIVE" => ServerState::Active,
            "ERROR" => ServerState::Error,
            "DELETED" => ServerState::Deleted,
            _ => ServerState::Unknown,
        }
    }
}

/// An observed compute server together with the attachments its group
/// wants for it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Server {
    pub id: String,
    pub state: ServerState,
    pub created: DateTime<Utc>,
    pub image_id: String,
    pub flavor_id: String,
    /// Service-net address, once the provider has assigned one.
    pub servicenet_address: Option<String>,
    /// Load-balancer id to the descriptions declaring how this server
    /// should be attached to that balancer.
    pub desired_lbs: BTreeMap<String, Vec<ClbDescription>>,
}

impl Server {
    /// Build a server from one element of a `GET /servers/detail`
    /// response. Desired attachments are stamped on separately once the
    /// group's launch configuration is known.
    pub fn from_server_details_json(value: &Value) -> Result<Self, ModelError> {
        let id = opaque_id(value.get("id")).ok_or(ModelError::MissingField("id"))?;
        let status = value
            .get("status")
            .and_then(Value::as_str)
            .ok_or(ModelError::MissingField("status"))?;
        let created_raw = value
            .get("created")
            .and_then(Value::as_str)
            .ok_or(ModelError::MissingField("created"))?;
        let created = DateTime::parse_from_rfc3339(created_raw)
            .map_err(|_| ModelError::Invalid {
                field: "created",
                value: created_raw.to_string(),
            })?
            .with_timezone(&Utc);
        let image_id = opaque_id(value.pointer("/image/id")).unwrap_or_default();
        let flavor_id = opaque_id(value.pointer("/flavor/id")).unwrap_or_default();
        Ok(Server {
            id,
            state: ServerState::from_provider(status),
            created,
            image_id,
            flavor_id,
            servicenet_address: servicenet_address(value),
            desired_lbs: BTreeMap::new(),
        })
    }

    pub fn metadata_item<'a>(value: &'a Value, key: &str) -> Option<&'a str> {
        value
            .pointer("/metadata")
            .and_then(|m| m.get(key))
            .and_then(Value::as_str)
    }
}

/// First IPv4 address on the private (service-net) network, if any.
fn servicenet_address(value: &Value) -> Option<String> {
    value
        .pointer("/addresses/private")?
        .as_array()?
        .iter()
        .find(|entry| entry.get("version").and_then(Value::as_u64) == Some(4))
        .and_then(|entry| entry.get("addr"))
        .and_then(Value::as_str)
        .map(str::to_string)
}

/// Compact record stored in a group's active map.
pub fn server_to_json(server: &Server) -> Value {
    let mut body = json!({
        "id": server.id,
        "created": server.created.to_rfc3339_opts(SecondsFormat::Secs, true),
    });
    if let Some(address) = &server.servicenet_address {
        body["servicenet_address"] = json!(address);
    }
    body
}
