// Copyright 2022 Toolchain Labs, Inc. All rights reserved.
// Licensed under the Apache License, Version 2.0 (see LICENSE).

//! Builders for observed-world values, shared by this crate's tests and
//! downstream crates'.

use std::collections::BTreeMap;

use chrono::{DateTime, TimeZone, Utc};
use model::{ClbDescription, ClbNode, Server, ServerState};

pub fn created_at(seconds: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(seconds, 0).unwrap()
}

/// A server in the given state with defaults for everything else.
pub fn server(id: &str, state: ServerState) -> Server {
    Server {
        id: id.to_string(),
        state,
        created: created_at(0),
        image_id: "image".to_string(),
        flavor_id: "flavor".to_string(),
        servicenet_address: None,
        desired_lbs: BTreeMap::new(),
    }
}

pub fn server_at(id: &str, state: ServerState, address: &str) -> Server {
    Server {
        servicenet_address: Some(address.to_string()),
        ..server(id, state)
    }
}

/// Group descriptions by load-balancer id, the shape `Server.desired_lbs`
/// wants.
pub fn desired_lbs(descs: &[ClbDescription]) -> BTreeMap<String, Vec<ClbDescription>> {
    let mut by_lb: BTreeMap<String, Vec<ClbDescription>> = BTreeMap::new();
    for desc in descs {
        by_lb.entry(desc.lb_id.clone()).or_default().push(desc.clone());
    }
    by_lb
}

pub fn node(node_id: &str, address: &str, description: ClbDescription) -> ClbNode {
    ClbNode {
        node_id: node_id.to_string(),
        description,
        address: address.to_string(),
    }
}
