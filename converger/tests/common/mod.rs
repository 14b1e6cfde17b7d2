// Copyright 2022 Toolchain Labs, Inc. All rights reserved.
// Licensed under the Apache License, Version 2.0 (see LICENSE).

//! A stateful fake of the provider APIs: applies writes to an
//! in-memory world and serves reads from it, so convergence can be
//! exercised end to end.

use std::collections::BTreeMap;

use async_trait::async_trait;
use cloud_client::{CloudError, ServiceRequest, ServiceRequester, ServiceType};
use parking_lot::Mutex;
use serde_json::{json, Value};

#[derive(Default)]
pub struct CloudState {
    /// Server detail objects, as the compute API would render them.
    pub servers: Vec<Value>,
    /// Balancer id to its node objects.
    pub lbs: BTreeMap<String, Vec<Value>>,
    next_id: u64,
}

impl CloudState {
    fn fresh_id(&mut self, prefix: &str) -> String {
        self.next_id += 1;
        format!("{prefix}-{}", self.next_id)
    }
}

#[derive(Default)]
pub struct FakeCloud {
    pub state: Mutex<CloudState>,
}

impl FakeCloud {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_server(&self, id: &str, group_id: &str, address: &str) {
        self.state.lock().servers.push(json!({
            "id": id,
            "status": "ACTIVE",
            "created": "2015-06-01T12:00:00Z",
            "image": {"id": "img"},
            "flavor": {"id": "flv"},
            "addresses": {"private": [{"addr": address, "version": 4}]},
            "metadata": {"autoscale:group-id": group_id},
        }));
    }

    pub fn add_lb(&self, lb_id: &str) {
        self.state.lock().lbs.entry(lb_id.to_string()).or_default();
    }

    pub fn add_node(&self, lb_id: &str, node_id: &str, address: &str, port: u16) {
        self.state
            .lock()
            .lbs
            .entry(lb_id.to_string())
            .or_default()
            .push(json!({
                "id": node_id,
                "address": address,
                "port": port,
                "condition": "ENABLED",
                "type": "PRIMARY",
                "weight": 1,
            }));
    }

    /// Out-of-band node removal, as a human or another system would do.
    pub fn remove_node_oob(&self, lb_id: &str, node_id: &str) {
        if let Some(nodes) = self.state.lock().lbs.get_mut(lb_id) {
            nodes.retain(|node| node["id"] != json!(node_id));
        }
    }

    pub fn nodes(&self, lb_id: &str) -> Vec<Value> {
        self.state
            .lock()
            .lbs
            .get(lb_id)
            .cloned()
            .unwrap_or_default()
    }

    pub fn server_ids(&self) -> Vec<String> {
        self.state
            .lock()
            .servers
            .iter()
            .filter_map(|server| server["id"].as_str().map(str::to_string))
            .collect()
    }

    fn unexpected(req: &ServiceRequest) -> CloudError {
        CloudError::Request(format!("FakeCloud: unhandled request {req:?}"))
    }

    fn compute(&self, req: &ServiceRequest) -> Result<(u16, Value), CloudError> {
        let mut state = self.state.lock();
        let segments: Vec<&str> = req.path.split('/').collect();
        match (req.method.as_str(), segments.as_slice()) {
            ("GET", ["servers", "detail"]) => {
                Ok((200, json!({"servers": state.servers.clone()})))
            }
            ("POST", ["servers"]) => {
                let template = req
                    .body
                    .as_ref()
                    .and_then(|body| body.get("server"))
                    .cloned()
                    .ok_or_else(|| Self::unexpected(req))?;
                let id = state.fresh_id("srv");
                let address = format!("10.0.0.{}", state.next_id);
                state.servers.push(json!({
                    "id": id.clone(),
                    "status": "ACTIVE",
                    "created": "2015-06-01T12:00:00Z",
                    "image": {"id": "img"},
                    "flavor": {"id": "flv"},
                    "addresses": {"private": [{"addr": address, "version": 4}]},
                    "metadata": template.get("metadata").cloned().unwrap_or(json!({})),
                }));
                Ok((202, json!({"server": {"id": id}})))
            }
            ("DELETE", ["servers", server_id]) => {
                let before = state.servers.len();
                state.servers.retain(|server| server["id"] != json!(server_id));
                if state.servers.len() == before {
                    return Err(CloudError::NoSuchServer {
                        server_id: server_id.to_string(),
                    });
                }
                Ok((204, Value::String(String::new())))
            }
            _ => Err(Self::unexpected(req)),
        }
    }

    fn clb(&self, req: &ServiceRequest) -> Result<(u16, Value), CloudError> {
        let mut state = self.state.lock();
        let segments: Vec<&str> = req.path.split('/').collect();
        match (req.method.as_str(), segments.as_slice()) {
            ("GET", ["loadbalancers"]) => {
                let lbs: Vec<Value> = state.lbs.keys().map(|id| json!({"id": id})).collect();
                Ok((200, json!({"loadBalancers": lbs})))
            }
            ("GET", ["loadbalancers", lb_id, "nodes"]) => {
                let nodes = state
                    .lbs
                    .get(*lb_id)
                    .cloned()
                    .ok_or_else(|| CloudError::NoSuchClb {
                        lb_id: lb_id.to_string(),
                    })?;
                Ok((200, json!({"nodes": nodes})))
            }
            ("POST", ["loadbalancers", lb_id, "nodes"]) => {
                let payloads = req
                    .body
                    .as_ref()
                    .and_then(|body| body.get("nodes"))
                    .and_then(Value::as_array)
                    .cloned()
                    .ok_or_else(|| Self::unexpected(req))?;
                let mut created = Vec::new();
                for payload in payloads {
                    let id = state.fresh_id("node");
                    let mut node = payload.clone();
                    node["id"] = json!(id);
                    state
                        .lbs
                        .entry(lb_id.to_string())
                        .or_default()
                        .push(node.clone());
                    created.push(node);
                }
                Ok((202, json!({"nodes": created})))
            }
            ("DELETE", ["loadbalancers", lb_id, "nodes"]) => {
                let doomed: Vec<&String> = req
                    .params
                    .iter()
                    .filter(|(name, _)| name == "id")
                    .map(|(_, id)| id)
                    .collect();
                if let Some(nodes) = state.lbs.get_mut(*lb_id) {
                    nodes.retain(|node| {
                        !doomed
                            .iter()
                            .any(|id| node["id"] == json!(id))
                    });
                }
                Ok((202, Value::String(String::new())))
            }
            ("PUT", ["loadbalancers", lb_id, "nodes", node_id]) => {
                let update = req
                    .body
                    .as_ref()
                    .and_then(|body| body.get("node"))
                    .cloned()
                    .ok_or_else(|| Self::unexpected(req))?;
                if let Some(nodes) = state.lbs.get_mut(*lb_id) {
                    for node in nodes.iter_mut() {
                        if node["id"] == json!(node_id) {
                            for key in ["condition", "weight", "type"] {
                                if let Some(value) = update.get(key) {
                                    node[key] = value.clone();
                                }
                            }
                        }
                    }
                }
                Ok((202, Value::String(String::new())))
            }
            _ => Err(Self::unexpected(req)),
        }
    }
}

#[async_trait]
impl ServiceRequester for FakeCloud {
    async fn request(
        &self,
        _tenant_id: &str,
        req: ServiceRequest,
    ) -> Result<(u16, Value), CloudError> {
        match req.service_type {
            ServiceType::CloudServers => self.compute(&req),
            ServiceType::CloudLoadBalancers => self.clb(&req),
            ServiceType::RackConnectV3 => Err(CloudError::NoSuchEndpoint {
                service: "rackconnect_v3".to_string(),
                region: "TEST".to_string(),
            }),
        }
    }
}
