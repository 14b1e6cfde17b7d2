// Copyright 2022 Toolchain Labs, Inc. All rights reserved.
// Licensed under the Apache License, Version 2.0 (see LICENSE).

use std::collections::BTreeMap;

use cloud_client::{CloudError, ServiceRequest, ServiceRequester, ServiceType};
use http::Method;
use model::{ClbDescription, Step};
use serde_json::{json, Value};

fn node_payload(address: &str, desc: &ClbDescription) -> Value {
    json!({
        "address": address,
        "port": desc.port,
        "condition": desc.condition,
        "type": desc.node_type,
        "weight": desc.weight,
    })
}

fn rcv3_pairs_payload(pairs: &[(String, String)]) -> Value {
    Value::Array(
        pairs
            .iter()
            .map(|(pool_id, server_id)| {
                json!({
                    "load_balancer_pool": {"id": pool_id},
                    "cloud_server": {"id": server_id},
                })
            })
            .collect(),
    )
}

/// The single provider request a step executes as.
pub fn step_to_request(step: &Step) -> ServiceRequest {
    match step {
        Step::CreateServer { server_config } => ServiceRequest::new(
            ServiceType::CloudServers,
            Method::POST,
            "servers",
        )
        .with_body(json!({"server": server_config}))
        .with_success_codes(&[202]),
        Step::DeleteServer { server_id } => ServiceRequest::new(
            ServiceType::CloudServers,
            Method::DELETE,
            format!("servers/{server_id}"),
        )
        .with_success_codes(&[204])
        .with_json_response(false),
        Step::SetMetadataItemOnServer {
            server_id,
            key,
            value,
        } => {
            let mut meta = serde_json::Map::new();
            meta.insert(key.clone(), Value::String(value.clone()));
            ServiceRequest::new(
                ServiceType::CloudServers,
                Method::PUT,
                format!("servers/{server_id}/metadata/{key}"),
            )
            .with_body(json!({"meta": meta}))
        }
        Step::AddNodesToClb {
            lb_id,
            address_configs,
        } => ServiceRequest::new(
            ServiceType::CloudLoadBalancers,
            Method::POST,
            format!("loadbalancers/{lb_id}/nodes"),
        )
        .with_body(json!({
            "nodes": address_configs
                .iter()
                .map(|(address, desc)| node_payload(address, desc))
                .collect::<Vec<_>>(),
        }))
        .with_success_codes(&[202]),
        Step::RemoveNodesFromClb { lb_id, node_ids } => ServiceRequest::new(
            ServiceType::CloudLoadBalancers,
            Method::DELETE,
            format!("loadbalancers/{lb_id}/nodes"),
        )
        .with_params(
            node_ids
                .iter()
                .map(|node_id| ("id".to_string(), node_id.clone()))
                .collect(),
        )
        .with_success_codes(&[202])
        .with_json_response(false),
        Step::ChangeClbNode {
            lb_id,
            node_id,
            condition,
            weight,
            node_type,
        } => ServiceRequest::new(
            ServiceType::CloudLoadBalancers,
            Method::PUT,
            format!("loadbalancers/{lb_id}/nodes/{node_id}"),
        )
        .with_body(json!({
            "node": {"condition": condition, "weight": weight, "type": node_type},
        }))
        .with_success_codes(&[202])
        .with_json_response(false),
        Step::BulkAddToRcv3 { lb_node_pairs } => ServiceRequest::new(
            ServiceType::RackConnectV3,
            Method::POST,
            "load_balancer_pools/nodes",
        )
        .with_body(rcv3_pairs_payload(lb_node_pairs))
        .with_success_codes(&[201]),
        Step::BulkRemoveFromRcv3 { lb_node_pairs } => ServiceRequest::new(
            ServiceType::RackConnectV3,
            Method::DELETE,
            "load_balancer_pools/nodes",
        )
        .with_body(rcv3_pairs_payload(lb_node_pairs))
        .with_success_codes(&[204])
        .with_json_response(false),
    }
}

/// Serialization lane for a step. Steps in different lanes run
/// concurrently; steps in the same lane run in planner order.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
enum LaneKey {
    Independent(usize),
    Clb(String),
    Rcv3,
}

fn lane_key(index: usize, step: &Step) -> LaneKey {
    match step {
        Step::AddNodesToClb { lb_id, .. }
        | Step::RemoveNodesFromClb { lb_id, .. }
        | Step::ChangeClbNode { lb_id, .. } => LaneKey::Clb(lb_id.clone()),
        Step::BulkAddToRcv3 { .. } | Step::BulkRemoveFromRcv3 { .. } => LaneKey::Rcv3,
        _ => LaneKey::Independent(index),
    }
}

/// Execute a step list: parallel across lanes (distinct balancers,
/// distinct servers), sequential within a balancer. The result bodies
/// come back in step order; the first failing request fails the whole
/// batch with its own error.
pub async fn execute_steps(
    requester: &dyn ServiceRequester,
    tenant_id: &str,
    steps: &[Step],
) -> Result<Vec<Value>, CloudError> {
    let mut lanes: BTreeMap<LaneKey, Vec<usize>> = BTreeMap::new();
    for (index, step) in steps.iter().enumerate() {
        lanes.entry(lane_key(index, step)).or_default().push(index);
    }

    let lane_results = futures::future::try_join_all(lanes.into_values().map(|indexes| async move {
        let mut results = Vec::with_capacity(indexes.len());
        for index in indexes {
            let (_, body) = requester
                .request(tenant_id, step_to_request(&steps[index]))
                .await?;
            results.push((index, body));
        }
        Ok::<_, CloudError>(results)
    }))
    .await?;

    let mut indexed: Vec<(usize, Value)> = lane_results.into_iter().flatten().collect();
    indexed.sort_by_key(|(index, _)| *index);
    Ok(indexed.into_iter().map(|(_, body)| body).collect())
}
