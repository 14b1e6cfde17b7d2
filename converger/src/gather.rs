// Copyright 2022 Toolchain Labs, Inc. All rights reserved.
// Licensed under the Apache License, Version 2.0 (see LICENSE).

use cloud_client::{CloudError, ServiceRequest, ServiceRequester, ServiceType};
use futures::future::try_join_all;
use model::{ClbNode, Rcv3Node, Server};
use serde_json::Value;

use crate::error::ConvergeError;
use crate::group::GROUP_ID_METADATA_KEY;

/// Everything the planner observes: the group's servers and the node
/// memberships of every balancer and RackConnect pool of the tenant.
#[derive(Clone, Debug, PartialEq, Eq, Default)]
pub struct ConvergenceData {
    pub servers: Vec<Server>,
    pub lb_nodes: Vec<ClbNode>,
    pub rcv3_nodes: Vec<Rcv3Node>,
}

/// Fetch all convergence data in parallel. A failure in any branch
/// surfaces as that branch's error, by value.
pub async fn get_all_convergence_data(
    requester: &dyn ServiceRequester,
    tenant_id: &str,
    group_id: &str,
) -> Result<ConvergenceData, ConvergeError> {
    let (servers, lb_nodes, rcv3_nodes) = futures::try_join!(
        fetch_group_servers(requester, tenant_id, group_id),
        fetch_all_clb_nodes(requester, tenant_id),
        fetch_rcv3_nodes(requester, tenant_id),
    )?;
    Ok(ConvergenceData {
        servers,
        lb_nodes,
        rcv3_nodes,
    })
}

fn array<'a>(body: &'a Value, key: &str) -> Vec<&'a Value> {
    body.get(key)
        .and_then(Value::as_array)
        .map(|values| values.iter().collect())
        .unwrap_or_default()
}

/// The tenant's servers that carry this group's ownership tag.
async fn fetch_group_servers(
    requester: &dyn ServiceRequester,
    tenant_id: &str,
    group_id: &str,
) -> Result<Vec<Server>, ConvergeError> {
    let (_, body) = requester
        .request(
            tenant_id,
            ServiceRequest::get(ServiceType::CloudServers, "servers/detail"),
        )
        .await?;
    array(&body, "servers")
        .into_iter()
        .filter(|value| Server::metadata_item(value, GROUP_ID_METADATA_KEY) == Some(group_id))
        .map(|value| Server::from_server_details_json(value).map_err(ConvergeError::from))
        .collect()
}

/// Node listings of every balancer the tenant has. Fetching all of them
/// (rather than only the desired ones) is what lets the planner remove
/// group-owned nodes from balancers the group no longer wants.
async fn fetch_all_clb_nodes(
    requester: &dyn ServiceRequester,
    tenant_id: &str,
) -> Result<Vec<ClbNode>, ConvergeError> {
    let (_, body) = requester
        .request(
            tenant_id,
            ServiceRequest::get(ServiceType::CloudLoadBalancers, "loadbalancers"),
        )
        .await?;
    let lb_ids: Vec<String> = array(&body, "loadBalancers")
        .into_iter()
        .filter_map(|lb| match lb.get("id") {
            Some(Value::String(s)) => Some(s.clone()),
            Some(Value::Number(n)) => Some(n.to_string()),
            _ => None,
        })
        .collect();

    let per_lb = try_join_all(lb_ids.iter().map(|lb_id| async move {
        let (_, body) = requester
            .request(
                tenant_id,
                ServiceRequest::get(
                    ServiceType::CloudLoadBalancers,
                    format!("loadbalancers/{lb_id}/nodes"),
                ),
            )
            .await?;
        array(&body, "nodes")
            .into_iter()
            .map(|node| ClbNode::from_node_json(lb_id, node).map_err(ConvergeError::from))
            .collect::<Result<Vec<_>, _>>()
    }))
    .await?;

    Ok(per_lb.into_iter().flatten().collect())
}

/// Observed (pool, server) pairs. Tenants without RackConnect get an
/// empty listing rather than an error.
async fn fetch_rcv3_nodes(
    requester: &dyn ServiceRequester,
    tenant_id: &str,
) -> Result<Vec<Rcv3Node>, ConvergeError> {
    let pools = requester
        .request(
            tenant_id,
            ServiceRequest::get(ServiceType::RackConnectV3, "load_balancer_pools"),
        )
        .await;
    let (_, body) = match pools {
        Err(CloudError::NoSuchEndpoint { .. }) => return Ok(Vec::new()),
        other => other?,
    };
    let pool_ids: Vec<String> = body
        .as_array()
        .map(|pools| {
            pools
                .iter()
                .filter_map(|pool| pool.get("id").and_then(Value::as_str))
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default();

    let per_pool = try_join_all(pool_ids.iter().map(|pool_id| async move {
        let (_, body) = requester
            .request(
                tenant_id,
                ServiceRequest::get(
                    ServiceType::RackConnectV3,
                    format!("load_balancer_pools/{pool_id}/nodes"),
                ),
            )
            .await?;
        let pairs: Vec<Rcv3Node> = body
            .as_array()
            .map(|nodes| {
                nodes
                    .iter()
                    .filter_map(|node| {
                        node.pointer("/cloud_server/id")
                            .and_then(Value::as_str)
                            .map(|server_id| Rcv3Node {
                                lb_id: pool_id.clone(),
                                server_id: server_id.to_string(),
                            })
                    })
                    .collect()
            })
            .unwrap_or_default();
        Ok::<_, ConvergeError>(pairs)
    }))
    .await?;

    Ok(per_pool.into_iter().flatten().collect())
}
