// Copyright 2022 Toolchain Labs, Inc. All rights reserved.
// Licensed under the Apache License, Version 2.0 (see LICENSE).

use std::collections::{HashMap, HashSet};

use model::{ClbNode, DesiredGroupState, Rcv3Node, Server, Step};

/// Reconcile CLB membership for the group's servers.
///
/// `remaining` are the servers the group is keeping; `doomed` are the
/// servers a `DeleteServer` is being emitted for in the same batch.
/// Only nodes whose address belongs to one of the group's servers are
/// ever touched; everything else on the balancer is foreign.
pub(crate) fn clb_steps(
    remaining: &[&Server],
    doomed: &[&Server],
    lb_nodes: &[ClbNode],
) -> Vec<Step> {
    let mut steps = Vec::new();

    let remaining_by_address: HashMap<&str, &Server> = remaining
        .iter()
        .filter_map(|s| s.servicenet_address.as_deref().map(|a| (a, *s)))
        .collect();
    let doomed_addresses: HashSet<&str> = doomed
        .iter()
        .filter_map(|s| s.servicenet_address.as_deref())
        .collect();

    // Missing attachments become adds; attachments that differ only in
    // mutable fields (weight, condition, type) become in-place changes.
    for server in remaining {
        let address = match server.servicenet_address.as_deref() {
            Some(address) => address,
            // Still waiting for the provider to assign one.
            None => continue,
        };
        for desc in server.desired_lbs.values().flatten() {
            let at_site: Vec<&ClbNode> = lb_nodes
                .iter()
                .filter(|n| n.description.lb_id == desc.lb_id && n.address == address)
                .collect();
            if at_site.iter().any(|n| n.description == *desc) {
                continue;
            }
            if let Some(node) = at_site
                .iter()
                .find(|n| n.description.same_immutable_fields(desc))
            {
                steps.push(Step::ChangeClbNode {
                    lb_id: desc.lb_id.clone(),
                    node_id: node.node_id.clone(),
                    condition: desc.condition,
                    weight: desc.weight,
                    node_type: desc.node_type,
                });
            } else {
                steps.push(Step::AddNodesToClb {
                    lb_id: desc.lb_id.clone(),
                    address_configs: vec![(address.to_string(), desc.clone())],
                });
            }
        }
    }

    // Group-owned nodes whose server is going away, or which no desired
    // description accounts for, are removed.
    for node in lb_nodes {
        let keep = if let Some(server) = remaining_by_address.get(node.address.as_str()) {
            server
                .desired_lbs
                .get(&node.description.lb_id)
                .map_or(false, |descs| {
                    descs
                        .iter()
                        .any(|desc| desc.same_immutable_fields(&node.description))
                })
        } else if doomed_addresses.contains(node.address.as_str()) {
            false
        } else {
            // Not owned by autoscale.
            continue;
        };
        if !keep {
            steps.push(Step::RemoveNodesFromClb {
                lb_id: node.description.lb_id.clone(),
                node_ids: vec![node.node_id.clone()],
            });
        }
    }

    steps
}

/// Reconcile RackConnect v3 pool membership as bulk pair operations.
pub(crate) fn rcv3_steps(
    desired: &DesiredGroupState,
    remaining: &[&Server],
    doomed: &[&Server],
    rcv3_nodes: &[Rcv3Node],
) -> Vec<Step> {
    let remaining_ids: HashSet<&str> = remaining.iter().map(|s| s.id.as_str()).collect();
    let doomed_ids: HashSet<&str> = doomed.iter().map(|s| s.id.as_str()).collect();
    let observed: HashSet<(&str, &str)> = rcv3_nodes
        .iter()
        .map(|n| (n.lb_id.as_str(), n.server_id.as_str()))
        .collect();

    let mut adds = Vec::new();
    for pool in &desired.rcv3_pools {
        for server in remaining {
            if !observed.contains(&(pool.as_str(), server.id.as_str())) {
                adds.push((pool.clone(), server.id.clone()));
            }
        }
    }

    let mut removes = Vec::new();
    for node in rcv3_nodes {
        let server_id = node.server_id.as_str();
        if doomed_ids.contains(server_id) {
            removes.push((node.lb_id.clone(), node.server_id.clone()));
        } else if remaining_ids.contains(server_id) && !desired.rcv3_pools.contains(&node.lb_id) {
            removes.push((node.lb_id.clone(), node.server_id.clone()));
        }
        // Pairs for servers outside the group are foreign.
    }

    let mut steps = Vec::new();
    if !removes.is_empty() {
        steps.push(Step::BulkRemoveFromRcv3 {
            lb_node_pairs: removes,
        });
    }
    if !adds.is_empty() {
        steps.push(Step::BulkAddToRcv3 {
            lb_node_pairs: adds,
        });
    }
    steps
}

#[cfg(test)]
mod tests {
    use model::{ClbDescription, NodeCondition, NodeType, ServerState, Step};

    use super::clb_steps;
    use crate::testutil::{desired_lbs, node, server_at};

    #[test]
    fn weight_difference_becomes_in_place_change() {
        let desc = ClbDescription::new("23", 80);
        let server = model::Server {
            desired_lbs: desired_lbs(&[desc.clone()]),
            ..server_at("a", ServerState::Active, "10.0.0.1")
        };
        let observed = node(
            "n1",
            "10.0.0.1",
            ClbDescription {
                weight: 5,
                ..desc
            },
        );
        let steps = clb_steps(&[&server], &[], &[observed]);
        assert_eq!(
            steps,
            vec![Step::ChangeClbNode {
                lb_id: "23".to_string(),
                node_id: "n1".to_string(),
                condition: NodeCondition::Enabled,
                weight: 1,
                node_type: NodeType::Primary,
            }]
        );
    }

    #[test]
    fn condition_difference_becomes_in_place_change() {
        let desc = ClbDescription::new("23", 80);
        let server = model::Server {
            desired_lbs: desired_lbs(&[desc.clone()]),
            ..server_at("a", ServerState::Active, "10.0.0.1")
        };
        let observed = node(
            "n1",
            "10.0.0.1",
            ClbDescription {
                condition: NodeCondition::Draining,
                ..desc
            },
        );
        let steps = clb_steps(&[&server], &[], &[observed]);
        assert_eq!(steps.len(), 1);
        assert!(matches!(steps[0], Step::ChangeClbNode { .. }));
    }

    #[test]
    fn port_difference_becomes_remove_and_add() {
        let desc = ClbDescription::new("23", 80);
        let server = model::Server {
            desired_lbs: desired_lbs(&[desc.clone()]),
            ..server_at("a", ServerState::Active, "10.0.0.1")
        };
        let observed = node(
            "n1",
            "10.0.0.1",
            ClbDescription::new("23", 8080),
        );
        let steps = clb_steps(&[&server], &[], &[observed]);
        assert_eq!(
            steps,
            vec![
                Step::AddNodesToClb {
                    lb_id: "23".to_string(),
                    address_configs: vec![("10.0.0.1".to_string(), desc)],
                },
                Step::RemoveNodesFromClb {
                    lb_id: "23".to_string(),
                    node_ids: vec!["n1".to_string()],
                },
            ]
        );
    }

    #[test]
    fn nodes_of_doomed_servers_are_removed() {
        let desc = ClbDescription::new("23", 80);
        let doomed = model::Server {
            desired_lbs: desired_lbs(&[desc.clone()]),
            ..server_at("dying", ServerState::Error, "10.0.0.9")
        };
        let observed = node("n9", "10.0.0.9", desc);
        let steps = clb_steps(&[], &[&doomed], &[observed]);
        assert_eq!(
            steps,
            vec![Step::RemoveNodesFromClb {
                lb_id: "23".to_string(),
                node_ids: vec!["n9".to_string()],
            }]
        );
    }

    #[test]
    fn undesired_lb_membership_is_removed() {
        // The server exists but its group no longer wants it on LB 42.
        let server = server_at("a", ServerState::Active, "10.0.0.1");
        let observed = node("n1", "10.0.0.1", ClbDescription::new("42", 80));
        let steps = clb_steps(&[&server], &[], &[observed]);
        assert_eq!(
            steps,
            vec![Step::RemoveNodesFromClb {
                lb_id: "42".to_string(),
                node_ids: vec!["n1".to_string()],
            }]
        );
    }

    #[test]
    fn servers_without_an_address_wait() {
        let desc = ClbDescription::new("23", 80);
        let mut building = server_at("a", ServerState::Build, "ignored");
        building.servicenet_address = None;
        building.desired_lbs = desired_lbs(&[desc]);
        assert_eq!(clb_steps(&[&building], &[], &[]), vec![]);
    }
}
