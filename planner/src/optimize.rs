// Copyright 2022 Toolchain Labs, Inc. All rights reserved.
// Licensed under the Apache License, Version 2.0 (see LICENSE).

use std::collections::{BTreeMap, BTreeSet};

use itertools::Itertools;
use model::{ClbDescription, NodeCondition, NodeType, Step};

/// Merge, dedupe and order a step list.
///
/// Per-balancer adds collapse into one bulk add and removes into one
/// bulk remove; an in-place change whose node is also being removed is
/// dropped; RCv3 pair operations merge into single bulk steps. The
/// output is sorted by [`Step::sort_key`], so optimizing is idempotent
/// and two identical inputs optimize identically.
pub fn optimize(steps: Vec<Step>) -> Vec<Step> {
    let mut creates: Vec<Step> = Vec::new();
    let mut deletes: BTreeSet<String> = BTreeSet::new();
    let mut metadata: BTreeSet<(String, String, String)> = BTreeSet::new();
    let mut adds: BTreeMap<String, BTreeSet<(String, ClbDescription)>> = BTreeMap::new();
    let mut removes: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
    let mut changes: Vec<(String, String, NodeCondition, u16, NodeType)> = Vec::new();
    let mut rcv3_adds: BTreeSet<(String, String)> = BTreeSet::new();
    let mut rcv3_removes: BTreeSet<(String, String)> = BTreeSet::new();

    for step in steps {
        match step {
            Step::CreateServer { .. } => creates.push(step),
            Step::DeleteServer { server_id } => {
                deletes.insert(server_id);
            }
            Step::SetMetadataItemOnServer {
                server_id,
                key,
                value,
            } => {
                metadata.insert((server_id, key, value));
            }
            Step::AddNodesToClb {
                lb_id,
                address_configs,
            } => {
                adds.entry(lb_id).or_default().extend(address_configs);
            }
            Step::RemoveNodesFromClb { lb_id, node_ids } => {
                removes.entry(lb_id).or_default().extend(node_ids);
            }
            Step::ChangeClbNode {
                lb_id,
                node_id,
                condition,
                weight,
                node_type,
            } => {
                changes.push((lb_id, node_id, condition, weight, node_type));
            }
            Step::BulkAddToRcv3 { lb_node_pairs } => {
                rcv3_adds.extend(lb_node_pairs);
            }
            Step::BulkRemoveFromRcv3 { lb_node_pairs } => {
                rcv3_removes.extend(lb_node_pairs);
            }
        }
    }

    // A change immediately undone by a remove is dead weight.
    changes.retain(|(lb_id, node_id, ..)| {
        removes
            .get(lb_id)
            .map_or(true, |node_ids| !node_ids.contains(node_id))
    });

    let mut out: Vec<Step> = Vec::new();
    out.extend(deletes.into_iter().map(|server_id| Step::DeleteServer { server_id }));
    out.extend(creates);
    out.extend(
        metadata
            .into_iter()
            .map(|(server_id, key, value)| Step::SetMetadataItemOnServer {
                server_id,
                key,
                value,
            }),
    );
    out.extend(removes.into_iter().map(|(lb_id, node_ids)| {
        Step::RemoveNodesFromClb {
            lb_id,
            node_ids: node_ids.into_iter().collect(),
        }
    }));
    out.extend(
        changes
            .into_iter()
            .sorted()
            .dedup()
            .map(|(lb_id, node_id, condition, weight, node_type)| Step::ChangeClbNode {
                lb_id,
                node_id,
                condition,
                weight,
                node_type,
            }),
    );
    out.extend(adds.into_iter().map(|(lb_id, address_configs)| {
        Step::AddNodesToClb {
            lb_id,
            address_configs: address_configs.into_iter().collect(),
        }
    }));
    if !rcv3_removes.is_empty() {
        out.push(Step::BulkRemoveFromRcv3 {
            lb_node_pairs: rcv3_removes.into_iter().collect(),
        });
    }
    if !rcv3_adds.is_empty() {
        out.push(Step::BulkAddToRcv3 {
            lb_node_pairs: rcv3_adds.into_iter().collect(),
        });
    }

    out.sort_by_key(Step::sort_key);
    out
}

#[cfg(test)]
mod tests {
    use model::{ClbDescription, NodeCondition, NodeType, Step};

    use super::optimize;

    fn add(lb_id: &str, address: &str, port: u16) -> Step {
        Step::AddNodesToClb {
            lb_id: lb_id.to_string(),
            address_configs: vec![(address.to_string(), ClbDescription::new(lb_id, port))],
        }
    }

    fn remove(lb_id: &str, node_id: &str) -> Step {
        Step::RemoveNodesFromClb {
            lb_id: lb_id.to_string(),
            node_ids: vec![node_id.to_string()],
        }
    }

    #[test]
    fn same_lb_adds_merge_into_one_bulk_add() {
        let steps = optimize(vec![
            add("23", "10.0.0.2", 80),
            add("23", "10.0.0.1", 80),
            add("42", "10.0.0.1", 80),
        ]);
        assert_eq!(
            steps,
            vec![
                Step::AddNodesToClb {
                    lb_id: "23".to_string(),
                    address_configs: vec![
                        ("10.0.0.1".to_string(), ClbDescription::new("23", 80)),
                        ("10.0.0.2".to_string(), ClbDescription::new("23", 80)),
                    ],
                },
                Step::AddNodesToClb {
                    lb_id: "42".to_string(),
                    address_configs: vec![(
                        "10.0.0.1".to_string(),
                        ClbDescription::new("42", 80)
                    )],
                },
            ]
        );
    }

    #[test]
    fn same_lb_removes_merge_and_dedupe() {
        let steps = optimize(vec![
            remove("23", "n2"),
            remove("23", "n1"),
            remove("23", "n2"),
        ]);
        assert_eq!(
            steps,
            vec![Step::RemoveNodesFromClb {
                lb_id: "23".to_string(),
                node_ids: vec!["n1".to_string(), "n2".to_string()],
            }]
        );
    }

    #[test]
    fn change_followed_by_remove_collapses_to_remove() {
        let change = Step::ChangeClbNode {
            lb_id: "23".to_string(),
            node_id: "n1".to_string(),
            condition: NodeCondition::Enabled,
            weight: 2,
            node_type: NodeType::Primary,
        };
        let steps = optimize(vec![change, remove("23", "n1")]);
        assert_eq!(
            steps,
            vec![Step::RemoveNodesFromClb {
                lb_id: "23".to_string(),
                node_ids: vec!["n1".to_string()],
            }]
        );
    }

    #[test]
    fn removes_order_before_adds() {
        let steps = optimize(vec![add("23", "10.0.0.1", 80), remove("23", "n1")]);
        assert!(matches!(steps[0], Step::RemoveNodesFromClb { .. }));
        assert!(matches!(steps[1], Step::AddNodesToClb { .. }));
    }

    #[test]
    fn rcv3_bulks_merge() {
        let steps = optimize(vec![
            Step::BulkAddToRcv3 {
                lb_node_pairs: vec![("p1".to_string(), "b".to_string())],
            },
            Step::BulkAddToRcv3 {
                lb_node_pairs: vec![("p1".to_string(), "a".to_string())],
            },
        ]);
        assert_eq!(
            steps,
            vec![Step::BulkAddToRcv3 {
                lb_node_pairs: vec![
                    ("p1".to_string(), "a".to_string()),
                    ("p1".to_string(), "b".to_string()),
                ],
            }]
        );
    }

    #[test]
    fn optimizing_twice_is_the_same_as_once() {
        let steps = vec![
            add("23", "10.0.0.2", 80),
            add("23", "10.0.0.1", 80),
            remove("23", "n7"),
            Step::DeleteServer {
                server_id: "b".to_string(),
            },
            Step::DeleteServer {
                server_id: "a".to_string(),
            },
            Step::CreateServer {
                server_config: serde_json::json!({"name": "foo"}),
            },
        ];
        let once = optimize(steps);
        let twice = optimize(once.clone());
        assert_eq!(once, twice);
    }
}
