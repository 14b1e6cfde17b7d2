// Copyright 2022 Toolchain Labs, Inc. All rights reserved.
// Licensed under the Apache License, Version 2.0 (see LICENSE).

//! End-to-end convergence against a stateful fake provider: the world
//! is perturbed out of band and the converger puts it back.

mod common;

use std::sync::Arc;

use cloud_client::ServiceRequester;
use converger::{Converger, GroupInfo, LaunchConfig, MemoryGroupStore};
use divergence::{entry_name, mark_divergent, DivergentGroup, MemoryStore, Partitioner};
use model::{ClbDescription, GroupState};
use serde_json::json;
use svc_util::spec::SpecObserverWrapper;

use common::FakeCloud;

struct Harness {
    cloud: Arc<FakeCloud>,
    groups: MemoryGroupStore,
    store: MemoryStore,
    converger: Converger,
}

fn harness() -> Harness {
    let cloud = Arc::new(FakeCloud::new());
    let groups = MemoryGroupStore::new();
    let store = MemoryStore::new();
    let requester: Arc<dyn ServiceRequester> = cloud.clone();
    let converger = Converger::with_observer(
        requester,
        Arc::new(groups.clone()),
        Arc::new(store.clone()),
        Partitioner::for_worker(0, 1, 10),
        SpecObserverWrapper::new(Box::new(|_| {})),
    );
    Harness {
        cloud,
        groups,
        store,
        converger,
    }
}

fn web_group(desired: usize) -> GroupInfo {
    GroupInfo {
        state: GroupState::new("t1", "g1", "web", desired),
        launch: LaunchConfig {
            server: json!({"name": "web", "imageRef": "img", "flavorRef": "flv"}),
            load_balancers: vec![ClbDescription::new("23", 80)],
            rcv3_pools: Default::default(),
        },
    }
}

async fn converge(h: &Harness) {
    let stat = mark_divergent(&h.store, "t1", "g1").await.unwrap();
    let entry = DivergentGroup {
        tenant_id: "t1".to_string(),
        group_id: "g1".to_string(),
        version: stat.version,
    };
    let result = h
        .converger
        .converge_one_then_cleanup(&entry)
        .await
        .expect("not already converging");
    result.expect("convergence failed");
}

#[tokio::test]
async fn oob_node_deletion_is_healed() {
    let h = harness();
    h.groups.insert(web_group(1));
    h.cloud.add_server("srv-old", "g1", "10.0.0.1");
    h.cloud.add_lb("23");
    h.cloud.add_node("23", "node-old", "10.0.0.1", 80);

    // Someone deletes the node behind the autoscaler's back.
    h.cloud.remove_node_oob("23", "node-old");
    converge(&h).await;

    let nodes = h.cloud.nodes("23");
    assert_eq!(nodes.len(), 1);
    assert_eq!(nodes[0]["address"], json!("10.0.0.1"));
    assert_eq!(nodes[0]["port"], json!(80));
    assert_ne!(nodes[0]["id"], json!("node-old"));

    // The registry entry was cleared.
    assert!(h.store.content(&entry_name("t1", "g1")).is_none());
}

#[tokio::test]
async fn non_autoscale_nodes_survive_convergence() {
    let h = harness();
    h.groups.insert(web_group(1));
    h.cloud.add_server("srv-1", "g1", "10.0.0.1");
    h.cloud.add_lb("23");
    // Two pre-existing nodes that belong to someone else.
    h.cloud.add_node("23", "node-a", "5.5.5.5", 80);
    h.cloud.add_node("23", "node-b", "6.6.6.6", 80);

    // First convergence attaches the group's server as node C.
    converge(&h).await;
    let node_c = h
        .cloud
        .nodes("23")
        .into_iter()
        .find(|node| node["address"] == json!("10.0.0.1"))
        .expect("autoscale node added");
    let node_b_before = h
        .cloud
        .nodes("23")
        .into_iter()
        .find(|node| node["id"] == json!("node-b"))
        .unwrap();

    // Delete the foreign node A and the autoscale node C out of band.
    h.cloud.remove_node_oob("23", "node-a");
    h.cloud
        .remove_node_oob("23", node_c["id"].as_str().unwrap());
    converge(&h).await;

    let nodes = h.cloud.nodes("23");
    assert_eq!(nodes.len(), 2, "exactly B and the re-added C: {nodes:?}");

    // B is byte-identical to its original entry.
    let node_b_after = nodes
        .iter()
        .find(|node| node["id"] == json!("node-b"))
        .expect("foreign node B untouched");
    assert_eq!(*node_b_after, node_b_before);

    // C was re-created with the same description but a fresh id.
    let node_c_after = nodes
        .iter()
        .find(|node| node["address"] == json!("10.0.0.1"))
        .expect("autoscale node re-added");
    for field in ["address", "port", "weight", "type", "condition"] {
        assert_eq!(node_c_after[field], node_c[field], "field {field}");
    }
    assert_ne!(node_c_after["id"], node_c["id"]);

    // A stays gone: the converger never re-creates foreign nodes.
    assert!(nodes.iter().all(|node| node["id"] != json!("node-a")));
}

#[tokio::test]
async fn scale_up_from_zero_converges_over_cycles() {
    let h = harness();
    h.groups.insert(web_group(2));
    h.cloud.add_lb("23");

    // Cycle 1: create the servers.
    converge(&h).await;
    assert_eq!(h.cloud.server_ids().len(), 2);
    assert!(h.cloud.nodes("23").is_empty());

    // Cycle 2: attach them to the balancer.
    converge(&h).await;
    assert_eq!(h.cloud.nodes("23").len(), 2);

    // Cycle 3: nothing left to do; the active map now reflects both.
    converge(&h).await;
    let state = h.groups.state("t1", "g1").unwrap();
    assert_eq!(state.active.len(), 2);
    assert_eq!(h.cloud.server_ids().len(), 2);
    assert_eq!(h.cloud.nodes("23").len(), 2);
}

#[tokio::test]
async fn scale_down_removes_newest_and_its_node() {
    let h = harness();
    h.groups.insert(web_group(1));
    h.cloud.add_lb("23");
    h.cloud.add_server("srv-1", "g1", "10.0.0.1");
    h.cloud.add_server("srv-2", "g1", "10.0.0.2");
    h.cloud.add_node("23", "node-1", "10.0.0.1", 80);
    h.cloud.add_node("23", "node-2", "10.0.0.2", 80);

    converge(&h).await;

    // One server and its node are gone; the survivor is intact.
    assert_eq!(h.cloud.server_ids().len(), 1);
    let nodes = h.cloud.nodes("23");
    assert_eq!(nodes.len(), 1);
}
