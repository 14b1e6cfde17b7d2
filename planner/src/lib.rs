// Copyright 2022 Toolchain Labs, Inc. All rights reserved.
// Licensed under the Apache License, Version 2.0 (see LICENSE).

//! The convergence planner: a pure function from (desired, observed)
//! to an ordered, optimized list of remediation steps.
//!
//! The planner never suspends and touches no external state, so two
//! planners with identical inputs produce identical outputs, and
//! applying the plan to the observed world yields a world that plans
//! to nothing.

mod lb;
mod optimize;
pub mod testutil;

use std::collections::BTreeSet;

use model::{ClbNode, DesiredGroupState, Rcv3Node, Server, ServerState, Step};

pub use optimize::optimize;

/// Servers that are serving: provider-ACTIVE and present on every load
/// balancer their group wants them on. A server wanted on several
/// balancers counts once. This feeds the group's active map; capacity
/// accounting is looser (see [`plan`]).
pub fn determine_active<'a>(servers: &'a [Server], lb_nodes: &[ClbNode]) -> Vec<&'a Server> {
    servers
        .iter()
        .filter(|server| server.state == ServerState::Active && on_all_desired_lbs(server, lb_nodes))
        .collect()
}

fn on_all_desired_lbs(server: &Server, lb_nodes: &[ClbNode]) -> bool {
    let address = match &server.servicenet_address {
        Some(address) => address,
        None => return server.desired_lbs.is_empty(),
    };
    server.desired_lbs.values().flatten().all(|desc| {
        lb_nodes
            .iter()
            .any(|node| node.address == *address && node.description == *desc)
    })
}

fn scale_down_priority(server: &Server) -> u8 {
    // Prefer tearing down servers that were never finished.
    match server.state {
        ServerState::Build => 0,
        _ => 1,
    }
}

/// Produce the ordered step list that drives the observed world to the
/// desired one.
///
/// Capacity counts servers in BUILD or ACTIVE regardless of
/// load-balancer membership: a server that merely fell off its balancer
/// is re-attached, not replaced. Servers in ERROR or an unrecognized
/// state are torn down (and implicitly replaced through the capacity
/// gap). Scale-down victims are chosen BUILD-first, newest-first, with
/// ascending id as the tie-break.
pub fn plan(
    desired: &DesiredGroupState,
    servers: &[Server],
    lb_nodes: &[ClbNode],
    rcv3_nodes: &[Rcv3Node],
) -> Vec<Step> {
    let mut doomed: Vec<&Server> = servers
        .iter()
        .filter(|s| matches!(s.state, ServerState::Error | ServerState::Unknown))
        .collect();
    let mut in_capacity: Vec<&Server> = servers
        .iter()
        .filter(|s| matches!(s.state, ServerState::Build | ServerState::Active))
        .collect();

    let mut steps: Vec<Step> = Vec::new();

    let delta = desired.capacity as i64 - in_capacity.len() as i64;
    if delta > 0 {
        for _ in 0..delta {
            steps.push(Step::CreateServer {
                server_config: desired.server_config.clone(),
            });
        }
    } else if delta < 0 {
        let mut candidates = in_capacity.clone();
        candidates.sort_by(|a, b| {
            scale_down_priority(a)
                .cmp(&scale_down_priority(b))
                .then(b.created.cmp(&a.created))
                .then(a.id.cmp(&b.id))
        });
        let victims: Vec<&Server> = candidates.into_iter().take(delta.unsigned_abs() as usize).collect();
        let victim_ids: BTreeSet<&str> = victims.iter().map(|s| s.id.as_str()).collect();
        in_capacity.retain(|s| !victim_ids.contains(s.id.as_str()));
        doomed.extend(victims);
    }

    for server in &doomed {
        steps.push(Step::DeleteServer {
            server_id: server.id.clone(),
        });
    }

    steps.extend(lb::clb_steps(&in_capacity, &doomed, lb_nodes));
    steps.extend(lb::rcv3_steps(desired, &in_capacity, &doomed, rcv3_nodes));

    optimize(steps)
}
