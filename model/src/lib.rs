// Copyright 2022 Toolchain Labs, Inc. All rights reserved.
// Licensed under the Apache License, Version 2.0 (see LICENSE).

//! Immutable value types shared by the planner, the executor and the
//! converger service: observed servers, load-balancer descriptions and
//! nodes, group state, and the steps the planner emits.
//!
//! All types are plain data with structural equality. "Modifying" a
//! value means building a new one.

mod clb;
mod error;
mod group;
mod server;
mod step;

pub use clb::{ClbDescription, ClbNode, NodeCondition, NodeType, Rcv3Node};
pub use error::ModelError;
pub use group::{DesiredGroupState, GroupState};
pub use server::{server_to_json, Server, ServerState};
pub use step::Step;
