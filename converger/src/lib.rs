// Copyright 2022 Toolchain Labs, Inc. All rights reserved.
// Licensed under the Apache License, Version 2.0 (see LICENSE).

//! The converger service: drains the divergence registry for the
//! buckets this worker owns and, for each divergent group, observes the
//! world, plans, executes the plan against the provider and maintains
//! the group's active map — at most one convergence per group in flight
//! within the process.

mod error;
mod execute;
pub mod feed;
mod gather;
mod group;
mod service;

pub use error::ConvergeError;
pub use execute::{execute_steps, step_to_request};
pub use gather::{get_all_convergence_data, ConvergenceData};
pub use group::{
    desired_group_state, GroupError, GroupInfo, GroupStore, LaunchConfig, MemoryGroupStore,
    GROUP_ID_METADATA_KEY,
};
pub use service::{Converger, InFlightGuard, InFlightSet};
