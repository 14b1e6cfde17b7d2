// Copyright 2022 Toolchain Labs, Inc. All rights reserved.
// Licensed under the Apache License, Version 2.0 (see LICENSE).

//! Process-level infrastructure shared by the converger binaries:
//! logging setup, admin endpoints, and the structured-event
//! specification layer.

pub mod infra;
pub mod logging;
pub mod spec;
