// Copyright 2022 Toolchain Labs, Inc. All rights reserved.
// Licensed under the Apache License, Version 2.0 (see LICENSE).

use std::fmt;

use cloud_client::CloudError;
use divergence::StoreError;
use model::ModelError;

use crate::group::GroupError;

/// Anything that can fail a single group's convergence cycle. Variants
/// wrap the originating error by value: a failure in one branch of a
/// parallel fetch surfaces here unwrapped, so callers and error parsers
/// see the original class.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ConvergeError {
    Cloud(CloudError),
    Store(StoreError),
    Group(GroupError),
    Model(ModelError),
}

impl std::error::Error for ConvergeError {}

impl fmt::Display for ConvergeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConvergeError::Cloud(err) => write!(f, "{err}"),
            ConvergeError::Store(err) => write!(f, "{err}"),
            ConvergeError::Group(err) => write!(f, "{err}"),
            ConvergeError::Model(err) => write!(f, "{err}"),
        }
    }
}

impl From<CloudError> for ConvergeError {
    fn from(err: CloudError) -> Self {
        ConvergeError::Cloud(err)
    }
}

impl From<StoreError> for ConvergeError {
    fn from(err: StoreError) -> Self {
        ConvergeError::Store(err)
    }
}

impl From<GroupError> for ConvergeError {
    fn from(err: GroupError) -> Self {
        ConvergeError::Group(err)
    }
}

impl From<ModelError> for ConvergeError {
    fn from(err: ModelError) -> Self {
        ConvergeError::Model(err)
    }
}
