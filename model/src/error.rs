// Copyright 2022 Toolchain Labs, Inc. All rights reserved.
// Licensed under the Apache License, Version 2.0 (see LICENSE).

use std::fmt;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ModelError {
    MissingField(&'static str),
    Invalid {
        field: &'static str,
        value: String,
    },
}

impl std::error::Error for ModelError {}

impl fmt::Display for ModelError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ModelError::MissingField(field) => {
                write!(f, "Missing field in provider response: {field}")
            }
            ModelError::Invalid { field, value } => {
                write!(f, "Invalid value for {field} in provider response: {value}")
            }
        }
    }
}
