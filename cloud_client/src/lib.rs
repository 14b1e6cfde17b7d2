// Copyright 2022 Toolchain Labs, Inc. All rights reserved.
// Licensed under the Apache License, Version 2.0 (see LICENSE).

//! Authenticated, service-typed HTTP against the cloud provider.
//!
//! Requests are described as [`ServiceRequest`] values and dispatched
//! through the [`ServiceRequester`] trait. The production
//! implementation ([`CloudClient`]) authenticates per tenant, resolves
//! endpoints from the service catalog and routes provider errors
//! through per-service error parsers. Tests substitute the trait; see
//! [`testutil`].

mod auth;
mod client;
mod error;
mod request;
pub mod testutil;

use serde::{Deserialize, Serialize};

pub use auth::{
    public_url, Authenticator, CachingAuthenticator, CatalogEntry, Endpoint, ServiceCatalog,
    StaticAuthenticator,
};
pub use client::{CloudClient, ServiceConfig, ServiceRequester};
pub use error::{
    clb_error_parser, compute_error_parser, default_error_parsers, ApiError, CloudError,
    ErrorParser,
};
pub use request::{auth_headers, ServiceRequest, USER_AGENT};

/// The remote services this client knows how to reach.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServiceType {
    CloudServers,
    CloudLoadBalancers,
    RackConnectV3,
}

impl ServiceType {
    /// Stable label used in metrics and log fields.
    pub fn label(&self) -> &'static str {
        match self {
            ServiceType::CloudServers => "cloud_servers",
            ServiceType::CloudLoadBalancers => "cloud_load_balancers",
            ServiceType::RackConnectV3 => "rackconnect_v3",
        }
    }
}
