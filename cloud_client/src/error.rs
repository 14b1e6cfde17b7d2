// Copyright 2022 Toolchain Labs, Inc. All rights reserved.
// Licensed under the Apache License, Version 2.0 (see LICENSE).

use std::collections::HashMap;
use std::fmt;

use serde_json::Value;

use crate::ServiceType;

/// A provider response that failed the request's success predicate.
///
/// The body is the raw response text; it is never JSON-parsed on the
/// error path, whatever `json_response` was set to.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ApiError {
    pub method: String,
    pub url: String,
    pub code: u16,
    pub body: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CloudError {
    /// Generic provider API error; carries the raw response.
    Api(ApiError),
    /// The authenticator could not produce a token or catalog.
    Auth(String),
    /// The service catalog has no endpoint for the service in the
    /// configured region.
    NoSuchEndpoint { service: String, region: String },
    /// Transport-level failure (connect, TLS, timeout).
    Request(String),
    /// CLB refused the write because the balancer has a change pending.
    ClbPendingUpdate { lb_id: String },
    /// CLB reports the balancer as deleted or pending delete.
    ClbDeleted { lb_id: String },
    /// The load balancer does not exist.
    NoSuchClb { lb_id: String },
    /// CLB rate limit hit for this balancer.
    ClbOverLimit { lb_id: String },
    /// The compute server does not exist.
    NoSuchServer { server_id: String },
    /// Compute rate limit hit.
    ComputeOverLimit,
}

impl std::error::Error for CloudError {}

impl fmt::Display for CloudError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CloudError::Api(err) => write!(
                f,
                "API error: {} {} returned {}: {}",
                err.method, err.url, err.code, err.body
            ),
            CloudError::Auth(msg) => write!(f, "Authentication error: {msg}"),
            CloudError::NoSuchEndpoint { service, region } => {
                write!(f, "No endpoint for {service} in region {region}")
            }
            CloudError::Request(msg) => write!(f, "Request error: {msg}"),
            CloudError::ClbPendingUpdate { lb_id } => {
                write!(f, "Load balancer {lb_id} has an update pending")
            }
            CloudError::ClbDeleted { lb_id } => {
                write!(f, "Load balancer {lb_id} is deleted")
            }
            CloudError::NoSuchClb { lb_id } => {
                write!(f, "No such load balancer {lb_id}")
            }
            CloudError::ClbOverLimit { lb_id } => {
                write!(f, "Rate limited on load balancer {lb_id}")
            }
            CloudError::NoSuchServer { server_id } => {
                write!(f, "No such server {server_id}")
            }
            CloudError::ComputeOverLimit => write!(f, "Compute API rate limit reached"),
        }
    }
}

impl From<reqwest::Error> for CloudError {
    fn from(err: reqwest::Error) -> Self {
        CloudError::Request(err.to_string())
    }
}

/// Rewrites an [`ApiError`] into a service-specific error, or declines
/// by returning `None`, in which case the original error is surfaced.
pub type ErrorParser = fn(&ApiError) -> Option<CloudError>;

/// The parsers the converger installs by default.
pub fn default_error_parsers() -> HashMap<ServiceType, ErrorParser> {
    let mut parsers: HashMap<ServiceType, ErrorParser> = HashMap::new();
    parsers.insert(ServiceType::CloudLoadBalancers, clb_error_parser);
    parsers.insert(ServiceType::CloudServers, compute_error_parser);
    parsers
}

/// Id of the path segment following `marker`, e.g. the LB id in
/// `.../loadbalancers/23/nodes`.
fn path_id_after<'a>(url: &'a str, marker: &str) -> Option<&'a str> {
    let mut segments = url.split('/');
    segments.find(|segment| *segment == marker)?;
    segments.next().filter(|id| !id.is_empty())
}

fn body_message(body: &str) -> String {
    serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|v| v.get("message").and_then(Value::as_str).map(str::to_string))
        .unwrap_or_default()
}

/// Distinguishes the CLB failure modes the converger cares about from
/// a generic `ApiError`.
pub fn clb_error_parser(err: &ApiError) -> Option<CloudError> {
    let lb_id = path_id_after(&err.url, "loadbalancers")
        .unwrap_or_default()
        .to_string();
    let message = body_message(&err.body);
    match err.code {
        422 if message.contains("PENDING_UPDATE") => Some(CloudError::ClbPendingUpdate { lb_id }),
        422 if message.contains("PENDING_DELETE") || message.contains("deleted") => {
            Some(CloudError::ClbDeleted { lb_id })
        }
        404 => Some(CloudError::NoSuchClb { lb_id }),
        413 if err.body.contains("overLimit") => Some(CloudError::ClbOverLimit { lb_id }),
        _ => None,
    }
}

/// Distinguishes the compute failure modes the converger cares about.
pub fn compute_error_parser(err: &ApiError) -> Option<CloudError> {
    match err.code {
        404 if err.body.contains("itemNotFound") => {
            let server_id = path_id_after(&err.url, "servers")
                .unwrap_or_default()
                .to_string();
            Some(CloudError::NoSuchServer { server_id })
        }
        413 if err.body.contains("overLimit") => Some(CloudError::ComputeOverLimit),
        _ => None,
    }
}
