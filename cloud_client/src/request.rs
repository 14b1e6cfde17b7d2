// Copyright 2022 Toolchain Labs, Inc. All rights reserved.
// Licensed under the Apache License, Version 2.0 (see LICENSE).

use http::Method;
use serde_json::Value;

use crate::ServiceType;

pub const USER_AGENT: &str = concat!("autoscale-converger/", env!("CARGO_PKG_VERSION"));

/// Canonical headers sent with every authenticated provider request.
pub fn auth_headers(token: &str) -> Vec<(&'static str, String)> {
    vec![
        ("content-type", "application/json".to_string()),
        ("accept", "application/json".to_string()),
        ("x-auth-token", token.to_string()),
        ("user-agent", USER_AGENT.to_string()),
    ]
}

/// A provider request described as a value.
///
/// Nothing happens until the request is dispatched through a
/// [`crate::ServiceRequester`]; whole requests are comparable, which
/// the step-conversion tests rely on.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ServiceRequest {
    pub service_type: ServiceType,
    pub method: Method,
    pub path: String,
    pub body: Option<Value>,
    pub params: Vec<(String, String)>,
    /// Response codes that invalidate the cached token before failing.
    pub reauth_codes: Vec<u16>,
    /// Response codes accepted as success.
    pub success_codes: Vec<u16>,
    /// Parse the response body as JSON on success. Ignored on error
    /// paths, which always carry the raw body.
    pub json_response: bool,
}

impl ServiceRequest {
    pub fn new(service_type: ServiceType, method: Method, path: impl Into<String>) -> Self {
        ServiceRequest {
            service_type,
            method,
            path: path.into(),
            body: None,
            params: Vec::new(),
            reauth_codes: vec![401, 403],
            success_codes: vec![200],
            json_response: true,
        }
    }

    pub fn get(service_type: ServiceType, path: impl Into<String>) -> Self {
        Self::new(service_type, Method::GET, path)
    }

    pub fn with_body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    pub fn with_params(mut self, params: Vec<(String, String)>) -> Self {
        self.params = params;
        self
    }

    pub fn with_success_codes(mut self, codes: &[u16]) -> Self {
        self.success_codes = codes.to_vec();
        self
    }

    pub fn with_json_response(mut self, json_response: bool) -> Self {
        self.json_response = json_response;
        self
    }
}

#[cfg(test)]
mod tests {
    use http::Method;

    use super::{auth_headers, ServiceRequest};
    use crate::ServiceType;

    #[test]
    fn defaults_are_populated() {
        let req = ServiceRequest::get(ServiceType::CloudServers, "servers");
        assert_eq!(req.method, Method::GET);
        assert_eq!(req.reauth_codes, vec![401, 403]);
        assert_eq!(req.success_codes, vec![200]);
        assert!(req.json_response);
        assert!(req.body.is_none());
        assert!(req.params.is_empty());
    }

    #[test]
    fn headers_carry_token() {
        let headers = auth_headers("secret");
        assert!(headers.contains(&("x-auth-token", "secret".to_string())));
        assert!(headers.contains(&("accept", "application/json".to_string())));
    }
}
