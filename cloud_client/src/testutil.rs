// Copyright 2022 Toolchain Labs, Inc. All rights reserved.
// Licensed under the Apache License, Version 2.0 (see LICENSE).

//! Stub implementations of the client traits for tests in this crate
//! and downstream crates.

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;

use crate::auth::{Authenticator, ServiceCatalog};
use crate::client::ServiceRequester;
use crate::error::CloudError;
use crate::request::ServiceRequest;

/// Serves canned responses matched by whole-request equality, in the
/// style of a lookup dispatcher. Panics on a request it was not primed
/// for, so a test fails loudly instead of hanging on a wrong request.
pub struct StubRequester {
    responses: Mutex<Vec<(ServiceRequest, Result<(u16, Value), CloudError>)>>,
    calls: Mutex<Vec<(String, ServiceRequest)>>,
}

impl StubRequester {
    pub fn new(responses: Vec<(ServiceRequest, Result<(u16, Value), CloudError>)>) -> Self {
        StubRequester {
            responses: Mutex::new(responses),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Every request dispatched so far, in order.
    pub fn calls(&self) -> Vec<(String, ServiceRequest)> {
        self.calls.lock().clone()
    }

    pub fn push_response(
        &self,
        request: ServiceRequest,
        response: Result<(u16, Value), CloudError>,
    ) {
        self.responses.lock().push((request, response));
    }
}

#[async_trait]
impl ServiceRequester for StubRequester {
    async fn request(
        &self,
        tenant_id: &str,
        req: ServiceRequest,
    ) -> Result<(u16, Value), CloudError> {
        self.calls.lock().push((tenant_id.to_string(), req.clone()));
        let responses = self.responses.lock();
        responses
            .iter()
            .find(|(expected, _)| *expected == req)
            .map(|(_, response)| response.clone())
            .unwrap_or_else(|| panic!("StubRequester: unexpected request {req:?}"))
    }
}

/// An authenticator that serves a fixed token and records which tenants
/// had their tokens invalidated.
pub struct InvalidationSpy {
    token: String,
    catalog: ServiceCatalog,
    invalidations: Mutex<Vec<String>>,
}

impl InvalidationSpy {
    pub fn new(token: impl Into<String>, catalog: ServiceCatalog) -> Self {
        InvalidationSpy {
            token: token.into(),
            catalog,
            invalidations: Mutex::new(Vec::new()),
        }
    }

    pub fn invalidations(&self) -> Vec<String> {
        self.invalidations.lock().clone()
    }
}

#[async_trait]
impl Authenticator for InvalidationSpy {
    async fn authenticate(
        &self,
        _tenant_id: &str,
    ) -> Result<(String, ServiceCatalog), CloudError> {
        Ok((self.token.clone(), self.catalog.clone()))
    }

    async fn invalidate(&self, tenant_id: &str) {
        self.invalidations.lock().push(tenant_id.to_string());
    }
}
