// Copyright 2022 Toolchain Labs, Inc. All rights reserved.
// Licensed under the Apache License, Version 2.0 (see LICENSE).

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;

use crate::auth::{public_url, Authenticator};
use crate::error::{ApiError, CloudError, ErrorParser};
use crate::request::{auth_headers, ServiceRequest};
use crate::ServiceType;

/// How a service type is looked up in the catalog, with an optional
/// literal URL override.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct ServiceConfig {
    /// Catalog entry name, e.g. `cloudServersOpenStack`.
    pub name: String,
    pub region: String,
    /// When set, used verbatim instead of the catalog lookup.
    #[serde(default)]
    pub url: Option<String>,
}

/// The effect seam for provider HTTP. The converger and the executor
/// depend on this trait only; tests substitute it.
#[async_trait]
pub trait ServiceRequester: Send + Sync {
    /// Dispatch the request for the tenant, returning the response
    /// status and the parsed (or raw, per `json_response`) body.
    async fn request(
        &self,
        tenant_id: &str,
        req: ServiceRequest,
    ) -> Result<(u16, Value), CloudError>;
}

#[async_trait]
impl<R> ServiceRequester for Arc<R>
where
    R: ServiceRequester + ?Sized,
{
    async fn request(
        &self,
        tenant_id: &str,
        req: ServiceRequest,
    ) -> Result<(u16, Value), CloudError> {
        (**self).request(tenant_id, req).await
    }
}

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(45);

/// Production [`ServiceRequester`]: authenticates per tenant, resolves
/// the base URL, sends with canonical headers, invalidates the token on
/// reauth codes and routes API errors through per-service parsers.
pub struct CloudClient {
    http: reqwest::Client,
    authenticator: Arc<dyn Authenticator>,
    service_configs: HashMap<ServiceType, ServiceConfig>,
    error_parsers: HashMap<ServiceType, ErrorParser>,
}

impl CloudClient {
    pub fn new(
        authenticator: Arc<dyn Authenticator>,
        service_configs: HashMap<ServiceType, ServiceConfig>,
        error_parsers: HashMap<ServiceType, ErrorParser>,
        timeout: Option<Duration>,
    ) -> Result<Self, CloudError> {
        let http = reqwest::Client::builder()
            .timeout(timeout.unwrap_or(DEFAULT_TIMEOUT))
            .build()?;
        Ok(CloudClient {
            http,
            authenticator,
            service_configs,
            error_parsers,
        })
    }

    fn base_url(
        &self,
        service_type: ServiceType,
        catalog: &[crate::CatalogEntry],
    ) -> Result<String, CloudError> {
        let config = self.service_configs.get(&service_type).ok_or_else(|| {
            CloudError::NoSuchEndpoint {
                service: service_type.label().to_string(),
                region: String::new(),
            }
        })?;
        if let Some(url) = &config.url {
            return Ok(url.clone());
        }
        public_url(catalog, &config.name, &config.region)
            .map(str::to_string)
            .ok_or_else(|| CloudError::NoSuchEndpoint {
                service: config.name.clone(),
                region: config.region.clone(),
            })
    }
}

fn join_url(base: &str, path: &str) -> String {
    format!(
        "{}/{}",
        base.trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}

#[async_trait]
impl ServiceRequester for CloudClient {
    async fn request(
        &self,
        tenant_id: &str,
        req: ServiceRequest,
    ) -> Result<(u16, Value), CloudError> {
        let (token, catalog) = self.authenticator.authenticate(tenant_id).await?;
        let url = join_url(&self.base_url(req.service_type, &catalog)?, &req.path);

        let mut builder = self.http.request(req.method.clone(), &url);
        for (name, value) in auth_headers(&token) {
            builder = builder.header(name, value);
        }
        if !req.params.is_empty() {
            builder = builder.query(&req.params);
        }
        if let Some(body) = &req.body {
            builder = builder.json(body);
        }

        let service_label = req.service_type.label();
        let response = match builder.send().await {
            Ok(response) => response,
            Err(err) => {
                metrics::counter!("autoscale_cloud_requests_total", 1,
                    "service" => service_label, "result" => "transport_error");
                return Err(err.into());
            }
        };

        let code = response.status().as_u16();
        let body = response.text().await?;

        if req.reauth_codes.contains(&code) {
            log::info!("Invalidating token for tenant {tenant_id} after {code} from {url}");
            self.authenticator.invalidate(tenant_id).await;
            metrics::counter!("autoscale_cloud_requests_total", 1,
                "service" => service_label, "result" => "reauth");
            return Err(CloudError::Api(ApiError {
                method: req.method.to_string(),
                url,
                code,
                body,
            }));
        }

        if !req.success_codes.contains(&code) {
            metrics::counter!("autoscale_cloud_requests_total", 1,
                "service" => service_label, "result" => "api_error");
            let api_error = ApiError {
                method: req.method.to_string(),
                url,
                code,
                body,
            };
            if let Some(parser) = self.error_parsers.get(&req.service_type) {
                if let Some(specific) = parser(&api_error) {
                    return Err(specific);
                }
            }
            return Err(CloudError::Api(api_error));
        }

        metrics::counter!("autoscale_cloud_requests_total", 1,
            "service" => service_label, "result" => "ok");

        let body = if req.json_response {
            serde_json::from_str(&body).map_err(|err| {
                CloudError::Request(format!("Invalid JSON in response from {url}: {err}"))
            })?
        } else {
            Value::String(body)
        };
        Ok((code, body))
    }
}
