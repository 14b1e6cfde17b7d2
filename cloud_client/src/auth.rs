// Copyright 2022 Toolchain Labs, Inc. All rights reserved.
// Licensed under the Apache License, Version 2.0 (see LICENSE).

use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::CloudError;

/// One endpoint of a catalog entry.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Endpoint {
    pub region: String,
    #[serde(rename = "publicURL")]
    pub public_url: String,
}

/// One service in the auth-time service catalog.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogEntry {
    pub name: String,
    pub endpoints: Vec<Endpoint>,
}

pub type ServiceCatalog = Vec<CatalogEntry>;

/// Base URL for `name` in `region`, if the catalog has one.
pub fn public_url<'a>(catalog: &'a [CatalogEntry], name: &str, region: &str) -> Option<&'a str> {
    catalog
        .iter()
        .find(|entry| entry.name == name)?
        .endpoints
        .iter()
        .find(|endpoint| endpoint.region == region)
        .map(|endpoint| endpoint.public_url.as_str())
}

/// Token acquisition is an external collaborator; this is its contract.
#[async_trait]
pub trait Authenticator: Send + Sync {
    async fn authenticate(&self, tenant_id: &str)
        -> Result<(String, ServiceCatalog), CloudError>;

    /// Forget any cached credentials for the tenant.
    async fn invalidate(&self, tenant_id: &str);
}

#[async_trait]
impl<A> Authenticator for Box<A>
where
    A: Authenticator + ?Sized,
{
    async fn authenticate(
        &self,
        tenant_id: &str,
    ) -> Result<(String, ServiceCatalog), CloudError> {
        (**self).authenticate(tenant_id).await
    }

    async fn invalidate(&self, tenant_id: &str) {
        (**self).invalidate(tenant_id).await
    }
}

/// Serves a fixed token and catalog for every tenant.
pub struct StaticAuthenticator {
    token: String,
    catalog: ServiceCatalog,
}

impl StaticAuthenticator {
    pub fn new(token: impl Into<String>, catalog: ServiceCatalog) -> Self {
        StaticAuthenticator {
            token: token.into(),
            catalog,
        }
    }
}

#[async_trait]
impl Authenticator for StaticAuthenticator {
    async fn authenticate(
        &self,
        _tenant_id: &str,
    ) -> Result<(String, ServiceCatalog), CloudError> {
        Ok((self.token.clone(), self.catalog.clone()))
    }

    async fn invalidate(&self, _tenant_id: &str) {}
}

/// Caches `(token, catalog)` per tenant. Reads are concurrent;
/// invalidation drops the cache entry and forwards to the inner
/// authenticator.
pub struct CachingAuthenticator<A> {
    inner: A,
    cache: RwLock<HashMap<String, (String, ServiceCatalog)>>,
}

impl<A> CachingAuthenticator<A> {
    pub fn new(inner: A) -> Self {
        CachingAuthenticator {
            inner,
            cache: RwLock::new(HashMap::new()),
        }
    }
}

#[async_trait]
impl<A> Authenticator for CachingAuthenticator<A>
where
    A: Authenticator,
{
    async fn authenticate(
        &self,
        tenant_id: &str,
    ) -> Result<(String, ServiceCatalog), CloudError> {
        if let Some(cached) = self.cache.read().get(tenant_id) {
            return Ok(cached.clone());
        }
        let fresh = self.inner.authenticate(tenant_id).await?;
        self.cache
            .write()
            .insert(tenant_id.to_string(), fresh.clone());
        Ok(fresh)
    }

    async fn invalidate(&self, tenant_id: &str) {
        self.cache.write().remove(tenant_id);
        self.inner.invalidate(tenant_id).await;
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use async_trait::async_trait;

    use super::{
        public_url, Authenticator, CachingAuthenticator, CatalogEntry, Endpoint, ServiceCatalog,
    };
    use crate::CloudError;

    pub fn catalog() -> ServiceCatalog {
        vec![
            CatalogEntry {
                name: "cloudServersOpenStack".to_string(),
                endpoints: vec![
                    Endpoint {
                        region: "DFW".to_string(),
                        public_url: "http://dfw.openstack".to_string(),
                    },
                    Endpoint {
                        region: "ORD".to_string(),
                        public_url: "http://ord.openstack".to_string(),
                    },
                ],
            },
            CatalogEntry {
                name: "cloudLoadBalancers".to_string(),
                endpoints: vec![Endpoint {
                    region: "DFW".to_string(),
                    public_url: "http://dfw.clb".to_string(),
                }],
            },
        ]
    }

    struct CountingAuthenticator {
        calls: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl Authenticator for CountingAuthenticator {
        async fn authenticate(
            &self,
            _tenant_id: &str,
        ) -> Result<(String, ServiceCatalog), CloudError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            Ok((format!("token-{n}"), catalog()))
        }

        async fn invalidate(&self, _tenant_id: &str) {}
    }

    #[test]
    fn public_url_resolves_by_name_and_region() {
        let catalog = catalog();
        assert_eq!(
            public_url(&catalog, "cloudServersOpenStack", "ORD"),
            Some("http://ord.openstack")
        );
        assert_eq!(public_url(&catalog, "cloudServersOpenStack", "SYD"), None);
        assert_eq!(public_url(&catalog, "unknown", "DFW"), None);
    }

    #[tokio::test]
    async fn caching_authenticator_caches_per_tenant() {
        let calls = Arc::new(AtomicUsize::new(0));
        let auth = CachingAuthenticator::new(CountingAuthenticator {
            calls: calls.clone(),
        });

        let (token1, _) = auth.authenticate("t1").await.unwrap();
        let (token2, _) = auth.authenticate("t1").await.unwrap();
        assert_eq!(token1, token2);
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        auth.authenticate("t2").await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 2);

        auth.invalidate("t1").await;
        let (token3, _) = auth.authenticate("t1").await.unwrap();
        assert_ne!(token1, token3);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }
}
