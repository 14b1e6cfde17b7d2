// Copyright 2022 Toolchain Labs, Inc. All rights reserved.
// Licensed under the Apache License, Version 2.0 (see LICENSE).

use std::collections::HashMap;
use std::str::FromStr;

use cloud_client::{ServiceCatalog, ServiceConfig, ServiceType};
use converger::LaunchConfig;
use serde::Deserialize;
use svc_util::infra::InfraConfig;

/// Static credentials: token acquisition is handled outside this
/// process, which only needs a token and a catalog to present.
#[derive(Clone, Deserialize, Debug)]
pub struct AuthConfig {
    /// Auth token presented on every provider request.
    pub token: String,

    /// Service catalog to resolve endpoints from.
    #[serde(default)]
    pub catalog: ServiceCatalog,
}

#[derive(Clone, Deserialize, Debug)]
pub struct RedisRegistryConfig {
    /// Address of the Redis backend in `ADDRESS[:PORT]` format.
    pub address: String,

    /// Root key for divergence entries.
    pub root: Option<String>,
}

#[derive(Clone, Deserialize, Debug)]
#[serde(rename_all = "snake_case")]
pub enum RegistryConfig {
    Memory,
    Redis(RedisRegistryConfig),
}

/// One scaling group seeded into the in-process group store.
#[derive(Clone, Deserialize, Debug)]
pub struct GroupSeed {
    pub tenant_id: String,
    pub group_id: String,
    pub name: String,
    pub desired: usize,
    pub launch: LaunchConfig,
}

#[derive(Clone, Deserialize, Debug)]
pub struct ConvergerConfig {
    /// Number of partitioner buckets across the whole fleet.
    #[serde(default = "default_num_buckets")]
    pub num_buckets: u32,

    /// This worker's index within the fleet.
    #[serde(default)]
    pub worker_index: u32,

    /// Total number of workers sharing the registry.
    #[serde(default = "default_worker_count")]
    pub worker_count: u32,

    /// Seconds between convergence ticks.
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,
}

impl Default for ConvergerConfig {
    fn default() -> Self {
        ConvergerConfig {
            num_buckets: default_num_buckets(),
            worker_index: 0,
            worker_count: default_worker_count(),
            interval_secs: default_interval_secs(),
        }
    }
}

fn default_num_buckets() -> u32 {
    divergence::DEFAULT_NUM_BUCKETS
}

fn default_worker_count() -> u32 {
    1
}

fn default_interval_secs() -> u64 {
    10
}

#[derive(Clone, Deserialize, Debug)]
pub struct Config {
    /// Per service type: catalog name, region and optional URL override.
    pub services: HashMap<ServiceType, ServiceConfig>,

    /// Provider credentials.
    pub auth: AuthConfig,

    /// Divergence registry backend.
    #[serde(with = "serde_yaml::with::singleton_map")]
    pub registry: RegistryConfig,

    /// Groups seeded into the in-process group store.
    #[serde(default)]
    pub groups: Vec<GroupSeed>,

    /// Admin endpoints configuration.
    pub infra: Option<InfraConfig>,

    #[serde(default)]
    pub converger: ConvergerConfig,

    /// Per-request timeout for provider calls.
    pub request_timeout_secs: Option<u64>,
}

impl FromStr for Config {
    type Err = String;

    fn from_str(raw_config: &str) -> Result<Self, Self::Err> {
        let config: Config =
            serde_yaml::from_str(raw_config).map_err(|e| format!("config parse error: {e}"))?;
        if config.converger.worker_count == 0 {
            return Err("config parse error: worker_count must be non-zero".to_string());
        }
        if config.converger.worker_index >= config.converger.worker_count {
            return Err("config parse error: worker_index must be below worker_count".to_string());
        }
        Ok(config)
    }
}
