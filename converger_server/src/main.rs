// Copyright 2022 Toolchain Labs, Inc. All rights reserved.
// Licensed under the Apache License, Version 2.0 (see LICENSE).

#![deny(warnings)]

use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use clap::{Arg, Command};
use cloud_client::{
    default_error_parsers, Authenticator, CachingAuthenticator, CloudClient, StaticAuthenticator,
};
use converger::{Converger, GroupInfo, MemoryGroupStore};
use divergence::{
    mark_divergent, DivergenceStore, MemoryStore, Partitioner, RedisStore, DEFAULT_DIVERGENT_ROOT,
};
use model::GroupState;
use svc_util::infra::setup_infra_endpoints;
use svc_util::logging::setup_logging;
use tokio::io::AsyncReadExt;

use crate::config::{Config, RegistryConfig};

pub mod config;

async fn make_registry(
    config: RegistryConfig,
) -> Result<Arc<dyn DivergenceStore>, Box<dyn std::error::Error>> {
    match config {
        RegistryConfig::Memory => Ok(Arc::new(MemoryStore::new())),
        RegistryConfig::Redis(c) => {
            let client = redis::Client::open(format!("redis://{}", c.address))
                .map_err(|err| format!("Redis setup error: {err}"))?;
            let store = RedisStore::new(
                client,
                c.root.unwrap_or_else(|| DEFAULT_DIVERGENT_ROOT.to_string()),
            )
            .await?;
            store.verify_connection().await?;
            Ok(Arc::new(store))
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let matches = Command::new("converger_server")
        .arg(
            Arg::new("config")
                .short('c')
                .required(true)
                .value_name("FILE"),
        )
        .get_matches();

    let config_filename = matches.get_one::<String>("config").unwrap();
    let mut file = tokio::fs::File::open(config_filename).await?;
    let mut config_str = String::new();
    file.read_to_string(&mut config_str).await?;
    let config = Config::from_str(&config_str)?;

    setup_logging("converger_server");
    log::info!(
        "Converger config: {} services, {} seeded groups, buckets {}/{} for worker {}",
        config.services.len(),
        config.groups.len(),
        config.converger.num_buckets,
        config.converger.worker_count,
        config.converger.worker_index,
    );

    let authenticator: Arc<dyn Authenticator> = Arc::new(CachingAuthenticator::new(
        StaticAuthenticator::new(config.auth.token, config.auth.catalog),
    ));
    let requester = Arc::new(CloudClient::new(
        authenticator,
        config.services,
        default_error_parsers(),
        config.request_timeout_secs.map(Duration::from_secs),
    )?);

    let store = make_registry(config.registry).await?;

    let groups = MemoryGroupStore::new();
    for seed in config.groups {
        groups.insert(GroupInfo {
            state: GroupState::new(&seed.tenant_id, &seed.group_id, &seed.name, seed.desired),
            launch: seed.launch,
        });
        // Seeded groups start divergent so the first tick converges them.
        mark_divergent(store.as_ref(), &seed.tenant_id, &seed.group_id).await?;
    }

    let partitioner = Partitioner::for_worker(
        config.converger.worker_index,
        config.converger.worker_count,
        config.converger.num_buckets,
    );
    let converger = Converger::new(requester, Arc::new(groups), store, partitioner);

    let mut shutdown_receiver =
        setup_infra_endpoints(config.infra.unwrap_or_default(), || {})?;

    let mut tick = tokio::time::interval(Duration::from_secs(config.converger.interval_secs));
    loop {
        tokio::select! {
            _ = tick.tick() => {
                metrics::increment_counter!("autoscale_converge_ticks_total");
                if let Err(err) = converger.converge_all().await {
                    log::error!("Failed to list divergent groups: {err}");
                }
            }
            changed = shutdown_receiver.changed() => {
                if changed.is_err() {
                    log::info!("Shutting down converger ...");
                    break;
                }
            }
        }
    }

    Ok(())
}
