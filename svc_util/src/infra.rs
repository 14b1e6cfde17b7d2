// Copyright 2022 Toolchain Labs, Inc. All rights reserved.
// Licensed under the Apache License, Version 2.0 (see LICENSE).

use std::net::SocketAddr;

use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use serde::Deserialize;
use tokio::signal::unix::{signal, SignalKind};
use tokio::sync::watch;
use warp::Filter;

/// Histogram buckets sized for calls to a remote cloud provider, which
/// sit well above intra-datacenter latencies.
const PROVIDER_LATENCY_BUCKETS: &[f64] = &[
    0.025, // 25 ms
    0.05,  // 50 ms
    0.1,   // 100 ms
    0.25,  // 250 ms
    0.5,   // 500 ms
    1.0,   // 1 sec
    2.5,   // 2.5 secs
    5.0,   // 5 secs
    10.0,  // 10 secs
    30.0,  // 30 secs
    60.0,  // 1 min
    120.0, // 2 mins
];

/// Admin endpoints configuration.
#[derive(Clone, Debug, Deserialize)]
pub struct InfraConfig {
    /// Where the Prometheus scrape endpoint listens.
    #[serde(default = "default_metricsz_bind_addr")]
    pub metricsz_bind_addr: String,

    /// Where the health endpoint listens.
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,
}

impl Default for InfraConfig {
    fn default() -> Self {
        InfraConfig {
            metricsz_bind_addr: default_metricsz_bind_addr(),
            bind_addr: default_bind_addr(),
        }
    }
}

fn default_metricsz_bind_addr() -> String {
    "0.0.0.0:8010".to_owned()
}

fn default_bind_addr() -> String {
    "0.0.0.0:8000".to_owned()
}

fn parse_addr(which: &str, addr: &str) -> Result<SocketAddr, String> {
    addr.parse()
        .map_err(|err| format!("Bad {which} bind address {addr:?}: {err}"))
}

/// Register the global Prometheus recorder and keep a handle for the
/// scrape endpoint to render from.
fn install_recorder() -> Result<PrometheusHandle, String> {
    let recorder = PrometheusBuilder::new()
        .set_buckets(PROVIDER_LATENCY_BUCKETS)
        .map_err(|err| format!("Bad histogram buckets: {err}"))?
        .build_recorder();
    let handle = recorder.handle();
    metrics::set_boxed_recorder(Box::new(recorder))
        .map_err(|err| format!("A metrics recorder is already installed: {err}"))?;
    Ok(handle)
}

/// Watch channel that closes when the process receives SIGINT or
/// SIGTERM. Consumers see the closure as an `Err` from `changed()`.
fn shutdown_on_signal() -> Result<watch::Receiver<()>, String> {
    let mut sigint =
        signal(SignalKind::interrupt()).map_err(|err| format!("SIGINT handler: {err}"))?;
    let mut sigterm =
        signal(SignalKind::terminate()).map_err(|err| format!("SIGTERM handler: {err}"))?;

    let (sender, receiver) = watch::channel(());
    tokio::spawn(async move {
        tokio::select! {
            _ = sigint.recv() => {}
            _ = sigterm.recv() => {}
        }
        log::info!("Caught a termination signal; draining ...");
        // Closing the channel is the shutdown broadcast.
        drop(sender);
    });
    Ok(receiver)
}

/// Serve the health and metrics endpoints for devops systems, on the
/// caller's runtime, and return the shutdown watch the main loop
/// should select on. Must be called from within a tokio runtime.
///
/// `before_scrape` runs on every metrics scrape, for gauges that are
/// sampled rather than pushed.
pub fn setup_infra_endpoints(
    config: InfraConfig,
    before_scrape: impl Fn() + Clone + Send + Sync + 'static,
) -> Result<watch::Receiver<()>, String> {
    let scrape_handle = install_recorder()?;
    let health_addr = parse_addr("health", &config.bind_addr)?;
    let metrics_addr = parse_addr("metricsz", &config.metricsz_bind_addr)?;
    let shutdown_receiver = shutdown_on_signal()?;

    let healthz = warp::get().and(warp::path("healthz")).map(|| "OK");
    tokio::spawn(warp::serve(healthz).run(health_addr));

    let metricsz = warp::get().and(warp::path("metricsz")).map(move || {
        before_scrape();
        scrape_handle.render()
    });
    tokio::spawn(warp::serve(metricsz).run(metrics_addr));

    Ok(shutdown_receiver)
}
