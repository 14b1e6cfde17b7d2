// Copyright 2022 Toolchain Labs, Inc. All rights reserved.
// Licensed under the Apache License, Version 2.0 (see LICENSE).

use tracing_subscriber::filter::targets::Targets;
use tracing_subscriber::prelude::*;

/// `RUST_LOG` parsed as per-target filters, defaulting to `info`.
///
/// The filter is attached to the stdout layer only. A global
/// `EnvFilter` would also gate every other layer in the registry,
/// which breaks the optional console layer below.
fn stdout_filter() -> Targets {
    std::env::var("RUST_LOG")
        .unwrap_or_else(|_| "info".to_owned())
        .parse()
        .expect("RUST_LOG must be a valid filter directive")
}

/// Install the tracing stack for a binary: JSON records on stdout,
/// plus a tokio-console layer when `TOKIO_CONSOLE_BIND` is set (the
/// console reads its own configuration from the environment).
pub fn setup_logging(service_name: &'static str) {
    let stdout_layer = tracing_subscriber::fmt::layer()
        .json()
        .with_filter(stdout_filter());

    let console_layer = std::env::var("TOKIO_CONSOLE_BIND")
        .ok()
        .map(|_| console_subscriber::ConsoleLayer::builder().with_default_env().spawn());

    tracing_subscriber::registry()
        .with(stdout_layer)
        .with(console_layer)
        .init();

    log::info!("{service_name} logging JSON to stdout");
}
