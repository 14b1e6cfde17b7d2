// Copyright 2022 Toolchain Labs, Inc. All rights reserved.
// Licensed under the Apache License, Version 2.0 (see LICENSE).

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use cloud_client::ServiceRequester;
use divergence::{
    entry_name, get_divergent_groups, DivergenceStore, DivergentGroup, Partitioner, StoreError,
};
use model::{server_to_json, Server};
use parking_lot::Mutex;
use planner::{determine_active, plan};
use serde_json::{json, Value};
use svc_util::spec::{log_sink, Event, SpecObserverWrapper};

use crate::error::ConvergeError;
use crate::execute::execute_steps;
use crate::gather::get_all_convergence_data;
use crate::group::{desired_group_state, GroupError, GroupStore};

/// Process-local set of (tenant, group) pairs with a convergence in
/// flight. `try_acquire` never blocks: a second caller for the same
/// group gets `None` and backs off.
#[derive(Clone, Default)]
pub struct InFlightSet {
    inner: Arc<Mutex<HashSet<(String, String)>>>,
}

impl InFlightSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn try_acquire(&self, tenant_id: &str, group_id: &str) -> Option<InFlightGuard> {
        let key = (tenant_id.to_string(), group_id.to_string());
        let mut inner = self.inner.lock();
        if !inner.insert(key.clone()) {
            return None;
        }
        Some(InFlightGuard {
            set: self.inner.clone(),
            key,
        })
    }

    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().is_empty()
    }
}

/// Releases the in-flight marker when dropped, on success and failure
/// alike.
pub struct InFlightGuard {
    set: Arc<Mutex<HashSet<(String, String)>>>,
    key: (String, String),
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.set.lock().remove(&self.key);
    }
}

/// Drives divergent groups toward their desired state.
pub struct Converger {
    requester: Arc<dyn ServiceRequester>,
    groups: Arc<dyn GroupStore>,
    store: Arc<dyn DivergenceStore>,
    partitioner: Partitioner,
    in_flight: InFlightSet,
    observer: SpecObserverWrapper,
}

impl Converger {
    pub fn new(
        requester: Arc<dyn ServiceRequester>,
        groups: Arc<dyn GroupStore>,
        store: Arc<dyn DivergenceStore>,
        partitioner: Partitioner,
    ) -> Self {
        Self::with_observer(
            requester,
            groups,
            store,
            partitioner,
            SpecObserverWrapper::new(log_sink()),
        )
    }

    pub fn with_observer(
        requester: Arc<dyn ServiceRequester>,
        groups: Arc<dyn GroupStore>,
        store: Arc<dyn DivergenceStore>,
        partitioner: Partitioner,
        observer: SpecObserverWrapper,
    ) -> Self {
        Converger {
            requester,
            groups,
            store,
            partitioner,
            in_flight: InFlightSet::new(),
            observer,
        }
    }

    fn scoped(tenant_id: &str, group_id: &str, mut event: Event) -> Event {
        event.insert("tenant_id".to_string(), json!(tenant_id));
        event.insert("group_id".to_string(), json!(group_id));
        event
    }

    /// One tick: drain every divergent group in the buckets this worker
    /// owns. Per-group failures are handled (and logged) per group;
    /// only a registry listing failure surfaces.
    pub async fn converge_all(&self) -> Result<(), StoreError> {
        let buckets = self.partitioner.owned_buckets();
        self.observer.observe(event(json!({
            "message": ["converge-all-groups"],
            "buckets": buckets.iter().collect::<Vec<_>>(),
        })));
        let entries =
            get_divergent_groups(self.store.as_ref(), &buckets, self.partitioner.num_buckets())
                .await?;
        metrics::gauge!("autoscale_divergent_groups", entries.len() as f64);
        futures::future::join_all(
            entries
                .iter()
                .map(|entry| self.converge_one_then_cleanup(entry)),
        )
        .await;
        Ok(())
    }

    /// Converge one group and clean up its registry entry, under the
    /// single-flight lock. Returns `None` when another convergence for
    /// the group is already in flight (a no-op, not an error).
    pub async fn converge_one_then_cleanup(
        &self,
        entry: &DivergentGroup,
    ) -> Option<Result<Vec<Value>, ConvergeError>> {
        let tenant_id = &entry.tenant_id;
        let group_id = &entry.group_id;
        let _guard = match self.in_flight.try_acquire(tenant_id, group_id) {
            Some(guard) => guard,
            None => {
                self.observer.observe(Self::scoped(
                    tenant_id,
                    group_id,
                    event(json!({"message": ["already-converging"]})),
                ));
                metrics::counter!("autoscale_convergences_total", 1, "result" => "skipped");
                return None;
            }
        };

        let name = entry_name(tenant_id, group_id);
        let result = self.execute_convergence(tenant_id, group_id).await;
        let result = match result {
            Ok(results) => {
                metrics::counter!("autoscale_convergences_total", 1, "result" => "ok");
                match self.store.delete(&name, entry.version).await {
                    Ok(true) => {}
                    Ok(false) => {
                        log::debug!(
                            "Group {tenant_id}/{group_id} was re-marked divergent during \
                             convergence; leaving the entry for the next cycle"
                        );
                    }
                    Err(err) => {
                        log::error!("Failed to clear divergence entry {name}: {err}");
                    }
                }
                Ok(results)
            }
            Err(ConvergeError::Group(GroupError::NoSuchScalingGroup { .. })) => {
                // Terminal: the group is gone, so is its divergence.
                self.observer.observe(Self::scoped(
                    tenant_id,
                    group_id,
                    event(json!({"message": ["group-already-deleted"]})),
                ));
                metrics::counter!("autoscale_convergences_total", 1, "result" => "group_deleted");
                if let Err(err) = self.store.delete(&name, -1).await {
                    log::error!("Failed to clear divergence entry {name}: {err}");
                }
                Ok(Vec::new())
            }
            Err(err) => {
                self.observer.observe(Self::scoped(
                    tenant_id,
                    group_id,
                    event(json!({
                        "isError": true,
                        "why": "converge-fatal-error",
                        "error": err.to_string(),
                    })),
                ));
                metrics::counter!("autoscale_convergences_total", 1, "result" => "failed");
                Err(err)
            }
        };
        Some(result)
    }

    /// Observe, plan and execute one group's convergence. The group
    /// info and the convergence data are fetched in parallel; whichever
    /// branch fails first fails the cycle with its own error.
    pub async fn execute_convergence(
        &self,
        tenant_id: &str,
        group_id: &str,
    ) -> Result<Vec<Value>, ConvergeError> {
        let (info, data) = futures::try_join!(
            async {
                self.groups
                    .get_scaling_group_info(tenant_id, group_id)
                    .await
                    .map_err(ConvergeError::Group)
            },
            get_all_convergence_data(self.requester.as_ref(), tenant_id, group_id),
        )?;

        if info.state.paused {
            self.observer.observe(Self::scoped(
                tenant_id,
                group_id,
                event(json!({"message": ["group-paused"]})),
            ));
            return Ok(Vec::new());
        }

        let desired = desired_group_state(group_id, &info.launch, &info.state);
        let servers: Vec<Server> = data
            .servers
            .iter()
            .cloned()
            .map(|mut server| {
                server.desired_lbs = desired.desired_lbs.clone();
                server
            })
            .collect();

        let steps = plan(&desired, &servers, &data.lb_nodes, &data.rcv3_nodes);
        self.observer.observe(Self::scoped(
            tenant_id,
            group_id,
            event(json!({
                "message": ["execute-convergence"],
                "desired": desired,
                "servers": servers.iter().map(server_to_json).collect::<Vec<_>>(),
                "lb_nodes": data.lb_nodes,
                "steps": steps,
            })),
        ));

        if steps.is_empty() {
            self.update_active(tenant_id, group_id, &servers, &data).await?;
            return Ok(Vec::new());
        }

        let results = execute_steps(self.requester.as_ref(), tenant_id, &steps).await?;
        self.observer.observe(Self::scoped(
            tenant_id,
            group_id,
            event(json!({
                "message": ["execute-convergence-results"],
                "num_results": results.len(),
            })),
        ));
        self.update_active(tenant_id, group_id, &servers, &data).await?;
        Ok(results)
    }

    async fn update_active(
        &self,
        tenant_id: &str,
        group_id: &str,
        servers: &[Server],
        data: &crate::gather::ConvergenceData,
    ) -> Result<(), ConvergeError> {
        let active: BTreeMap<String, Value> = determine_active(servers, &data.lb_nodes)
            .into_iter()
            .map(|server| (server.id.clone(), server_to_json(server)))
            .collect();
        self.groups
            .update_active(tenant_id, group_id, active)
            .await
            .map_err(ConvergeError::Group)
    }
}

fn event(value: Value) -> Event {
    match value {
        Value::Object(event) => event,
        _ => Event::new(),
    }
}
