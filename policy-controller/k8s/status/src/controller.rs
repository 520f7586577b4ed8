use kubert::lease::Claim;
use kuadrant_policy_controller_core::{ResourceId, POLICY_CONTROLLER_NAME};
use kuadrant_policy_controller_k8s_api::{
    self as k8s, authorino::AuthConfig, gateway::Gateway, istio, limitador::Limitador,
    DeleteParams, NamespaceResourceScope, Patch, PatchParams,
};
use kuadrant_policy_controller_k8s_index::{ObjectKey, ObjectKind, Op, Update};
use prometheus_client::{
    encoding::EncodeLabelSet,
    metrics::{counter::Counter, family::Family},
    registry::Registry,
};
use serde::de::DeserializeOwned;
use std::{fmt, sync::Arc};
use tokio::{
    sync::{mpsc, watch},
    time,
};

pub struct Controller {
    claims: watch::Receiver<Arc<Claim>>,
    client: k8s::Client,
    name: String,
    updates: mpsc::Receiver<Update>,
    patch_timeout: time::Duration,
    metrics: ControllerMetrics,
}

#[derive(Clone, Debug, Default)]
pub struct ControllerMetrics {
    writes: Family<WriteLabels, Counter>,
    write_failures: Family<WriteLabels, Counter>,
    write_timeouts: Family<WriteLabels, Counter>,
    skipped: Counter,
}

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
struct WriteLabels {
    kind: String,
    op: String,
}

// === impl Controller ===

impl Controller {
    pub fn new(
        claims: watch::Receiver<Arc<Claim>>,
        client: k8s::Client,
        name: impl ToString,
        updates: mpsc::Receiver<Update>,
        patch_timeout: time::Duration,
        metrics: ControllerMetrics,
    ) -> Self {
        Self {
            claims,
            client,
            name: name.to_string(),
            updates,
            patch_timeout,
            metrics,
        }
    }

    /// Processes updates until the index drops its sender.
    pub async fn run(mut self) {
        while let Some(Update { key, op }) = self.updates.recv().await {
            if !self.claims.borrow().is_current_for(&self.name) {
                tracing::trace!(%key, "Not the leader; dropping update");
                self.metrics.skipped.inc();
                continue;
            }
            self.write(key, op).await;
        }
        tracing::debug!("Update queue closed");
    }

    async fn write(&self, key: ObjectKey, op: Op) {
        let labels = WriteLabels {
            kind: key.kind.to_string(),
            op: op.as_str().to_string(),
        };
        match time::timeout(self.patch_timeout, self.send(&key, op)).await {
            Ok(Ok(())) => {
                tracing::debug!(%key, op = %labels.op, "Wrote");
                self.metrics.writes.get_or_create(&labels).inc();
            }
            Ok(Err(error)) => {
                tracing::error!(%key, op = %labels.op, %error, "Failed to write");
                self.metrics.write_failures.get_or_create(&labels).inc();
            }
            Err(_) => {
                tracing::error!(%key, op = %labels.op, timeout = ?self.patch_timeout, "Write timed out");
                self.metrics.write_timeouts.get_or_create(&labels).inc();
            }
        }
    }

    async fn send(&self, key: &ObjectKey, op: Op) -> Result<(), k8s::Error> {
        let id = &key.id;
        match key.kind {
            ObjectKind::AuthConfig => self.send_to::<AuthConfig>(id, op).await,
            ObjectKind::AuthorizationPolicy => {
                self.send_to::<istio::AuthorizationPolicy>(id, op).await
            }
            ObjectKind::WasmPlugin => self.send_to::<istio::WasmPlugin>(id, op).await,
            ObjectKind::Limitador => self.send_to::<Limitador>(id, op).await,
            ObjectKind::Gateway => self.send_to::<Gateway>(id, op).await,
            ObjectKind::AuthPolicy => self.send_to::<k8s::policy::AuthPolicy>(id, op).await,
            ObjectKind::RateLimitPolicy => {
                self.send_to::<k8s::policy::RateLimitPolicy>(id, op).await
            }
        }
    }

    async fn send_to<K>(&self, id: &ResourceId, op: Op) -> Result<(), k8s::Error>
    where
        K: k8s::Resource<Scope = NamespaceResourceScope, DynamicType = ()>,
        K: Clone + DeserializeOwned + fmt::Debug,
    {
        let api = k8s::Api::<K>::namespaced(self.client.clone(), &id.namespace);
        let params = PatchParams::apply(POLICY_CONTROLLER_NAME);
        match op {
            Op::Apply(object) => {
                api.patch(&id.name, &params.force(), &Patch::Apply(object))
                    .await?;
            }
            Op::Merge(patch) => {
                api.patch(&id.name, &params, &Patch::Merge(patch)).await?;
            }
            Op::MergeStatus(patch) => {
                api.patch_status(&id.name, &params, &Patch::Merge(patch))
                    .await?;
            }
            Op::Delete => match api.delete(&id.name, &DeleteParams::background()).await {
                Ok(_) => {}
                Err(k8s::Error::Api(error)) if error.code == 404 => {
                    tracing::debug!(%id, "Already deleted");
                }
                Err(error) => return Err(error),
            },
        }
        Ok(())
    }
}

// === impl ControllerMetrics ===

impl ControllerMetrics {
    pub fn register(prom: &mut Registry) -> Self {
        let metrics = Self::default();
        prom.register(
            "writes",
            "Count of successful writes to the cluster",
            metrics.writes.clone(),
        );
        prom.register(
            "write_failures",
            "Count of writes rejected by the API server",
            metrics.write_failures.clone(),
        );
        prom.register(
            "write_timeouts",
            "Count of writes that did not complete in time",
            metrics.write_timeouts.clone(),
        );
        prom.register(
            "skipped",
            "Count of updates dropped while not holding the write lease",
            metrics.skipped.clone(),
        );
        metrics
    }

    #[cfg(test)]
    pub(crate) fn attempts(&self, kind: ObjectKind, op: &str) -> u64 {
        let labels = WriteLabels {
            kind: kind.to_string(),
            op: op.to_string(),
        };
        [&self.writes, &self.write_failures, &self.write_timeouts]
            .into_iter()
            .map(|family| family.get_or_create(&labels).get())
            .sum()
    }

    #[cfg(test)]
    pub(crate) fn skipped(&self) -> u64 {
        self.skipped.get()
    }
}
