use crate::ObjectKind;
use kube::ResourceExt;
use kubert::index::NamespacedRemoved;
use parking_lot::RwLock;
use prometheus_client::{
    encoding::EncodeLabelSet,
    metrics::{counter::Counter, family::Family},
    registry::Registry,
};
use std::sync::Arc;

/// Counts the watch events an index receives.
pub struct IndexMetrics<T> {
    inner: T,

    index_applies: Family<NamespacedIndexLabels, Counter>,
    index_deletes: Family<NamespacedIndexLabels, Counter>,
    index_resets: Family<IndexLabels, Counter>,
}

/// Counts the reconciliations the index performs and the updates it emits.
#[derive(Clone, Debug, Default)]
pub struct ReconcileMetrics {
    reconciles: Counter,
    updates: Family<UpdateLabels, Counter>,
}

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
struct NamespacedIndexLabels {
    namespace: String,
    kind: String,
}

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
struct IndexLabels {
    kind: String,
}

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
struct UpdateLabels {
    kind: String,
}

// === impl IndexMetrics ===

impl<T> IndexMetrics<T> {
    pub fn register(inner: T, prom: &mut Registry) -> Self {
        let index_applies = Family::default();
        prom.register(
            "index_applies",
            "Count of applies to the index",
            index_applies.clone(),
        );

        let index_deletes = Family::default();
        prom.register(
            "index_deletes",
            "Count of deletes to the index",
            index_deletes.clone(),
        );

        let index_resets = Family::default();
        prom.register(
            "index_resets",
            "Count of resets to the index",
            index_resets.clone(),
        );

        Self {
            inner,
            index_applies,
            index_deletes,
            index_resets,
        }
    }

    pub fn shared(self) -> Arc<RwLock<Self>> {
        Arc::new(RwLock::new(self))
    }
}

impl<R, T> kubert::index::IndexNamespacedResource<R> for IndexMetrics<Arc<RwLock<T>>>
where
    T: kubert::index::IndexNamespacedResource<R>,
    R: ResourceExt<DynamicType = ()>,
{
    fn apply(&mut self, resource: R) {
        self.index_applies
            .get_or_create(&NamespacedIndexLabels {
                namespace: resource.namespace().unwrap_or_default(),
                kind: R::kind(&()).to_string(),
            })
            .inc();
        self.inner.write().apply(resource);
    }

    fn delete(&mut self, namespace: String, name: String) {
        self.index_deletes
            .get_or_create(&NamespacedIndexLabels {
                namespace: namespace.clone(),
                kind: R::kind(&()).to_string(),
            })
            .inc();
        self.inner.write().delete(namespace, name);
    }

    fn reset(&mut self, resources: Vec<R>, removed: NamespacedRemoved) {
        self.index_resets
            .get_or_create(&IndexLabels {
                kind: R::kind(&()).to_string(),
            })
            .inc();
        self.inner.write().reset(resources, removed);
    }
}

// === impl ReconcileMetrics ===

impl ReconcileMetrics {
    pub fn register(prom: &mut Registry) -> Self {
        let metrics = Self::default();
        prom.register(
            "index_reconciles",
            "Count of desired state computations",
            metrics.reconciles.clone(),
        );
        prom.register(
            "index_updates",
            "Count of updates sent to the status controller",
            metrics.updates.clone(),
        );
        metrics
    }

    pub(crate) fn reconciled(&self) {
        self.reconciles.inc();
    }

    pub(crate) fn sent(&self, kind: ObjectKind) {
        self.updates
            .get_or_create(&UpdateLabels {
                kind: kind.to_string(),
            })
            .inc();
    }
}
