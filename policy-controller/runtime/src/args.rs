use crate::{
    index::{self, ClusterInfo, IndexMetrics, ReconcileMetrics},
    k8s::{self, gateway, Client, Resource},
    lease, status,
};
use anyhow::{bail, Context, Result};
use clap::Parser;
use kube::runtime::watcher;
use prometheus_client::registry::Registry;
use tokio::{sync::mpsc, time::Duration};
use tracing::{info_span, Instrument};

#[derive(Debug, Parser)]
#[clap(name = "policy", about = "A Kuadrant policy controller")]
pub struct Args {
    #[clap(
        long,
        default_value = "kuadrant=info,warn",
        env = "KUADRANT_POLICY_CONTROLLER_LOG"
    )]
    log_level: kubert::LogFilter,

    #[clap(long, default_value = "plain")]
    log_format: kubert::LogFormat,

    #[clap(flatten)]
    client: kubert::ClientArgs,

    #[clap(flatten)]
    admin: kubert::AdminArgs,

    /// The namespace of the controller deployment, its write lease and the
    /// Limitador object.
    #[clap(long, default_value = "kuadrant-system")]
    controller_namespace: String,

    #[clap(long, default_value = "kuadrant-operator")]
    controller_deployment_name: String,

    #[clap(long, default_value = "limitador")]
    limitador_name: String,

    /// The external authorization provider AuthorizationPolicies delegate to.
    #[clap(long, default_value = "kuadrant-authorization")]
    authorization_provider: String,

    #[clap(long, default_value = "oci://quay.io/kuadrant/wasm-shim:latest")]
    wasm_image_url: String,

    /// The cluster name gateway proxies send rate limit requests to.
    #[clap(long, default_value = "kuadrant-rate-limiting-service")]
    rate_limit_service: String,

    /// How often every desired object is written again.
    #[clap(long, default_value = "10", value_parser = clap::value_parser!(u64).range(1..))]
    reconciliation_period_secs: u64,

    #[clap(long, default_value = "5000", value_parser = clap::value_parser!(u64).range(1..))]
    patch_timeout_ms: u64,
}

impl Args {
    #[inline]
    pub async fn parse_and_run() -> Result<()> {
        Self::parse().run().await
    }

    pub async fn run(self) -> Result<()> {
        let Self {
            admin,
            client,
            log_level,
            log_format,
            controller_namespace,
            controller_deployment_name,
            limitador_name,
            authorization_provider,
            wasm_image_url,
            rate_limit_service,
            reconciliation_period_secs,
            patch_timeout_ms,
        } = self;

        let cluster_info = ClusterInfo {
            controller_namespace: controller_namespace.clone(),
            limitador_name,
            authorization_provider,
            wasm_image_url,
            rate_limit_service,
        };
        let reconciliation_period = Duration::from_secs(reconciliation_period_secs);

        let mut prom = <Registry>::default();
        let reconcile_metrics = ReconcileMetrics::register(&mut prom);
        let controller_metrics =
            status::ControllerMetrics::register(prom.sub_registry_with_prefix("controller"));

        // As a conservative estimate, we assume that a write takes at least
        // 1ms, so the queue holds about one reconciliation period of writes.
        let (updates_tx, updates_rx) =
            mpsc::channel(reconciliation_period.as_millis().max(1) as usize);
        let policy_index = index::Index::shared(cluster_info, updates_tx, reconcile_metrics);
        let indexes = IndexMetrics::register(policy_index.clone(), &mut prom).shared();

        let mut runtime = kubert::Runtime::builder()
            .with_log(log_level, log_format)
            .with_admin(admin.into_builder().with_prometheus(prom))
            .with_client(client)
            .build()
            .await?;

        let hostname =
            std::env::var("HOSTNAME").context("Failed to fetch `HOSTNAME` environment variable")?;

        let claims = lease::init(
            &runtime,
            &controller_namespace,
            &controller_deployment_name,
            &hostname,
        )
        .await?;

        // Spawn resource watches.

        let gateways = runtime.watch_all::<gateway::Gateway>(watcher::Config::default());
        tokio::spawn(
            kubert::index::namespaced(indexes.clone(), gateways)
                .instrument(info_span!("gateways.gateway.networking.k8s.io")),
        );

        let http_routes = runtime.watch_all::<gateway::HttpRoute>(watcher::Config::default());
        tokio::spawn(
            kubert::index::namespaced(indexes.clone(), http_routes)
                .instrument(info_span!("httproutes.gateway.networking.k8s.io")),
        );

        let auth_policies =
            runtime.watch_all::<k8s::policy::AuthPolicy>(watcher::Config::default());
        tokio::spawn(
            kubert::index::namespaced(indexes.clone(), auth_policies)
                .instrument(info_span!("authpolicies.kuadrant.io")),
        );

        let rate_limit_policies =
            runtime.watch_all::<k8s::policy::RateLimitPolicy>(watcher::Config::default());
        tokio::spawn(
            kubert::index::namespaced(indexes.clone(), rate_limit_policies)
                .instrument(info_span!("ratelimitpolicies.kuadrant.io")),
        );

        if api_resource_exists::<k8s::policy::DnsPolicy>(&runtime.client()).await {
            let dns_policies =
                runtime.watch_all::<k8s::policy::DnsPolicy>(watcher::Config::default());
            tokio::spawn(
                kubert::index::namespaced(indexes.clone(), dns_policies)
                    .instrument(info_span!("dnspolicies.kuadrant.io")),
            );
        } else {
            tracing::warn!("dnspolicies.kuadrant.io resource kind not found, skipping watches");
        }

        if api_resource_exists::<k8s::policy::TlsPolicy>(&runtime.client()).await {
            let tls_policies =
                runtime.watch_all::<k8s::policy::TlsPolicy>(watcher::Config::default());
            tokio::spawn(
                kubert::index::namespaced(indexes, tls_policies)
                    .instrument(info_span!("tlspolicies.kuadrant.io")),
            );
        } else {
            tracing::warn!("tlspolicies.kuadrant.io resource kind not found, skipping watches");
        }

        // Spawn the periodic resync of every desired object.
        tokio::spawn(
            index::resync(policy_index, reconciliation_period).instrument(info_span!("resync")),
        );

        let controller = status::Controller::new(
            claims,
            runtime.client(),
            hostname,
            updates_rx,
            Duration::from_millis(patch_timeout_ms),
            controller_metrics,
        );
        tokio::spawn(controller.run().instrument(info_span!("controller")));

        // Block the main thread on the shutdown signal. Once it fires, wait for the background tasks to
        // complete before exiting.
        if runtime.run().await.is_err() {
            bail!("Aborted");
        }

        Ok(())
    }
}

async fn api_resource_exists<T>(client: &Client) -> bool
where
    T: Resource,
    T::DynamicType: Default,
{
    let dt = Default::default();
    client
        .list_api_group_resources(&T::api_version(&dt))
        .await
        .ok()
        .iter()
        .flat_map(|r| r.resources.iter())
        .any(|r| r.kind == T::kind(&dt))
}
