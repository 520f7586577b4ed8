use kuadrant_policy_controller_core::ResourceId;

/// Holds the cluster settings the downstream resources are built with.
#[derive(Clone, Debug)]
pub struct ClusterInfo {
    /// The namespace where the controller and the rate limit service are
    /// deployed.
    pub controller_namespace: String,

    /// The name of the Limitador object receiving the merged limits.
    pub limitador_name: String,

    /// The external authorization provider, as registered in the mesh
    /// configuration.
    pub authorization_provider: String,

    /// Where the gateway proxies load the rate-limit filter module from.
    pub wasm_image_url: String,

    /// The cluster name the rate-limit filter sends its requests to.
    pub rate_limit_service: String,
}

impl ClusterInfo {
    pub(crate) fn limitador_id(&self) -> ResourceId {
        ResourceId::new(&self.controller_namespace, &self.limitador_name)
    }
}
