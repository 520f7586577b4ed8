//! The proxy's extension resources.

pub mod authorization_policy;
pub mod wasm_plugin;

pub use self::{
    authorization_policy::{AuthorizationPolicy, AuthorizationPolicySpec},
    wasm_plugin::{WasmPlugin, WasmPluginSpec},
};

/// Attaches a proxy extension to a Gateway API object.
#[derive(
    Clone, Debug, PartialEq, Eq, serde::Deserialize, serde::Serialize, schemars::JsonSchema,
)]
pub struct TargetRef {
    pub group: String,
    pub kind: String,
    pub name: String,
}
