/// Names the single Gateway API object a policy attaches to.
#[derive(
    Clone, Debug, Eq, PartialEq, serde::Deserialize, serde::Serialize, schemars::JsonSchema,
)]
pub struct PolicyTargetRef {
    pub group: String,
    pub kind: String,
    pub name: String,

    /// Defaults to the policy's namespace.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
}
