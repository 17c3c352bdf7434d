use serde::{Deserialize, Serialize};

pub const DEFAULT_CLUSTER: &str = "production";
pub const DEFAULT_NAME: &str = "@based/env-hub";

/// Resolved connection identity handed to the transport.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientConfig {
    pub cluster: String,
    pub org: String,
    pub project: String,
    pub env: String,
    pub name: String,
    pub key: String,
    pub optional_key: bool,
    pub host: String,
    pub discovery_url: String,
}

/// One layer of configuration (file, environment, ...).
///
/// Every field is optional so layers can be merged before defaults are
/// applied.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConfigLayer {
    pub cluster: Option<String>,
    pub org: Option<String>,
    pub project: Option<String>,
    pub env: Option<String>,
    pub name: Option<String>,
    pub key: Option<String>,
    pub optional_key: Option<bool>,
    pub host: Option<String>,
    pub discovery_url: Option<String>,
}
