pub mod settings;

pub use settings::{ClientConfig, ConfigLayer, DEFAULT_CLUSTER, DEFAULT_NAME};

use std::path::Path;

use crate::error::{ClientError, ClientResult};

/// Environment variables read by `ConfigLayer::from_env`.
const ENV_PREFIX: &str = "BASED_";

impl ClientConfig {
    /// Create a config for `org`/`project`/`env` with every other field at
    /// its default.
    pub fn new(org: impl Into<String>, project: impl Into<String>, env: impl Into<String>) -> Self {
        Self {
            cluster: DEFAULT_CLUSTER.to_string(),
            org: org.into(),
            project: project.into(),
            env: env.into(),
            name: DEFAULT_NAME.to_string(),
            key: String::new(),
            optional_key: false,
            host: String::new(),
            discovery_url: String::new(),
        }
    }

    /// Parse and resolve a TOML document.
    pub fn from_toml_str(source: &str) -> ClientResult<Self> {
        ConfigLayer::from_toml_str(source)?.resolve()
    }

    /// Load and resolve a TOML file.
    pub fn load(path: impl AsRef<Path>) -> ClientResult<Self> {
        let source = std::fs::read_to_string(path.as_ref())?;
        Self::from_toml_str(&source)
    }

    /// Resolve defaults < `file` < environment.
    pub fn from_sources(file: Option<&Path>) -> ClientResult<Self> {
        let file_layer = match file {
            Some(path) => Some(ConfigLayer::from_toml_str(&std::fs::read_to_string(path)?)?),
            None => None,
        };
        merge_layers(file_layer, Some(ConfigLayer::from_env()))
            .unwrap_or_default()
            .resolve()
    }

    pub fn validate(&self) -> ClientResult<()> {
        for (field, value) in [
            ("org", &self.org),
            ("project", &self.project),
            ("env", &self.env),
        ] {
            if value.trim().is_empty() {
                return Err(ClientError::config(format!("`{field}` must not be empty")));
            }
        }
        if self.cluster.trim().is_empty() {
            return Err(ClientError::config("`cluster` must not be empty"));
        }
        Ok(())
    }
}

impl ConfigLayer {
    pub fn from_toml_str(source: &str) -> ClientResult<Self> {
        toml::from_str(source).map_err(|e| ClientError::config(e.to_string()))
    }

    /// Read `BASED_ORG`, `BASED_PROJECT`, ... from the process environment.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(format!("{ENV_PREFIX}{key}")).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        Self {
            cluster: lookup("CLUSTER"),
            org: lookup("ORG"),
            project: lookup("PROJECT"),
            env: lookup("ENV"),
            name: lookup("NAME"),
            key: lookup("KEY"),
            optional_key: lookup("OPTIONAL_KEY").map(|v| matches!(v.as_str(), "1" | "true")),
            host: lookup("HOST"),
            discovery_url: lookup("DISCOVERY_URL"),
        }
    }

    /// Apply defaults and validate.
    pub fn resolve(self) -> ClientResult<ClientConfig> {
        let config = ClientConfig {
            cluster: self.cluster.unwrap_or_else(|| DEFAULT_CLUSTER.to_string()),
            org: self.org.unwrap_or_default(),
            project: self.project.unwrap_or_default(),
            env: self.env.unwrap_or_default(),
            name: self.name.unwrap_or_else(|| DEFAULT_NAME.to_string()),
            key: self.key.unwrap_or_default(),
            optional_key: self.optional_key.unwrap_or(false),
            host: self.host.unwrap_or_default(),
            discovery_url: self.discovery_url.unwrap_or_default(),
        };
        config.validate()?;
        Ok(config)
    }
}

/// Merge two layers, preferring values from `primary` over `fallback`
pub fn merge_layers(
    fallback: Option<ConfigLayer>,
    primary: Option<ConfigLayer>,
) -> Option<ConfigLayer> {
    match (fallback, primary) {
        (None, None) => None,
        (Some(layer), None) | (None, Some(layer)) => Some(layer),
        (Some(fallback), Some(primary)) => Some(ConfigLayer {
            cluster: primary.cluster.or(fallback.cluster),
            org: primary.org.or(fallback.org),
            project: primary.project.or(fallback.project),
            env: primary.env.or(fallback.env),
            name: primary.name.or(fallback.name),
            key: primary.key.or(fallback.key),
            optional_key: primary.optional_key.or(fallback.optional_key),
            host: primary.host.or(fallback.host),
            discovery_url: primary.discovery_url.or(fallback.discovery_url),
        }),
    }
}
