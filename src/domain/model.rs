use std::ops::{Deref, DerefMut};

use serde::{Deserialize, Serialize};

pub const DEFAULT_IMAGE: &str = "ubuntu:24.04";
pub const DEFAULT_WORKDIR: &str = "/workdir";
pub const DEFAULT_INSTRUCTIONS: &str =
    "No instructions found. Please look around the filesystem and update me";

/// Desired state of one environment.
///
/// `instructions` never goes through the JSON document: it is persisted on its
/// own as raw text next to it (see `store`).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EnvironmentConfig {
    #[serde(skip)]
    pub instructions: String,
    pub workdir: String,
    pub base_image: String,
    #[serde(default)]
    pub setup_commands: Vec<String>,
    /// `KEY=VALUE` entries, kept in order and never deduplicated.
    #[serde(default)]
    pub env: Vec<String>,
    /// `KEY=REFERENCE` entries pointing into a secret store.
    #[serde(default)]
    pub secrets: Vec<String>,
    #[serde(default)]
    pub services: ServiceConfigs,
}

impl Default for EnvironmentConfig {
    fn default() -> Self {
        Self {
            instructions: DEFAULT_INSTRUCTIONS.to_string(),
            workdir: DEFAULT_WORKDIR.to_string(),
            base_image: DEFAULT_IMAGE.to_string(),
            setup_commands: Vec::new(),
            env: Vec::new(),
            secrets: Vec::new(),
            services: ServiceConfigs::default(),
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ServiceConfig {
    pub name: String,
    pub image: String,
    #[serde(default)]
    pub command: String,
    #[serde(default)]
    pub exposed_ports: Vec<u16>,
    #[serde(default)]
    pub env: Vec<String>,
    #[serde(default)]
    pub secrets: Vec<String>,
}

/// Side-car services in declaration order. Names are not required to be unique.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ServiceConfigs(Vec<ServiceConfig>);

impl ServiceConfigs {
    /// First service whose name is exactly `name`; later duplicates are shadowed.
    pub fn get(&self, name: &str) -> Option<&ServiceConfig> {
        self.0.iter().find(|service| service.name == name)
    }
}

impl Deref for ServiceConfigs {
    type Target = Vec<ServiceConfig>;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl DerefMut for ServiceConfigs {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.0
    }
}

impl From<Vec<ServiceConfig>> for ServiceConfigs {
    fn from(services: Vec<ServiceConfig>) -> Self {
        Self(services)
    }
}

impl FromIterator<ServiceConfig> for ServiceConfigs {
    fn from_iter<I: IntoIterator<Item = ServiceConfig>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl<'a> IntoIterator for &'a ServiceConfigs {
    type Item = &'a ServiceConfig;
    type IntoIter = std::slice::Iter<'a, ServiceConfig>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}
