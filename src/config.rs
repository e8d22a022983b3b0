use std::path::PathBuf;

use anyhow::{Context, Error};
use config::{Config, Source};

pub const CONFIG_FILE: &str = "envyard";

#[derive(Debug, serde_derive::Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct AppConfig {
    /// Holds one `<project>/<slug>` directory per environment.
    pub environments_dir: PathBuf,
    pub docker: DockerConfig,
}

#[derive(Debug, Clone, serde_derive::Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct DockerConfig {
    pub socket: String,
    pub network: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            environments_dir: PathBuf::from("environments"),
            docker: DockerConfig::default(),
        }
    }
}

impl Default for DockerConfig {
    fn default() -> Self {
        Self {
            socket: "/var/run/docker.sock".to_string(),
            network: "envyard".to_string(),
        }
    }
}

/// `envyard.toml` in the working directory if present, then `ENVYARD__*` variables.
pub fn load_config() -> Result<AppConfig, Error> {
    load_config_with(config::File::with_name(CONFIG_FILE).required(false))
}

fn load_config_with<S>(file: S) -> Result<AppConfig, Error>
where
    S: Source + Send + Sync + 'static,
{
    let config = Config::builder()
        .add_source(file)
        .add_source(config::Environment::with_prefix("envyard").separator("__"))
        .build()
        .context("Can't load configuration")?;

    config
        .try_deserialize()
        .context("Can't deserialize AppConfig from loaded configuration")
}

#[cfg(test)]
mod tests {
    use config::{File, FileFormat};
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn defaults_without_sources() {
        let config = load_config_with(File::from_str("", FileFormat::Toml)).unwrap();
        assert_eq!(config, AppConfig::default());
    }

    #[test]
    fn file_overrides_defaults() {
        let config = load_config_with(File::from_str(
            r#"
            environments_dir = "/srv/envyard"

            [docker]
            network = "sandbox"
            "#,
            FileFormat::Toml,
        ))
        .unwrap();

        assert_eq!(config.environments_dir, PathBuf::from("/srv/envyard"));
        assert_eq!(config.docker.network, "sandbox");
        assert_eq!(config.docker.socket, "/var/run/docker.sock");
    }
}
