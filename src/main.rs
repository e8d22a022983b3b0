use std::error::Error;

use anyhow::anyhow;
use envyard::{
    config::{load_config, AppConfig},
    domain::{self, list_environments, registry::EnvironmentRegistry},
};
use log::info;

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    info!("Start envyard - declarative container environments");

    let config = load_config()?;
    info!("Loaded config {:?}", config);
    let registry = EnvironmentRegistry::open(&config.environments_dir)?;

    let targets: Vec<String> = std::env::args().skip(1).collect();
    if targets.is_empty() {
        for id in list_environments(&registry) {
            info!("Environment {}", id);
        }
        return Ok(());
    }
    start_targets(&config, &registry, targets).await?;
    Ok(())
}

#[cfg(feature = "docker")]
async fn start_targets(
    config: &AppConfig,
    registry: &EnvironmentRegistry,
    targets: Vec<String>,
) -> Result<(), anyhow::Error> {
    use anyhow::Context;
    use bollard::{Docker, API_DEFAULT_VERSION};
    use envyard::infra::{docker::DockerContainerExecutor, secrets::HostSecretStore};

    let docker = Docker::connect_with_socket(&config.docker.socket, 120, API_DEFAULT_VERSION)
        .context("Can't connect to docker socket")?;
    let executor = DockerContainerExecutor {
        config: config.docker.clone(),
        docker,
        secrets: Box::new(HostSecretStore),
    };

    for target in targets {
        let environment = registry
            .get(&target)
            .ok_or(anyhow!("Unknown environment {}", target))?;
        let base_dir = config.environments_dir.join(environment.id());
        let containers = domain::start_environment(&environment, &base_dir, &executor).await?;
        info!(
            "Environment {} running with {} containers",
            environment.id(),
            containers.len()
        );
    }
    Ok(())
}

#[cfg(not(feature = "docker"))]
async fn start_targets(
    _config: &AppConfig,
    _registry: &EnvironmentRegistry,
    targets: Vec<String>,
) -> Result<(), anyhow::Error> {
    Err(anyhow!("Can't start {:?}: built without a container engine", targets))
}
