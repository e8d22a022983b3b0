use std::{path::Path, sync::Arc};

use anyhow::{anyhow, Context, Error};
use log::{info, warn};

use container::Container;
use environment::Environment;
use error::EnvironmentError;
use model::EnvironmentConfig;
use port::ContainerExecutor;
use registry::EnvironmentRegistry;

pub mod container;
pub mod environment;
pub mod error;
pub mod history;
pub mod model;
pub mod port;
pub mod registry;
pub mod store;

/// Registers `config` as `<project>/<name>` and persists it under
/// `<root>/<project>/<name>`. The registration is undone if saving fails.
pub fn create_environment(
    registry: &EnvironmentRegistry,
    root: &Path,
    project: &str,
    name: &str,
    config: EnvironmentConfig,
) -> Result<Arc<Environment>, EnvironmentError> {
    for part in [project, name] {
        if !valid_identifier(part) {
            return Err(EnvironmentError::InvalidIdentifier(part.to_string()));
        }
    }
    let id = format!("{}/{}", project, name);

    let environment = Environment::new(id, name, config)?;
    environment.commit("create");
    let environment = registry.register(environment)?;
    if let Err(e) = environment.save(root.join(project).join(name)) {
        registry.remove(environment.id());
        return Err(e);
    }
    info!("Environment {} created", environment.id());
    Ok(environment)
}

fn valid_identifier(part: &str) -> bool {
    !part.is_empty()
        && !part.starts_with('.')
        && part
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
}

/// Starts the primary container and every service, unless containers for the
/// environment are already running.
///
/// `base_dir` is where the environment is stored; its advisory lock is checked
/// first and held while containers are being started.
pub async fn start_environment(
    environment: &Environment,
    base_dir: &Path,
    executor: &(dyn ContainerExecutor + Sync + Send),
) -> Result<Vec<Container>, Error> {
    if EnvironmentConfig::locked(base_dir) {
        return Err(anyhow!("Environment {} is locked", environment.id()));
    }
    let running = executor.running(environment.id()).await?;
    if !running.is_empty() {
        info!(
            "Environment {} already has {} running containers",
            environment.id(),
            running.len()
        );
        return Ok(running);
    }

    EnvironmentConfig::lock(base_dir)?;
    let started = start_containers(environment, executor).await;
    let unlocked = EnvironmentConfig::unlock(base_dir);
    let containers = started?;
    unlocked?;
    Ok(containers)
}

// Either everything comes up or whatever was started is stopped again, so a
// later start never mistakes a partial environment for a running one.
async fn start_containers(
    environment: &Environment,
    executor: &(dyn ContainerExecutor + Sync + Send),
) -> Result<Vec<Container>, Error> {
    let mut containers = Vec::new();
    match start_each(environment, executor, &mut containers).await {
        Ok(()) => Ok(containers),
        Err(e) => {
            for container in containers.iter() {
                if let Err(stop) = executor.stop(container).await {
                    warn!("Can't stop container {} after failed start: {:?}", container.id, stop);
                }
            }
            Err(e)
        }
    }
}

async fn start_each(
    environment: &Environment,
    executor: &(dyn ContainerExecutor + Sync + Send),
    containers: &mut Vec<Container>,
) -> Result<(), Error> {
    let services = environment.services()?;
    for service in services.iter() {
        let container = executor
            .start(environment.id(), service)
            .await
            .with_context(|| {
                format!(
                    "Can't start service {} of environment {}",
                    service.name.as_deref().unwrap_or_default(),
                    environment.id()
                )
            })?;
        info!("Service {} started", container.name);
        containers.push(container);
    }
    let primary = executor
        .start(environment.id(), &environment.container())
        .await
        .with_context(|| format!("Can't start environment {}", environment.id()))?;
    info!("Environment {} started as {}", environment.id(), primary.id);
    containers.push(primary);
    Ok(())
}

pub async fn stop_environment(
    environment: &Environment,
    executor: &(dyn ContainerExecutor + Sync + Send),
) -> Result<(), Error> {
    let containers = executor.running(environment.id()).await?;
    if containers.is_empty() {
        return Err(anyhow!("Environment {} is not running", environment.id()));
    }
    futures::future::join_all(containers.iter().map(|container| executor.stop(container)))
        .await
        .into_iter()
        .collect::<Result<(), Error>>()?;
    info!(
        "Environment {} stopped ({} containers)",
        environment.id(),
        containers.len()
    );
    Ok(())
}

pub fn list_environments(registry: &EnvironmentRegistry) -> Vec<String> {
    registry
        .list()
        .iter()
        .map(|environment| environment.id().to_string())
        .collect()
}
