use std::{
    collections::HashMap,
    time::{SystemTime, UNIX_EPOCH},
};

use anyhow::{anyhow, Context, Error};
use async_trait::async_trait;
use bollard::{
    container::{
        Config, CreateContainerOptions, ListContainersOptions, LogOutput, NetworkingConfig,
        RemoveContainerOptions, StartContainerOptions,
    },
    exec::{CreateExecOptions, StartExecResults},
    image::CreateImageOptions,
    network::CreateNetworkOptions,
    secret::{CreateImageInfo, EndpointSettings, HostConfig, RestartPolicy, RestartPolicyNameEnum},
    Docker,
};
use futures::{StreamExt, TryStreamExt};
use log::{info, warn};
use map_macro::hash_map;
use rand::{distributions::Alphanumeric, Rng};

use crate::{
    config::DockerConfig,
    domain::{
        container::{Container, ContainerSpec},
        port::{ContainerExecutor, SecretStore},
    },
};

const ENVIRONMENT_LABEL: &str = "envyard.environment.id";
const SERVICE_LABEL: &str = "envyard.service.name";

pub struct DockerContainerExecutor {
    pub config: DockerConfig,
    pub docker: Docker,
    pub secrets: Box<dyn SecretStore + Send + Sync>,
}

#[async_trait]
impl ContainerExecutor for DockerContainerExecutor {
    async fn start(&self, environment_id: &str, spec: &ContainerSpec) -> Result<Container, Error> {
        self.ensure_network().await?;
        self.ensure_image(&spec.image).await?;

        let mut labels = hash_map! {
            ENVIRONMENT_LABEL.to_string() => environment_id.to_string()
        };
        if let Some(ref service) = spec.name {
            labels.insert(SERVICE_LABEL.to_string(), service.clone());
        }

        // The primary container has nothing to run on its own, keep it alive.
        let cmd = match spec.command {
            Some(ref command) => Some(vec!["sh".to_string(), "-c".to_string(), command.clone()]),
            None if spec.name.is_none() => Some(vec!["sleep".to_string(), "infinity".to_string()]),
            None => None,
        };
        let config = Config {
            image: Some(spec.image.clone()),
            env: Some(self.container_env(spec)?),
            working_dir: spec.workdir.clone(),
            cmd,
            labels: Some(labels),
            exposed_ports: Some(
                spec.exposed_ports
                    .iter()
                    .map(|port| (format!("{}/tcp", port), HashMap::new()))
                    .collect(),
            ),
            host_config: Some(HostConfig {
                restart_policy: Some(RestartPolicy {
                    name: Some(RestartPolicyNameEnum::ON_FAILURE),
                    maximum_retry_count: Some(3),
                }),
                ..Default::default()
            }),
            networking_config: Some(NetworkingConfig {
                endpoints_config: hash_map! {
                    self.config.network.clone() => EndpointSettings {
                        aliases: spec.name.clone().map(|name| vec![name]),
                        ..Default::default()
                    }
                },
            }),
            ..Default::default()
        };
        self.create_and_start(environment_id, spec, config).await
    }

    async fn running(&self, environment_id: &str) -> Result<Vec<Container>, Error> {
        let label = format!("{}={}", ENVIRONMENT_LABEL, environment_id);
        let containers = self
            .docker
            .list_containers(Some(ListContainersOptions {
                filters: hash_map! {
                    "label" => vec![label.as_str()]
                },
                ..Default::default()
            }))
            .await?;
        Ok(containers
            .into_iter()
            .filter_map(|docker_container| {
                let id = docker_container.id?;
                Some(Container {
                    name: docker_container
                        .names
                        .and_then(|names| names.first().cloned())
                        .map(|name| name.trim_start_matches('/').to_string())
                        .unwrap_or_else(|| id.clone()),
                    id,
                    image: docker_container.image.unwrap_or_default(),
                    started_at: docker_container
                        .created
                        .and_then(|created| u64::try_from(created).ok())
                        .unwrap_or_default(),
                })
            })
            .collect())
    }

    async fn stop(&self, container: &Container) -> Result<(), Error> {
        self.docker
            .remove_container(
                container.id.as_str(),
                Some(RemoveContainerOptions {
                    force: true,
                    v: true,
                    ..Default::default()
                }),
            )
            .await
            .context(format!("Error while removing container {}", container.id))
    }
}

impl DockerContainerExecutor {
    // Secret references are only turned into values here, at run time.
    fn container_env(&self, spec: &ContainerSpec) -> Result<Vec<String>, Error> {
        let mut env: Vec<String> = spec
            .env
            .iter()
            .map(|(key, value)| format!("{}={}", key, value))
            .collect();
        for (key, reference) in spec.secrets.iter() {
            let value = self
                .secrets
                .resolve(reference)
                .with_context(|| format!("Can't resolve secret {}", key))?;
            env.push(format!("{}={}", key, value));
        }
        Ok(env)
    }

    async fn create_and_start(
        &self,
        environment_id: &str,
        spec: &ContainerSpec,
        config: Config<String>,
    ) -> Result<Container, Error> {
        let name = format!(
            "{}.{}.{}",
            environment_id.replace('/', "."),
            spec.name.as_deref().unwrap_or("main"),
            rand::thread_rng()
                .sample_iter(&Alphanumeric)
                .take(7)
                .map(char::from)
                .collect::<String>()
                .to_lowercase()
        );
        let container = self
            .docker
            .create_container(
                Some(CreateContainerOptions {
                    name: name.clone(),
                    platform: None,
                }),
                config,
            )
            .await
            .context(format!("Can't create container {}", name))?;
        self.docker
            .start_container(container.id.as_str(), None::<StartContainerOptions<String>>)
            .await?;
        info!("Container {} started from {}", name, spec.image);

        for command in spec.setup_commands.iter() {
            self.exec(container.id.as_str(), command).await?;
        }

        Ok(Container {
            id: container.id,
            name,
            image: spec.image.clone(),
            started_at: SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map(|elapsed| elapsed.as_secs())
                .unwrap_or_default(),
        })
    }

    async fn exec(&self, container_id: &str, command: &str) -> Result<(), Error> {
        info!("Setup => {}", command);
        let exec = self
            .docker
            .create_exec(
                container_id,
                CreateExecOptions {
                    cmd: Some(vec!["sh", "-c", command]),
                    attach_stdout: Some(true),
                    attach_stderr: Some(true),
                    ..Default::default()
                },
            )
            .await?;
        if let StartExecResults::Attached { mut output, .. } =
            self.docker.start_exec(&exec.id, None).await?
        {
            while let Some(Ok(output)) = output.next().await {
                match output {
                    LogOutput::StdOut { message } => info!("Setup => {:?}", message),
                    LogOutput::StdErr { message } => warn!("Setup => {:?}", message),
                    _ => {}
                }
            }
        }
        match self.docker.inspect_exec(&exec.id).await?.exit_code {
            Some(0) | None => Ok(()),
            Some(code) => Err(anyhow!(
                "Setup command `{}` failed with exit code {}",
                command,
                code
            )),
        }
    }

    async fn ensure_image(&self, image: &str) -> Result<(), Error> {
        if self.docker.inspect_image(image).await.is_ok() {
            return Ok(());
        }
        info!("Pull image {}", image);
        self.docker
            .create_image(
                Some(CreateImageOptions {
                    from_image: image,
                    ..Default::default()
                }),
                None,
                None,
            )
            .try_collect::<Vec<CreateImageInfo>>()
            .await
            .context("Error while pulling image")?;
        Ok(())
    }

    async fn ensure_network(&self) -> Result<(), Error> {
        let network = self.config.network.as_str();
        if self
            .docker
            .inspect_network::<String>(network, None)
            .await
            .is_ok()
        {
            return Ok(());
        }
        info!("Creating docker network {}", network);
        self.docker
            .create_network(CreateNetworkOptions {
                name: network,
                ..Default::default()
            })
            .await
            .context(format!("Can't create docker network {}", network))?;
        Ok(())
    }
}
