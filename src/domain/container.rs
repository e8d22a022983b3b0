use super::{
    error::{EnvironmentError, Result},
    model::{EnvironmentConfig, ServiceConfig},
};

/// Everything the container engine needs to build and run one container.
///
/// Updates consume the spec and hand back a new one; once built it is passed to
/// a [`ContainerExecutor`](super::port::ContainerExecutor) by reference.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ContainerSpec {
    pub image: String,
    pub name: Option<String>,
    pub workdir: Option<String>,
    pub command: Option<String>,
    pub setup_commands: Vec<String>,
    pub env: Vec<(String, String)>,
    /// Key and secret-store reference. Never the secret value.
    pub secrets: Vec<(String, String)>,
    pub exposed_ports: Vec<u16>,
}

impl ContainerSpec {
    pub fn from_image(image: impl Into<String>) -> Self {
        Self {
            image: image.into(),
            ..Default::default()
        }
    }

    pub fn with_name(self, name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            ..self
        }
    }

    pub fn with_workdir(self, workdir: impl Into<String>) -> Self {
        Self {
            workdir: Some(workdir.into()),
            ..self
        }
    }

    pub fn with_command(self, command: impl Into<String>) -> Self {
        Self {
            command: Some(command.into()),
            ..self
        }
    }

    pub fn with_setup_command(mut self, command: impl Into<String>) -> Self {
        self.setup_commands.push(command.into());
        self
    }

    /// Binds `key`; an existing binding for the same key is overwritten in place.
    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        upsert(&mut self.env, key.into(), value.into());
        self
    }

    pub fn with_secret(mut self, key: impl Into<String>, reference: impl Into<String>) -> Self {
        upsert(&mut self.secrets, key.into(), reference.into());
        self
    }

    pub fn with_exposed_port(mut self, port: u16) -> Self {
        if !self.exposed_ports.contains(&port) {
            self.exposed_ports.push(port);
        }
        self
    }

    pub fn env_value(&self, key: &str) -> Option<&str> {
        lookup(&self.env, key)
    }

    pub fn secret_reference(&self, key: &str) -> Option<&str> {
        lookup(&self.secrets, key)
    }
}

fn upsert(bindings: &mut Vec<(String, String)>, key: String, value: String) {
    match bindings.iter_mut().find(|(existing, _)| *existing == key) {
        Some((_, current)) => *current = value,
        None => bindings.push((key, value)),
    }
}

fn lookup<'a>(bindings: &'a [(String, String)], key: &str) -> Option<&'a str> {
    bindings
        .iter()
        .find(|(existing, _)| existing == key)
        .map(|(_, value)| value.as_str())
}

/// A running container as reported by the engine.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Container {
    pub id: String,
    pub name: String,
    pub image: String,
    pub started_at: u64,
}

/// Splits on the first `=`. The key may be empty; the value may contain `=`.
pub(crate) fn split_binding(entry: &str) -> Option<(&str, &str)> {
    entry.split_once('=')
}

pub(crate) fn parse_bindings<'a, E>(entries: &'a [String], invalid: E) -> Result<Vec<(&'a str, &'a str)>>
where
    E: Fn(String) -> EnvironmentError,
{
    entries
        .iter()
        .map(|entry| split_binding(entry).ok_or_else(|| invalid(entry.clone())))
        .collect()
}

/// Applies `envs` then `secrets` onto `container`.
///
/// Both lists are fully validated before anything is bound, env first, so the
/// first malformed entry in list order is the one reported.
pub fn container_with_env_and_secrets(
    container: ContainerSpec,
    envs: &[String],
    secrets: &[String],
) -> Result<ContainerSpec> {
    let envs = parse_bindings(envs, EnvironmentError::InvalidEnv)?;
    let secrets = parse_bindings(secrets, EnvironmentError::InvalidSecret)?;

    let container = envs
        .into_iter()
        .fold(container, |container, (key, value)| container.with_env(key, value));
    Ok(secrets
        .into_iter()
        .fold(container, |container, (key, reference)| {
            container.with_secret(key, reference)
        }))
}

/// Primary container of an environment.
pub fn materialize(config: &EnvironmentConfig) -> Result<ContainerSpec> {
    let container = ContainerSpec::from_image(&config.base_image).with_workdir(&config.workdir);
    let container = config
        .setup_commands
        .iter()
        .fold(container, |container, command| container.with_setup_command(command));
    container_with_env_and_secrets(container, &config.env, &config.secrets)
}

pub fn materialize_service(service: &ServiceConfig) -> Result<ContainerSpec> {
    let mut container = ContainerSpec::from_image(&service.image).with_name(&service.name);
    if !service.command.is_empty() {
        container = container.with_command(&service.command);
    }
    let container = service
        .exposed_ports
        .iter()
        .fold(container, |container, port| container.with_exposed_port(*port));
    container_with_env_and_secrets(container, &service.env, &service.secrets)
}
