use anyhow::Error;
use async_trait::async_trait;

use super::container::{Container, ContainerSpec};

#[async_trait]
pub trait ContainerExecutor {
    async fn start(&self, environment_id: &str, spec: &ContainerSpec) -> Result<Container, Error>;

    async fn running(&self, environment_id: &str) -> Result<Vec<Container>, Error>;

    async fn stop(&self, container: &Container) -> Result<(), Error>;
}

/// Turns a secret reference into its value. Only executors call this, right
/// before handing the value to the engine.
pub trait SecretStore {
    fn resolve(&self, reference: &str) -> Result<String, Error>;
}
