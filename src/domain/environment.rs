use std::path::Path;

use log::debug;
use parking_lot::Mutex;

use super::{
    container::{materialize, materialize_service, parse_bindings, ContainerSpec},
    error::{EnvironmentError, Result},
    history::{History, Revision},
    model::EnvironmentConfig,
};

/// A registered environment. `id` is conventionally `<project>/<slug>`.
#[derive(Debug)]
pub struct Environment {
    id: String,
    name: String,
    state: Mutex<State>,
}

#[derive(Debug)]
struct State {
    config: EnvironmentConfig,
    history: History,
    container: ContainerSpec,
}

impl Environment {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        config: EnvironmentConfig,
    ) -> Result<Self> {
        let container = materialize(&config)?;
        Ok(Self {
            id: id.into(),
            name: name.into(),
            state: Mutex::new(State {
                config,
                history: History::default(),
                container,
            }),
        })
    }

    /// Reads the configuration stored under `base_dir`.
    ///
    /// Revisions live only in memory: the loaded environment starts with an
    /// empty history, whatever was committed before it was saved.
    pub fn load(
        id: impl Into<String>,
        name: impl Into<String>,
        base_dir: impl AsRef<Path>,
    ) -> Result<Self> {
        let mut config = EnvironmentConfig::default();
        config.load(base_dir)?;
        Self::new(id, name, config)
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config(&self) -> EnvironmentConfig {
        self.state.lock().config.clone()
    }

    pub fn history(&self) -> History {
        self.state.lock().history.clone()
    }

    pub fn container(&self) -> ContainerSpec {
        self.state.lock().container.clone()
    }

    pub fn services(&self) -> Result<Vec<ContainerSpec>> {
        let state = self.state.lock();
        state.config.services.iter().map(materialize_service).collect()
    }

    pub fn save(&self, base_dir: impl AsRef<Path>) -> Result<()> {
        self.state.lock().config.save(base_dir)
    }

    /// Records a revision named `name` without changing anything else.
    pub fn commit(&self, name: impl Into<String>) -> Revision {
        let mut state = self.state.lock();
        commit(&mut state, name.into())
    }

    /// Adds `envs` to the primary container and to the configuration, recording
    /// a revision named `label`. Nothing changes if any entry lacks a `=`.
    pub fn set_env(&self, label: &str, envs: &[String]) -> Result<Revision> {
        let bindings = parse_bindings(envs, EnvironmentError::InvalidEnvironmentVariable)?;

        let mut state = self.state.lock();
        let container = bindings
            .into_iter()
            .fold(state.container.clone(), |container, (key, value)| {
                container.with_env(key, value)
            });
        state.container = container;
        state.config.env.extend(envs.iter().cloned());
        debug!("Set {} variables on environment {}", envs.len(), self.id);
        Ok(commit(&mut state, label.to_string()))
    }

    /// Swaps in a whole new configuration. The current one stays untouched if the
    /// new one does not materialize.
    pub fn update_config(&self, label: &str, config: EnvironmentConfig) -> Result<Revision> {
        let container = materialize(&config)?;
        let mut state = self.state.lock();
        state.config = config;
        state.container = container;
        Ok(commit(&mut state, label.to_string()))
    }
}

fn commit(state: &mut State, name: String) -> Revision {
    let revision = Revision::new(state.history.latest_version() + 1, name);
    state.history.push(revision.clone());
    revision
}
