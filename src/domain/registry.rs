use std::{collections::HashMap, fs, path::Path, sync::Arc};

use log::{debug, info};
use parking_lot::RwLock;

use super::{
    environment::Environment,
    error::{EnvironmentError, Result},
    store::config_dir,
};

/// Known environments keyed by id. Shared by reference; the lock lives here.
#[derive(Debug, Default)]
pub struct EnvironmentRegistry {
    environments: RwLock<HashMap<String, Arc<Environment>>>,
}

impl EnvironmentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers every `<root>/<project>/<slug>` that holds a configuration, with
    /// id `<project>/<slug>` and name `<slug>`. A missing root yields an empty
    /// registry. Loaded environments start with an empty history.
    pub fn open(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref();
        let registry = Self::new();
        if !root.is_dir() {
            info!("No environments directory at {}", root.display());
            return Ok(registry);
        }

        for project in read_dirs(root)? {
            for slug in read_dirs(&project)? {
                if !config_dir(&slug).is_dir() {
                    continue;
                }
                let (Some(project_name), Some(slug_name)) = (file_name(&project), file_name(&slug))
                else {
                    continue;
                };
                let id = format!("{}/{}", project_name, slug_name);
                debug!("Loading environment {} from {}", id, slug.display());
                registry.register(Environment::load(id, slug_name, &slug)?)?;
            }
        }
        info!("Loaded {} environments from {}", registry.len(), root.display());
        Ok(registry)
    }

    pub fn register(&self, environment: Environment) -> Result<Arc<Environment>> {
        let mut environments = self.environments.write();
        if environments.contains_key(environment.id()) {
            return Err(EnvironmentError::AlreadyRegistered(environment.id().to_string()));
        }
        let environment = Arc::new(environment);
        environments.insert(environment.id().to_string(), environment.clone());
        Ok(environment)
    }

    /// Exact id match first, then exact name match. Among several environments
    /// sharing a name, which one is returned is unspecified.
    pub fn get(&self, id_or_name: &str) -> Option<Arc<Environment>> {
        let environments = self.environments.read();
        environments
            .get(id_or_name)
            .or_else(|| {
                environments
                    .values()
                    .find(|environment| environment.name() == id_or_name)
            })
            .cloned()
    }

    pub fn remove(&self, id: &str) -> Option<Arc<Environment>> {
        self.environments.write().remove(id)
    }

    /// Sorted by id.
    pub fn list(&self) -> Vec<Arc<Environment>> {
        let mut environments: Vec<_> = self.environments.read().values().cloned().collect();
        environments.sort_by(|a, b| a.id().cmp(b.id()));
        environments
    }

    pub fn len(&self) -> usize {
        self.environments.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.environments.read().is_empty()
    }
}

fn read_dirs(dir: &Path) -> Result<Vec<std::path::PathBuf>> {
    let entries = fs::read_dir(dir).map_err(|e| EnvironmentError::io(dir, e))?;
    let mut dirs = Vec::new();
    for entry in entries {
        let path = entry.map_err(|e| EnvironmentError::io(dir, e))?.path();
        if path.is_dir() && !file_name(&path).is_some_and(|name| name.starts_with('.')) {
            dirs.push(path);
        }
    }
    Ok(dirs)
}

fn file_name(path: &Path) -> Option<String> {
    path.file_name()
        .and_then(|name| name.to_str())
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use rstest::rstest;
    use tempfile::TempDir;

    use super::*;
    use crate::domain::model::EnvironmentConfig;

    fn registry() -> EnvironmentRegistry {
        let registry = EnvironmentRegistry::new();
        for (id, name) in [
            ("project1/env-1", "project1"),
            ("project2/env-2", "project2"),
            ("test/unique", "unique"),
            ("app/env-1", "app"),
        ] {
            registry
                .register(Environment::new(id, name, EnvironmentConfig::default()).unwrap())
                .unwrap();
        }
        registry
    }

    #[rstest]
    #[case::exact_id("project1/env-1", Some("project1/env-1"))]
    #[case::by_name("unique", Some("test/unique"))]
    #[case::by_name_with_prefix("project1", Some("project1/env-1"))]
    #[case::unknown_id("nonexistent/id", None)]
    #[case::unknown_name("nonexistent", None)]
    #[case::empty("", None)]
    #[case::partial_id("project1/", None)]
    #[case::slug_is_not_a_name("env-1", None)]
    fn get_by_id_or_name(#[case] lookup: &str, #[case] id: Option<&str>) {
        let registry = registry();
        assert_eq!(registry.get(lookup).as_deref().map(Environment::id), id);
    }

    #[test]
    fn get_returns_registered_instance() {
        let registry = registry();
        let first = registry.get("test/unique").unwrap();
        let second = registry.get("unique").unwrap();
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[test]
    fn id_match_wins_over_name_match() {
        let registry = EnvironmentRegistry::new();
        registry
            .register(Environment::new("shadow", "other", EnvironmentConfig::default()).unwrap())
            .unwrap();
        registry
            .register(Environment::new("team/shadow", "shadow", EnvironmentConfig::default()).unwrap())
            .unwrap();

        assert_eq!(registry.get("shadow").unwrap().id(), "shadow");
    }

    #[test]
    fn register_rejects_duplicate_ids() {
        let registry = registry();
        let err = registry
            .register(Environment::new("app/env-1", "again", EnvironmentConfig::default()).unwrap())
            .unwrap_err();
        assert!(matches!(err, EnvironmentError::AlreadyRegistered(ref id) if id == "app/env-1"));
        assert_eq!(registry.len(), 4);
    }

    #[test]
    fn remove_and_list() {
        let registry = registry();
        assert!(registry.remove("app/env-1").is_some());
        assert!(registry.remove("app/env-1").is_none());

        let ids: Vec<_> = registry.list().iter().map(|env| env.id().to_string()).collect();
        assert_eq!(ids, vec!["project1/env-1", "project2/env-2", "test/unique"]);
    }

    #[test]
    fn open_discovers_saved_environments() {
        let temp = TempDir::new().unwrap();
        let config = EnvironmentConfig {
            instructions: "build it".to_string(),
            env: vec!["A=1".to_string()],
            ..Default::default()
        };
        config.save(temp.path().join("shop").join("api")).unwrap();
        config.save(temp.path().join("shop").join("web")).unwrap();
        std::fs::create_dir_all(temp.path().join("shop").join("not-an-env")).unwrap();
        std::fs::write(temp.path().join("README.md"), "ignored").unwrap();

        let registry = EnvironmentRegistry::open(temp.path()).unwrap();

        assert_eq!(registry.len(), 2);
        let api = registry.get("api").unwrap();
        assert_eq!(api.id(), "shop/api");
        assert_eq!(api.config(), config);
    }

    #[test]
    fn open_missing_root_is_empty() {
        let temp = TempDir::new().unwrap();
        let registry = EnvironmentRegistry::open(temp.path().join("nowhere")).unwrap();
        assert!(registry.is_empty());
    }

    #[test]
    fn open_surfaces_malformed_environment() {
        let temp = TempDir::new().unwrap();
        let dir = config_dir(&temp.path().join("shop").join("broken"));
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join(crate::domain::store::INSTRUCTIONS_FILE), "").unwrap();
        std::fs::write(dir.join(crate::domain::store::ENVIRONMENT_FILE), "{").unwrap();

        let err = EnvironmentRegistry::open(temp.path()).unwrap_err();
        assert!(matches!(err, EnvironmentError::MalformedData { .. }));
    }
}
