//! On-disk layout of an environment configuration.
//!
//! ```text
//! <base_dir>/.envyard/
//!     AGENT.md          instructions, verbatim
//!     environment.json  everything else, pretty printed
//!     lock              advisory marker, content ignored
//! ```

use std::{
    fs::{self, OpenOptions},
    io::Write,
    path::{Path, PathBuf},
};

use log::debug;

use super::{
    error::{EnvironmentError, Result},
    model::EnvironmentConfig,
};

pub const CONFIG_DIR: &str = ".envyard";
pub const INSTRUCTIONS_FILE: &str = "AGENT.md";
pub const ENVIRONMENT_FILE: &str = "environment.json";
pub const LOCK_FILE: &str = "lock";

pub fn config_dir(base_dir: &Path) -> PathBuf {
    base_dir.join(CONFIG_DIR)
}

impl EnvironmentConfig {
    pub fn save(&self, base_dir: impl AsRef<Path>) -> Result<()> {
        let dir = config_dir(base_dir.as_ref());
        fs::create_dir_all(&dir).map_err(|e| EnvironmentError::io(&dir, e))?;

        write_atomic(&dir.join(INSTRUCTIONS_FILE), self.instructions.as_bytes())?;

        let environment_path = dir.join(ENVIRONMENT_FILE);
        let document = serde_json::to_vec_pretty(self).map_err(|source| {
            EnvironmentError::MalformedData {
                path: environment_path.clone(),
                source,
            }
        })?;
        write_atomic(&environment_path, &document)?;

        debug!("Saved environment configuration to {}", dir.display());
        Ok(())
    }

    /// Replaces every field of `self` with what is stored under `base_dir`.
    /// Nothing is modified unless both files are read and parsed.
    pub fn load(&mut self, base_dir: impl AsRef<Path>) -> Result<()> {
        let dir = config_dir(base_dir.as_ref());

        let instructions_path = dir.join(INSTRUCTIONS_FILE);
        let instructions = fs::read_to_string(&instructions_path)
            .map_err(|e| EnvironmentError::read(&instructions_path, e))?;

        let environment_path = dir.join(ENVIRONMENT_FILE);
        let document = fs::read(&environment_path)
            .map_err(|e| EnvironmentError::read(&environment_path, e))?;
        let parsed: EnvironmentConfig =
            serde_json::from_slice(&document).map_err(|source| EnvironmentError::MalformedData {
                path: environment_path,
                source,
            })?;

        *self = EnvironmentConfig {
            instructions,
            ..parsed
        };
        Ok(())
    }

    /// Only checks whether the lock marker exists. Never fails.
    pub fn locked(base_dir: impl AsRef<Path>) -> bool {
        config_dir(base_dir.as_ref()).join(LOCK_FILE).exists()
    }

    /// Drops the lock marker, holding the current process id.
    pub fn lock(base_dir: impl AsRef<Path>) -> Result<()> {
        let dir = config_dir(base_dir.as_ref());
        fs::create_dir_all(&dir).map_err(|e| EnvironmentError::io(&dir, e))?;
        let path = dir.join(LOCK_FILE);
        fs::write(&path, std::process::id().to_string())
            .map_err(|e| EnvironmentError::io(&path, e))
    }

    pub fn unlock(base_dir: impl AsRef<Path>) -> Result<()> {
        let path = config_dir(base_dir.as_ref()).join(LOCK_FILE);
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(EnvironmentError::io(&path, e)),
        }
    }
}

// Write to a temp sibling then rename, so readers never see a half written file.
fn write_atomic(path: &Path, content: &[u8]) -> Result<()> {
    let temp_name = format!(
        ".{}.{}.tmp",
        path.file_name()
            .map(|name| name.to_string_lossy())
            .unwrap_or_default(),
        std::process::id()
    );
    let temp_path = path.with_file_name(temp_name);

    let mut temp_file = OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .open(&temp_path)
        .map_err(|e| EnvironmentError::io(&temp_path, e))?;
    temp_file
        .write_all(content)
        .and_then(|_| temp_file.sync_all())
        .map_err(|e| EnvironmentError::io(&temp_path, e))?;

    fs::rename(&temp_path, path).map_err(|e| EnvironmentError::io(path, e))
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    use super::*;
    use crate::domain::model::ServiceConfig;

    fn write_files(base: &Path, instructions: Option<&str>, environment: Option<&str>) {
        let dir = config_dir(base);
        fs::create_dir_all(&dir).unwrap();
        if let Some(instructions) = instructions {
            fs::write(dir.join(INSTRUCTIONS_FILE), instructions).unwrap();
        }
        if let Some(environment) = environment {
            fs::write(dir.join(ENVIRONMENT_FILE), environment).unwrap();
        }
    }

    #[test]
    fn save_writes_both_files() {
        let temp = TempDir::new().unwrap();
        let config = EnvironmentConfig {
            instructions: "test with services".to_string(),
            env: vec!["TEST=value".to_string()],
            services: vec![ServiceConfig {
                name: "web".to_string(),
                image: "nginx".to_string(),
                exposed_ports: vec![80],
                ..Default::default()
            }]
            .into(),
            ..Default::default()
        };

        config.save(temp.path()).unwrap();

        let dir = temp.path().join(CONFIG_DIR);
        assert_eq!(
            fs::read_to_string(dir.join(INSTRUCTIONS_FILE)).unwrap(),
            "test with services"
        );
        let document = fs::read_to_string(dir.join(ENVIRONMENT_FILE)).unwrap();
        assert!(document.contains("\n  \"workdir\""), "not indented: {document}");
        let saved: EnvironmentConfig = serde_json::from_str(&document).unwrap();
        assert_eq!(
            saved,
            EnvironmentConfig {
                instructions: String::new(),
                ..config
            }
        );
    }

    #[test]
    fn save_overwrites_previous_content() {
        let temp = TempDir::new().unwrap();
        let mut config = EnvironmentConfig {
            instructions: "a much longer first set of instructions".to_string(),
            ..Default::default()
        };
        config.save(temp.path()).unwrap();
        config.instructions = "short".to_string();
        config.save(temp.path()).unwrap();

        let dir = temp.path().join(CONFIG_DIR);
        assert_eq!(fs::read_to_string(dir.join(INSTRUCTIONS_FILE)).unwrap(), "short");
        let leftovers: Vec<_> = fs::read_dir(&dir)
            .unwrap()
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.file_name().to_string_lossy().ends_with(".tmp"))
            .collect();
        assert!(leftovers.is_empty());
    }

    #[test]
    fn save_then_load_round_trips() {
        let temp = TempDir::new().unwrap();
        let config = EnvironmentConfig {
            instructions: "x".to_string(),
            workdir: "/w".to_string(),
            base_image: "img".to_string(),
            env: vec!["A=1".to_string()],
            ..Default::default()
        };
        config.save(temp.path()).unwrap();

        let mut loaded = EnvironmentConfig::default();
        loaded.load(temp.path()).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn load_replaces_prior_state() {
        let temp = TempDir::new().unwrap();
        write_files(
            temp.path(),
            Some("test instructions for loading"),
            Some(r#"{"workdir": "/test/workdir", "base_image": "test:latest", "setup_commands": ["echo test"], "env": ["TEST=value"], "services": [{"name": "web", "image": "nginx"}]}"#),
        );

        let mut config = EnvironmentConfig {
            secrets: vec!["STALE=env://STALE".to_string()],
            ..Default::default()
        };
        config.load(temp.path()).unwrap();

        assert_eq!(
            config,
            EnvironmentConfig {
                instructions: "test instructions for loading".to_string(),
                workdir: "/test/workdir".to_string(),
                base_image: "test:latest".to_string(),
                setup_commands: vec!["echo test".to_string()],
                env: vec!["TEST=value".to_string()],
                secrets: vec![],
                services: vec![ServiceConfig {
                    name: "web".to_string(),
                    image: "nginx".to_string(),
                    ..Default::default()
                }]
                .into(),
            }
        );
    }

    #[test]
    fn load_without_instructions_is_not_found() {
        let temp = TempDir::new().unwrap();
        write_files(temp.path(), None, Some(r#"{"workdir": "/test", "base_image": "img"}"#));

        let err = EnvironmentConfig::default().load(temp.path()).unwrap_err();
        assert!(matches!(err, EnvironmentError::NotFound { ref path, .. } if path.ends_with(INSTRUCTIONS_FILE)));
    }

    #[test]
    fn load_without_environment_file_is_not_found() {
        let temp = TempDir::new().unwrap();
        write_files(temp.path(), Some("test"), None);

        let err = EnvironmentConfig::default().load(temp.path()).unwrap_err();
        assert!(matches!(err, EnvironmentError::NotFound { ref path, .. } if path.ends_with(ENVIRONMENT_FILE)));
    }

    #[test]
    fn load_invalid_json_is_malformed() {
        let temp = TempDir::new().unwrap();
        write_files(temp.path(), Some("test"), Some("invalid json"));

        let mut config = EnvironmentConfig::default();
        let err = config.load(temp.path()).unwrap_err();
        assert!(matches!(err, EnvironmentError::MalformedData { .. }));
        assert!(err.to_string().contains("expected value"), "{err}");
        assert_eq!(config, EnvironmentConfig::default());
    }

    #[test]
    fn locked_when_marker_present() {
        let temp = TempDir::new().unwrap();
        assert!(!EnvironmentConfig::locked(temp.path().join("missing")));
        assert!(!EnvironmentConfig::locked(temp.path()));

        fs::create_dir_all(config_dir(temp.path())).unwrap();
        assert!(!EnvironmentConfig::locked(temp.path()));

        fs::write(config_dir(temp.path()).join(LOCK_FILE), "").unwrap();
        assert!(EnvironmentConfig::locked(temp.path()));

        fs::write(config_dir(temp.path()).join(LOCK_FILE), "lock content").unwrap();
        assert!(EnvironmentConfig::locked(temp.path()));
    }

    #[test]
    fn save_under_regular_file_is_io_error() {
        let file = tempfile::NamedTempFile::new().unwrap();

        let err = EnvironmentConfig::default().save(file.path()).unwrap_err();
        assert!(matches!(err, EnvironmentError::Io { .. }), "{err}");

        let err = EnvironmentConfig::lock(file.path()).unwrap_err();
        assert!(matches!(err, EnvironmentError::Io { .. }), "{err}");
        assert!(!EnvironmentConfig::locked(file.path()));
    }

    #[test]
    fn save_fails_when_target_is_a_directory() {
        let temp = TempDir::new().unwrap();
        fs::create_dir_all(config_dir(temp.path()).join(ENVIRONMENT_FILE)).unwrap();

        let err = EnvironmentConfig::default().save(temp.path()).unwrap_err();
        assert!(matches!(err, EnvironmentError::Io { ref path, .. } if path.ends_with(ENVIRONMENT_FILE)), "{err}");
    }

    #[test]
    fn lock_and_unlock_toggle_marker() {
        let temp = TempDir::new().unwrap();

        EnvironmentConfig::lock(temp.path()).unwrap();
        assert!(EnvironmentConfig::locked(temp.path()));

        EnvironmentConfig::unlock(temp.path()).unwrap();
        assert!(!EnvironmentConfig::locked(temp.path()));
        EnvironmentConfig::unlock(temp.path()).unwrap();
    }
}
