use std::path::PathBuf;

pub type Result<T> = std::result::Result<T, EnvironmentError>;

#[derive(Debug, thiserror::Error)]
pub enum EnvironmentError {
    #[error("{path} not found: {source}")]
    NotFound {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed environment data at {path}: {source}")]
    MalformedData {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid env variable: {0}")]
    InvalidEnv(String),

    #[error("invalid secret: {0}")]
    InvalidSecret(String),

    #[error("invalid environment variable: {0}")]
    InvalidEnvironmentVariable(String),

    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("environment {0} is already registered")]
    AlreadyRegistered(String),

    #[error("invalid environment identifier: {0:?}")]
    InvalidIdentifier(String),
}

impl EnvironmentError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Like [`EnvironmentError::io`], but a missing file is reported as `NotFound`.
    pub fn read(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        let path = path.into();
        if source.kind() == std::io::ErrorKind::NotFound {
            Self::NotFound { path, source }
        } else {
            Self::Io { path, source }
        }
    }
}
