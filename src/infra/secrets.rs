use std::fs;

use anyhow::{anyhow, Context, Error};

use crate::domain::port::SecretStore;

/// Resolves `env://NAME` from the host environment and `file://PATH` from disk.
#[derive(Debug, Default)]
pub struct HostSecretStore;

impl SecretStore for HostSecretStore {
    fn resolve(&self, reference: &str) -> Result<String, Error> {
        let (scheme, target) = reference
            .split_once("://")
            .ok_or(anyhow!("Secret reference {} has no scheme", reference))?;
        match scheme {
            "env" => std::env::var(target)
                .with_context(|| format!("Can't read secret from host variable {}", target)),
            "file" => fs::read_to_string(target)
                .map(|value| value.trim_end_matches(['\n', '\r']).to_string())
                .with_context(|| format!("Can't read secret from file {}", target)),
            _ => Err(anyhow!("Unsupported secret scheme {}", scheme)),
        }
    }
}
