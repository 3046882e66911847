//! Environment-variable credential backend.

use anyhow::{Context, Result};
use async_trait::async_trait;
use secrecy::SecretString;

use super::CredentialStore;

/// Reads secrets from environment variables; the key is the variable name.
///
/// An unset variable is `Ok(None)`. A variable that is not valid UTF-8 is
/// an error.
#[derive(Debug, Clone, Default)]
pub struct EnvCredentialStore {
    prefix: Option<String>,
}

impl EnvCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Prepend `prefix` to every key before lookup.
    pub fn with_prefix(prefix: impl Into<String>) -> Self {
        Self {
            prefix: Some(prefix.into()),
        }
    }

    fn var_name(&self, key: &str) -> String {
        match &self.prefix {
            Some(prefix) => format!("{prefix}{key}"),
            None => key.to_string(),
        }
    }
}

#[async_trait]
impl CredentialStore for EnvCredentialStore {
    async fn get(&self, key: &str) -> Result<Option<SecretString>> {
        let name = self.var_name(key);
        match std::env::var(&name) {
            Ok(value) => Ok(Some(SecretString::from(value))),
            Err(std::env::VarError::NotPresent) => Ok(None),
            Err(err) => Err(err).with_context(|| format!("Failed to read environment variable {name}")),
        }
    }
}
