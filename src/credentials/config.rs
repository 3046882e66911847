//! Account credential configuration.
//!
//! Defines the format of the `accounts.toml` file mapping account names to
//! the kind of secret they log in with.

use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use super::pass::PASSWORD_KEY;
use super::{Credential, CredentialStore, EnvCredentialStore, PassCredentialStore};

/// Where a typed password is stored.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "backend", rename_all = "lowercase")]
pub enum SecretSource {
    /// Password-store entry. `field` defaults to the entry's first line.
    Pass {
        path: String,
        #[serde(default)]
        field: Option<String>,
    },
    /// Environment variable.
    Env { var: String },
}

impl SecretSource {
    /// Build the store and the key to ask it for.
    pub fn build(&self) -> (Box<dyn CredentialStore>, String) {
        match self {
            SecretSource::Pass { path, field } => (
                Box::new(PassCredentialStore::from_path(path.clone())),
                field.clone().unwrap_or_else(|| PASSWORD_KEY.to_string()),
            ),
            SecretSource::Env { var } => (Box::new(EnvCredentialStore::new()), var.clone()),
        }
    }
}

/// How one account logs in.
///
/// `Debug` redacts the username and the picture sequence.
#[derive(Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum CredentialConfig {
    /// Username and typed password.
    Password {
        username: String,
        secret: SecretSource,
    },
    /// Username and an ordered picture sequence.
    Pictures {
        username: String,
        pictures: Vec<String>,
    },
}

impl fmt::Debug for CredentialConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CredentialConfig::Password { secret, .. } => f
                .debug_struct("Password")
                .field("username", &"[redacted]")
                .field("secret", secret)
                .finish(),
            CredentialConfig::Pictures { pictures, .. } => f
                .debug_struct("Pictures")
                .field("username", &"[redacted]")
                .field("pictures", &format_args!("[{} redacted]", pictures.len()))
                .finish(),
        }
    }
}

impl CredentialConfig {
    /// Produce the credential, reading the password from its backend if needed.
    pub async fn resolve(&self) -> Result<Credential> {
        match self {
            CredentialConfig::Password { username, secret } => {
                let (store, key) = secret.build();
                let value = store
                    .get(&key)
                    .await?
                    .with_context(|| format!("Secret {key:?} not found for user {username}"))?;
                Ok(Credential::FixedSecret {
                    username: username.clone(),
                    secret: value,
                })
            }
            CredentialConfig::Pictures { username, pictures } => {
                if pictures.is_empty() {
                    anyhow::bail!("Picture sequence for user {username} is empty");
                }
                Ok(Credential::picture_sequence(username.clone(), pictures.clone()))
            }
        }
    }
}

/// The `accounts.toml` file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AccountsFile {
    #[serde(default)]
    pub accounts: BTreeMap<String, CredentialConfig>,
}

impl AccountsFile {
    /// Load the accounts file from TOML.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read accounts file: {}", path.display()))?;

        toml::from_str(&content)
            .with_context(|| format!("Failed to parse accounts file: {}", path.display()))
    }

    pub fn get(&self, name: &str) -> Result<&CredentialConfig> {
        self.accounts
            .get(name)
            .with_context(|| format!("Account not found: {name}"))
    }
}
