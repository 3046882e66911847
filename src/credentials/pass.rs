//! Password-store (pass) credential backend.
//!
//! The first line of an entry is the password. Further lines in the form
//! `field-name: value` are named fields.

use std::collections::HashMap;

use anyhow::{Context, Result};
use async_trait::async_trait;
use secrecy::SecretString;
use tokio::process::Command;

use super::CredentialStore;

/// Key under which the first line of an entry is exposed.
pub const PASSWORD_KEY: &str = "password";

/// Credential store backed by a single pass entry.
pub struct PassCredentialStore {
    path: String,
}

impl PassCredentialStore {
    /// Create a store for the pass entry at `path` (e.g. "portal/alice").
    pub fn from_path(path: impl Into<String>) -> Self {
        Self { path: path.into() }
    }

    async fn read_entry(&self) -> Result<PassEntry> {
        let output = Command::new("pass")
            .arg("show")
            .arg(&self.path)
            .output()
            .await
            .context("Failed to run pass command")?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            anyhow::bail!("pass show {} failed: {}", self.path, stderr.trim());
        }

        let content = String::from_utf8(output.stdout).context("Invalid UTF-8 in pass output")?;

        Ok(PassEntry::parse(&content))
    }
}

#[async_trait]
impl CredentialStore for PassCredentialStore {
    async fn get(&self, key: &str) -> Result<Option<SecretString>> {
        let mut entry = self.read_entry().await?;
        Ok(entry.fields.remove(key).map(SecretString::from))
    }
}

/// Parsed pass entry. Values are dropped as soon as the wanted one is taken.
#[derive(Default)]
struct PassEntry {
    fields: HashMap<String, String>,
}

impl PassEntry {
    fn parse(content: &str) -> Self {
        let mut lines = content.lines();
        let mut fields = HashMap::new();

        if let Some(password) = lines.next() {
            fields.insert(PASSWORD_KEY.to_string(), password.to_string());
        }

        for line in lines {
            if let Some((key, value)) = line.split_once(": ") {
                // A named field never shadows the first line.
                if key != PASSWORD_KEY {
                    fields.insert(key.trim().to_string(), value.to_string());
                }
            }
        }

        Self { fields }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_entry() {
        let content = "s3cret\nusername: alice\nurl: https://portal.example\nnot a field";

        let entry = PassEntry::parse(content);

        assert_eq!(entry.fields.get("password"), Some(&"s3cret".to_string()));
        assert_eq!(entry.fields.get("username"), Some(&"alice".to_string()));
        assert_eq!(
            entry.fields.get("url"),
            Some(&"https://portal.example".to_string())
        );
        assert_eq!(entry.fields.len(), 3);
    }

    #[test]
    fn test_named_password_field_does_not_shadow_first_line() {
        let entry = PassEntry::parse("first-line\npassword: other");
        assert_eq!(entry.fields.get("password"), Some(&"first-line".to_string()));
    }

    #[test]
    fn test_parse_empty_entry() {
        let entry = PassEntry::parse("");
        assert!(entry.fields.is_empty());
    }
}
