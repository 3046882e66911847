//! Login credentials and the backends they are read from.
//!
//! A [`Credential`] is what the login engine consumes. Accounts are described
//! in an `accounts.toml` file that says which kind of secret each account
//! uses and where a typed password is stored:
//!
//! ```toml
//! [accounts.alice]
//! kind = "password"
//! username = "alice"
//! secret = { backend = "pass", path = "portal/alice" }
//!
//! [accounts.bob]
//! kind = "pictures"
//! username = "bob"
//! pictures = ["sun", "car", "tree", "house"]
//! ```

mod config;
mod env;
mod pass;

pub use config::{AccountsFile, CredentialConfig, SecretSource};
pub use env::EnvCredentialStore;
pub use pass::PassCredentialStore;

use std::fmt;

use anyhow::Result;
use async_trait::async_trait;
use secrecy::SecretString;

/// A read-only key-value store for secrets.
///
/// The account configuration decides which key to ask for; the backend maps
/// it to its own storage location.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// Retrieve a secret by key.
    ///
    /// Returns `Ok(None)` if the key doesn't exist.
    /// Returns `Err` if there was an error accessing the backend.
    async fn get(&self, key: &str) -> Result<Option<SecretString>>;
}

/// The secret an account logs in with.
///
/// `Debug` never prints the secret or the picture labels.
pub enum Credential {
    /// A typed password.
    FixedSecret {
        username: String,
        secret: SecretString,
    },
    /// An ordered sequence of picture labels, mapped to per-session codes
    /// at login time.
    PictureSequence {
        username: String,
        labels: Vec<String>,
    },
}

impl Credential {
    pub fn fixed_secret(username: impl Into<String>, secret: impl Into<String>) -> Self {
        Self::FixedSecret {
            username: username.into(),
            secret: SecretString::from(secret.into()),
        }
    }

    pub fn picture_sequence<I, S>(username: impl Into<String>, labels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::PictureSequence {
            username: username.into(),
            labels: labels.into_iter().map(Into::into).collect(),
        }
    }

    pub fn username(&self) -> &str {
        match self {
            Self::FixedSecret { username, .. } | Self::PictureSequence { username, .. } => {
                username
            }
        }
    }

    /// Short name of the credential kind, safe to log.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::FixedSecret { .. } => "fixed_secret",
            Self::PictureSequence { .. } => "picture_sequence",
        }
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::FixedSecret { .. } => f
                .debug_struct("FixedSecret")
                .field("username", &"[redacted]")
                .field("secret", &"[redacted]")
                .finish(),
            Self::PictureSequence { labels, .. } => f
                .debug_struct("PictureSequence")
                .field("username", &"[redacted]")
                .field("labels", &format_args!("[{} redacted]", labels.len()))
                .finish(),
        }
    }
}
