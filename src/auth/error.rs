use std::fmt;

use crate::config::ConfigError;

/// Which check the driver ran last before an attempt ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LastCheck {
    Start,
    InitialFetch,
    Probe,
    PageHeuristics,
    FormSubmit,
    ContinueLink,
    AccountId,
}

impl LastCheck {
    pub fn as_str(&self) -> &'static str {
        match self {
            LastCheck::Start => "start",
            LastCheck::InitialFetch => "initial_fetch",
            LastCheck::Probe => "probe",
            LastCheck::PageHeuristics => "page_heuristics",
            LastCheck::FormSubmit => "form_submit",
            LastCheck::ContinueLink => "continue_link",
            LastCheck::AccountId => "account_id",
        }
    }
}

impl fmt::Display for LastCheck {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where an attempt was when it ended. Never contains credential values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttemptContext {
    pub last_url: String,
    pub step: usize,
    pub last_check: LastCheck,
}

impl fmt::Display for AttemptContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "last_url={}, step={}, last_check={}",
            self.last_url, self.step, self.last_check
        )
    }
}

/// Transport-level failure.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("{0}")]
    Other(String),
}

/// Why a login attempt failed.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    /// No submittable form and no continue link on a page that needed one.
    #[error("no login form or continue link found ({context})")]
    FormNotFound {
        context: AttemptContext,
        page_title: Option<String>,
        page_errors: Vec<String>,
    },

    #[error("login form has no submission target ({context})")]
    ActionMissing { context: AttemptContext },

    /// Configured picture labels absent from the page's mapping.
    ///
    /// Holds positions in the configured sequence, not the labels themselves.
    #[error("picture sequence could not be derived, label positions {missing_positions:?} missing from the page ({context})")]
    MappingIncomplete {
        missing_positions: Vec<usize>,
        context: AttemptContext,
    },

    /// A picture page whose submitted form has nowhere to put the secret.
    #[error("picture login form has no field for the secret ({context})")]
    CarrierMissing { context: AttemptContext },

    #[error("login did not complete within {max_steps} steps ({context})")]
    StepsExhausted {
        max_steps: usize,
        context: AttemptContext,
    },

    #[error("login cancelled ({context})")]
    Cancelled { context: AttemptContext },

    #[error("network error ({context})")]
    Network {
        #[source]
        source: TransportError,
        context: AttemptContext,
    },

    /// Authenticated, but the account identifier is unknown.
    #[error("authenticated but no account identifier could be resolved")]
    IdentifierNotFound,

    #[error("invalid configuration")]
    Config(#[from] ConfigError),
}

impl AuthError {
    pub fn context(&self) -> Option<&AttemptContext> {
        match self {
            AuthError::FormNotFound { context, .. }
            | AuthError::ActionMissing { context }
            | AuthError::MappingIncomplete { context, .. }
            | AuthError::CarrierMissing { context }
            | AuthError::StepsExhausted { context, .. }
            | AuthError::Cancelled { context }
            | AuthError::Network { context, .. } => Some(context),
            AuthError::IdentifierNotFound | AuthError::Config(_) => None,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, AuthError::Cancelled { .. })
    }

    /// True when the session is not authenticated.
    ///
    /// `IdentifierNotFound` is the one outcome where login itself succeeded.
    pub fn is_authentication_failure(&self) -> bool {
        !matches!(self, AuthError::IdentifierNotFound)
    }
}
