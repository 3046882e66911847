use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::duration::{deserialize_duration, deserialize_optional_duration};

/// Default bound on the number of pages visited in one attempt.
pub const DEFAULT_MAX_STEPS: usize = 10;

/// Default step after which being on the target domain counts as success.
pub const DEFAULT_BENEFIT_OF_DOUBT_AFTER: usize = 7;

fn default_max_steps() -> usize {
    DEFAULT_MAX_STEPS
}

fn default_benefit_of_doubt_after() -> usize {
    DEFAULT_BENEFIT_OF_DOUBT_AFTER
}

fn default_request_timeout() -> Duration {
    Duration::from_secs(30)
}

fn default_user_agent() -> String {
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0 Safari/537.36"
        .to_string()
}

fn default_login_path_markers() -> Vec<String> {
    ["login", "auth", "saml", "sso", "idp", "broker"]
        .into_iter()
        .map(String::from)
        .collect()
}

fn default_landing_paths() -> Vec<String> {
    vec!["/".to_string()]
}

fn default_account_markers() -> Vec<String> {
    ["profileId", "childId", "institutionProfile"]
        .into_iter()
        .map(String::from)
        .collect()
}

fn default_continue_link_texts() -> Vec<String> {
    ["continue to login", "fortsæt til login", "continue"]
        .into_iter()
        .map(String::from)
        .collect()
}

fn default_id_pattern() -> String {
    r#"["']?(?:profileId|childId)["']?\s*[:=]\s*["']?(\d+)"#.to_string()
}

fn default_id_keys() -> Vec<String> {
    ["profileId", "childId", "id"]
        .into_iter()
        .map(String::from)
        .collect()
}

/// Where and how to look for the account identifier after login.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AccountIdConfig {
    /// Page whose inline script state embeds the identifier.
    pub landing_url: Option<String>,

    /// Regex with one capture group for the identifier.
    pub id_pattern: String,

    /// Optional regex with one capture group for a display name.
    ///
    /// Only logged for confirmation; never drives control flow.
    pub name_pattern: Option<String>,

    /// JSON endpoint queried when the landing page yields nothing.
    pub api_url: Option<String>,

    /// Keys tried in order in the JSON response.
    pub id_keys: Vec<String>,
}

impl Default for AccountIdConfig {
    fn default() -> Self {
        Self {
            landing_url: None,
            id_pattern: default_id_pattern(),
            name_pattern: None,
            api_url: None,
            id_keys: default_id_keys(),
        }
    }
}

/// Login engine configuration.
///
/// Typically loaded from a `portal-login.toml` file:
///
/// ```toml
/// login_url = "https://portal.example/auth/login"
/// target_domain = "portal.example"
/// success_fragment = "portal.example/portal"
/// probe_endpoints = ["/api/session", "/api/profile"]
/// request_timeout = "20s"
///
/// [account]
/// landing_url = "/portal/"
/// api_url = "/api/profile"
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    /// First page fetched by every attempt.
    pub login_url: String,

    /// Host fragment identifying the portal (as opposed to identity providers).
    pub target_domain: String,

    /// URL fragment only reachable once logged in. Matched scheme-agnostically.
    pub success_fragment: String,

    /// Upper bound on pages visited per attempt.
    #[serde(default = "default_max_steps")]
    pub max_steps: usize,

    /// Step after which staying on the target domain is taken as success.
    #[serde(default = "default_benefit_of_doubt_after")]
    pub benefit_of_doubt_after: usize,

    /// Endpoints that only answer with JSON once authenticated.
    /// Relative entries are resolved against `login_url`.
    pub probe_endpoints: Vec<String>,

    /// Path fragments that mark a URL as part of the login flow.
    #[serde(default = "default_login_path_markers")]
    pub login_path_markers: Vec<String>,

    /// Exact paths on the target domain that are shown before login.
    #[serde(default = "default_landing_paths")]
    pub landing_paths: Vec<String>,

    /// Page content markers that only appear in an account context.
    #[serde(default = "default_account_markers")]
    pub account_markers: Vec<String>,

    /// Anchor texts accepted as "continue to identity provider" links.
    #[serde(default = "default_continue_link_texts")]
    pub continue_link_texts: Vec<String>,

    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// Per-request timeout.
    #[serde(
        default = "default_request_timeout",
        deserialize_with = "deserialize_duration"
    )]
    pub request_timeout: Duration,

    /// Optional bound on a whole attempt. Expiry cancels the attempt.
    #[serde(default, deserialize_with = "deserialize_optional_duration")]
    pub attempt_timeout: Option<Duration>,

    #[serde(default)]
    pub account: AccountIdConfig,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            login_url: String::new(),
            target_domain: String::new(),
            success_fragment: String::new(),
            max_steps: default_max_steps(),
            benefit_of_doubt_after: default_benefit_of_doubt_after(),
            probe_endpoints: Vec::new(),
            login_path_markers: default_login_path_markers(),
            landing_paths: default_landing_paths(),
            account_markers: default_account_markers(),
            continue_link_texts: default_continue_link_texts(),
            user_agent: default_user_agent(),
            request_timeout: default_request_timeout(),
            attempt_timeout: None,
            account: AccountIdConfig::default(),
        }
    }
}

/// Errors found while validating an [`AuthConfig`].
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{field} is required")]
    Missing { field: &'static str },

    #[error("{field} is not a valid URL: {value:?}")]
    InvalidUrl {
        field: &'static str,
        value: String,
        #[source]
        source: url::ParseError,
    },

    #[error("{field} must be an http(s) URL: {value:?}")]
    UnsupportedScheme { field: &'static str, value: String },

    #[error("{field} is not a valid regex")]
    InvalidPattern {
        field: &'static str,
        #[source]
        source: regex::Error,
    },

    #[error("{field} must have a capture group")]
    MissingCaptureGroup { field: &'static str },

    #[error("max_steps must be at least 1")]
    ZeroMaxSteps,
}

impl AuthConfig {
    /// Create a config with the three required settings and defaults for the rest.
    pub fn new(
        login_url: impl Into<String>,
        target_domain: impl Into<String>,
        success_fragment: impl Into<String>,
    ) -> Self {
        Self {
            login_url: login_url.into(),
            target_domain: target_domain.into(),
            success_fragment: success_fragment.into(),
            ..Default::default()
        }
    }

    /// Load config from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: AuthConfig = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(config)
    }

    /// Load config from a file, or return default config if file doesn't exist.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    /// Validate the config, parsing URLs and compiling patterns.
    pub fn resolve(&self) -> std::result::Result<ResolvedAuthConfig, ConfigError> {
        if self.login_url.trim().is_empty() {
            return Err(ConfigError::Missing { field: "login_url" });
        }
        if self.target_domain.trim().is_empty() {
            return Err(ConfigError::Missing {
                field: "target_domain",
            });
        }
        if self.success_fragment.trim().is_empty() {
            return Err(ConfigError::Missing {
                field: "success_fragment",
            });
        }
        if self.max_steps == 0 {
            return Err(ConfigError::ZeroMaxSteps);
        }

        let login_url = parse_http_url("login_url", &self.login_url)?;
        let probe_endpoints = self
            .probe_endpoints
            .iter()
            .map(|endpoint| join_http_url(&login_url, "probe_endpoints", endpoint))
            .collect::<std::result::Result<Vec<_>, _>>()?;

        let account = &self.account;
        let landing_url = account
            .landing_url
            .as_deref()
            .map(|value| join_http_url(&login_url, "account.landing_url", value))
            .transpose()?;
        let api_url = account
            .api_url
            .as_deref()
            .map(|value| join_http_url(&login_url, "account.api_url", value))
            .transpose()?;
        let id_pattern = compile_capturing("account.id_pattern", &account.id_pattern)?;
        let name_pattern = account
            .name_pattern
            .as_deref()
            .map(|pattern| compile_capturing("account.name_pattern", pattern))
            .transpose()?;

        Ok(ResolvedAuthConfig {
            login_url,
            target_domain: self.target_domain.trim().to_lowercase(),
            success_fragment: strip_scheme(self.success_fragment.trim()).to_lowercase(),
            max_steps: self.max_steps,
            benefit_of_doubt_after: self.benefit_of_doubt_after,
            probe_endpoints,
            login_path_markers: lowercase_all(&self.login_path_markers),
            landing_paths: self.landing_paths.clone(),
            account_markers: self.account_markers.clone(),
            continue_link_texts: lowercase_all(&self.continue_link_texts),
            user_agent: self.user_agent.clone(),
            request_timeout: self.request_timeout,
            attempt_timeout: self.attempt_timeout,
            account: ResolvedAccountIdConfig {
                landing_url,
                id_pattern,
                name_pattern,
                api_url,
                id_keys: account.id_keys.clone(),
            },
        })
    }
}

/// Validated account-identifier settings.
#[derive(Debug, Clone)]
pub struct ResolvedAccountIdConfig {
    pub landing_url: Option<Url>,
    pub id_pattern: Regex,
    pub name_pattern: Option<Regex>,
    pub api_url: Option<Url>,
    pub id_keys: Vec<String>,
}

/// Validated configuration consumed by the login engine.
#[derive(Debug, Clone)]
pub struct ResolvedAuthConfig {
    pub login_url: Url,
    /// Lowercased host fragment.
    pub target_domain: String,
    /// Lowercased, scheme stripped.
    pub success_fragment: String,
    pub max_steps: usize,
    pub benefit_of_doubt_after: usize,
    pub probe_endpoints: Vec<Url>,
    /// Lowercased.
    pub login_path_markers: Vec<String>,
    pub landing_paths: Vec<String>,
    pub account_markers: Vec<String>,
    /// Lowercased.
    pub continue_link_texts: Vec<String>,
    pub user_agent: String,
    pub request_timeout: Duration,
    pub attempt_timeout: Option<Duration>,
    pub account: ResolvedAccountIdConfig,
}

/// Returns the default config file path.
///
/// Resolution order:
/// 1. `./portal-login.toml` if it exists in current directory
/// 2. `~/.config/portal-login/portal-login.toml`
pub fn default_config_path() -> PathBuf {
    let local_config = PathBuf::from("portal-login.toml");
    if local_config.exists() {
        return local_config;
    }

    if let Some(config_dir) = dirs::config_dir() {
        return config_dir.join("portal-login").join("portal-login.toml");
    }

    local_config
}

/// Remove a leading `http://` or `https://`.
pub(crate) fn strip_scheme(value: &str) -> &str {
    let has_prefix = |prefix: &str| {
        value
            .get(..prefix.len())
            .is_some_and(|head| head.eq_ignore_ascii_case(prefix))
    };
    if has_prefix("https://") {
        &value[8..]
    } else if has_prefix("http://") {
        &value[7..]
    } else {
        value
    }
}

fn lowercase_all(values: &[String]) -> Vec<String> {
    values.iter().map(|v| v.trim().to_lowercase()).collect()
}

fn parse_http_url(field: &'static str, value: &str) -> std::result::Result<Url, ConfigError> {
    let url = Url::parse(value.trim()).map_err(|source| ConfigError::InvalidUrl {
        field,
        value: value.to_string(),
        source,
    })?;
    ensure_http(field, url)
}

fn join_http_url(
    base: &Url,
    field: &'static str,
    value: &str,
) -> std::result::Result<Url, ConfigError> {
    let url = base
        .join(value.trim())
        .map_err(|source| ConfigError::InvalidUrl {
            field,
            value: value.to_string(),
            source,
        })?;
    ensure_http(field, url)
}

fn ensure_http(field: &'static str, url: Url) -> std::result::Result<Url, ConfigError> {
    match url.scheme() {
        "http" | "https" => Ok(url),
        _ => Err(ConfigError::UnsupportedScheme {
            field,
            value: url.to_string(),
        }),
    }
}

fn compile_capturing(field: &'static str, pattern: &str) -> std::result::Result<Regex, ConfigError> {
    let regex = Regex::new(pattern).map_err(|source| ConfigError::InvalidPattern { field, source })?;
    if regex.captures_len() < 2 {
        return Err(ConfigError::MissingCaptureGroup { field });
    }
    Ok(regex)
}
