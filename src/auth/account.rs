//! Resolving the account identifier once logged in.
//!
//! Two independent strategies, tried in order: a regex over the inline
//! script state of a landing page, then a JSON endpoint.

use regex::Regex;
use serde_json::Value;
use url::Url;

use super::error::AuthError;
use super::transport::Transport;
use crate::config::ResolvedAccountIdConfig;

#[derive(Debug, Clone)]
pub struct AccountIdResolver {
    landing_url: Option<Url>,
    id_pattern: Regex,
    name_pattern: Option<Regex>,
    api_url: Option<Url>,
    id_keys: Vec<String>,
}

impl AccountIdResolver {
    pub fn new(config: &ResolvedAccountIdConfig) -> Self {
        Self {
            landing_url: config.landing_url.clone(),
            id_pattern: config.id_pattern.clone(),
            name_pattern: config.name_pattern.clone(),
            api_url: config.api_url.clone(),
            id_keys: config.id_keys.clone(),
        }
    }

    /// First capture of the id pattern in `html`.
    pub fn id_from_script(&self, html: &str) -> Option<String> {
        first_capture(&self.id_pattern, html)
    }

    /// First capture of the display-name pattern, if one is configured.
    pub fn name_from_script(&self, html: &str) -> Option<String> {
        self.name_pattern
            .as_ref()
            .and_then(|pattern| first_capture(pattern, html))
    }

    /// First configured key with a non-empty value, top level before `data`.
    pub fn id_from_json(&self, body: &str) -> Option<String> {
        let value: Value = serde_json::from_str(body.trim()).ok()?;
        let top = value.as_object()?;
        let nested = top.get("data").and_then(Value::as_object);

        std::iter::once(top)
            .chain(nested)
            .find_map(|object| {
                self.id_keys
                    .iter()
                    .find_map(|key| object.get(key).and_then(identifier_value))
            })
    }

    /// Try the landing page, then the JSON endpoint.
    ///
    /// Errors only with [`AuthError::IdentifierNotFound`]; fetch failures
    /// are logged and treated as "not found here".
    pub async fn resolve<T>(&self, transport: &T) -> Result<String, AuthError>
    where
        T: Transport + ?Sized,
    {
        let id = match self.from_landing_page(transport).await {
            Some(id) => Some(id),
            None => self.from_api(transport).await,
        };
        id.ok_or(AuthError::IdentifierNotFound)
    }

    async fn from_landing_page<T>(&self, transport: &T) -> Option<String>
    where
        T: Transport + ?Sized,
    {
        let url = self.landing_url.as_ref()?;
        let page = match transport.get(url).await {
            Ok(page) => page,
            Err(err) => {
                tracing::warn!(url = %url, error = %err, "Failed to fetch account landing page");
                return None;
            }
        };

        let id = self.id_from_script(&page.body)?;
        if let Some(name) = self.name_from_script(&page.body) {
            tracing::debug!(account_id = %id, display_name = %name, "Account identifier found in page");
        } else {
            tracing::debug!(account_id = %id, "Account identifier found in page");
        }
        Some(id)
    }

    async fn from_api<T>(&self, transport: &T) -> Option<String>
    where
        T: Transport + ?Sized,
    {
        let url = self.api_url.as_ref()?;
        let page = match transport.get(url).await {
            Ok(page) => page,
            Err(err) => {
                tracing::warn!(url = %url, error = %err, "Failed to fetch account API");
                return None;
            }
        };
        if !page.is_success() {
            tracing::debug!(url = %url, status = page.status, "Account API refused");
            return None;
        }

        let id = self.id_from_json(&page.body)?;
        tracing::debug!(account_id = %id, "Account identifier found via API");
        Some(id)
    }
}

fn first_capture(pattern: &Regex, text: &str) -> Option<String> {
    pattern
        .captures(text)
        .and_then(|captures| captures.get(1))
        .map(|m| m.as_str().trim().to_string())
        .filter(|value| !value.is_empty())
}

fn identifier_value(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}
