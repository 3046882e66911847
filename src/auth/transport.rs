//! HTTP transport used by a login attempt.

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, ACCEPT_LANGUAGE};
use reqwest::redirect::Policy;
use reqwest::Client;
use url::Url;

use super::error::TransportError;
use super::page::Page;
use crate::config::ResolvedAuthConfig;

/// Redirects followed per request before giving up.
const MAX_REDIRECTS: usize = 10;

/// GET/POST with redirect following and a cookie jar private to one attempt.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn get(&self, url: &Url) -> Result<Page, TransportError>;

    /// POST `fields` as `application/x-www-form-urlencoded`.
    async fn post_form(&self, url: &Url, fields: &[(String, String)])
        -> Result<Page, TransportError>;
}

/// [`Transport`] over a `reqwest` client with its own cookie store.
///
/// Build one per attempt; dropping it discards the session.
#[derive(Debug)]
pub struct HttpTransport {
    client: Client,
}

impl HttpTransport {
    /// Create a transport with a fresh cookie jar.
    pub fn new(config: &ResolvedAuthConfig) -> Result<Self, TransportError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            ACCEPT,
            HeaderValue::from_static(
                "text/html,application/xhtml+xml,application/json;q=0.9,*/*;q=0.8",
            ),
        );
        headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static("da,en;q=0.8"));

        let client = Client::builder()
            .user_agent(config.user_agent.as_str())
            .default_headers(headers)
            .cookie_store(true)
            .redirect(Policy::limited(MAX_REDIRECTS))
            .timeout(config.request_timeout)
            .build()?;

        Ok(Self { client })
    }

    async fn into_page(response: reqwest::Response) -> Result<Page, TransportError> {
        let url = response.url().clone();
        let status = response.status().as_u16();
        let body = response.text().await?;
        Ok(Page::new(url, status, body))
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn get(&self, url: &Url) -> Result<Page, TransportError> {
        tracing::debug!(url = %url, "GET");
        let response = self.client.get(url.clone()).send().await?;
        Self::into_page(response).await
    }

    async fn post_form(
        &self,
        url: &Url,
        fields: &[(String, String)],
    ) -> Result<Page, TransportError> {
        tracing::debug!(url = %url, field_count = fields.len(), "POST form");
        let response = self.client.post(url.clone()).form(fields).send().await?;
        Self::into_page(response).await
    }
}
