#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use portal_login::auth::{Page, Transport, TransportError};
use portal_login::config::AuthConfig;
use url::Url;
use wiremock::matchers::{body_string_contains, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

pub const SESSION_COOKIE: &str = "portal_session=ok";

/// `host:port` of the mock server, used as the portal's target domain.
pub fn authority(server: &MockServer) -> String {
    server.uri().trim_start_matches("http://").to_string()
}

/// Config for a portal served entirely by `server`.
pub fn config_for(server: &MockServer) -> AuthConfig {
    let authority = authority(server);
    let mut config = AuthConfig::new(
        format!("{}/login/start", server.uri()),
        authority.clone(),
        format!("{authority}/portal"),
    );
    config.probe_endpoints = vec!["/api/profile".to_string()];
    config.account.landing_url = Some("/portal/overview".to_string());
    config.account.api_url = Some("/api/profile".to_string());
    config.request_timeout = Duration::from_secs(5);
    config
}

pub fn html(body: impl AsRef<str>) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_raw(body.as_ref().to_string(), "text/html; charset=utf-8")
}

pub fn redirect(location: &str) -> ResponseTemplate {
    ResponseTemplate::new(303).insert_header("location", location)
}

/// Redirect into the portal, setting the session cookie on the way.
pub fn login_complete() -> ResponseTemplate {
    redirect("/portal/overview").insert_header("set-cookie", "portal_session=ok; Path=/")
}

pub const PROVIDER_SELECT: &str = r#"<html><head><title>Portal</title></head><body>
  <h1>Choose how to log in</h1>
  <form action="/login/select" method="post">
    <input type="hidden" name="idp" value="unilogin">
    <button type="submit">Log in with UniLogin</button>
  </form>
</body></html>"#;

pub const IDENTITY_PAGE: &str = r#"<html><head><title>UniLogin</title></head><body>
  <form action="/idp/identity" method="post">
    <input type="hidden" name="state" value="abc123">
    <label>Username <input type="text" name="username"></label>
    <button type="submit">Next</button>
  </form>
</body></html>"#;

pub fn password_page(username: &str) -> String {
    format!(
        r#"<html><head><title>UniLogin</title></head><body>
  <form action="/idp/password" method="post">
    <input type="hidden" name="state" value="abc123">
    <input type="hidden" name="username" value="{username}">
    <label>Password <input type="password" name="password"></label>
    <button type="submit">Log in</button>
  </form>
</body></html>"#
    )
}

pub fn picture_page(username: &str, pictures: &[(&str, &str)]) -> String {
    let grid: String = pictures
        .iter()
        .map(|(label, code)| {
            format!(
                r#"<button type="button" class="picture" data-passparam-value="{code}"><img src="/img/{label}.png" alt="{label}"></button>"#
            )
        })
        .collect();
    format!(
        r#"<html><head><title>UniLogin</title></head><body>
  <form action="/idp/pictures" method="post">
    <input type="hidden" name="state" value="abc123">
    <input type="hidden" name="username" value="{username}">
    <input type="hidden" name="password" value="">
    <div class="picture-slots"><span></span><span></span><span></span><span></span></div>
    <div class="picture-grid">{grid}</div>
  </form>
</body></html>"#
    )
}

pub fn landing_page(account_id: Option<&str>) -> String {
    let state = match account_id {
        Some(id) => format!(r#"{{"profileId": {id}, "displayName": "Test User"}}"#),
        None => "{}".to_string(),
    };
    format!(
        r#"<html><head><title>Overview</title></head><body>
  <div id="app"></div>
  <script>window.__STATE__ = {state};</script>
</body></html>"#
    )
}

/// Provider selection, then the identity page, answered by `after_identity`.
pub async fn mount_entry(server: &MockServer, after_identity: String) {
    Mock::given(method("GET"))
        .and(path("/login/start"))
        .respond_with(html(PROVIDER_SELECT))
        .mount(server)
        .await;
    Mock::given(method("POST"))
        .and(path("/login/select"))
        .and(body_string_contains("idp=unilogin"))
        .respond_with(redirect("/idp/identity"))
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path("/idp/identity"))
        .respond_with(html(IDENTITY_PAGE))
        .mount(server)
        .await;
    Mock::given(method("POST"))
        .and(path("/idp/identity"))
        .respond_with(html(after_identity))
        .mount(server)
        .await;
}

/// The logged-in portal: landing page and the session-gated profile API.
pub async fn mount_portal(server: &MockServer, account_id: Option<&str>) {
    Mock::given(method("GET"))
        .and(path("/portal/overview"))
        .respond_with(html(landing_page(account_id)))
        .mount(server)
        .await;

    let profile = match account_id {
        Some(id) => serde_json::json!({ "status": "ok", "data": { "profileId": id } }),
        None => serde_json::json!({ "status": "ok" }),
    };
    Mock::given(method("GET"))
        .and(path("/api/profile"))
        .and(header("cookie", SESSION_COOKIE))
        .respond_with(ResponseTemplate::new(200).set_body_json(profile))
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/profile"))
        .respond_with(ResponseTemplate::new(401).set_body_string("login required"))
        .mount(server)
        .await;
}

/// Bodies of every POST the server received for `request_path`.
pub async fn post_bodies(server: &MockServer, request_path: &str) -> Vec<String> {
    server
        .received_requests()
        .await
        .unwrap_or_default()
        .into_iter()
        .filter(|r| r.method.as_str() == "POST" && r.url.path() == request_path)
        .map(|r| String::from_utf8_lossy(&r.body).into_owned())
        .collect()
}

/// Delegates to an inner transport and records when it is dropped.
#[derive(Debug)]
pub struct TrackedTransport<T> {
    inner: T,
    dropped: Arc<AtomicBool>,
}

impl<T> TrackedTransport<T> {
    pub fn new(inner: T) -> (Self, Arc<AtomicBool>) {
        let dropped = Arc::new(AtomicBool::new(false));
        (
            Self {
                inner,
                dropped: dropped.clone(),
            },
            dropped,
        )
    }
}

impl<T> Drop for TrackedTransport<T> {
    fn drop(&mut self) {
        self.dropped.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl<T: Transport> Transport for TrackedTransport<T> {
    async fn get(&self, url: &Url) -> Result<Page, TransportError> {
        self.inner.get(url).await
    }

    async fn post_form(
        &self,
        url: &Url,
        fields: &[(String, String)],
    ) -> Result<Page, TransportError> {
        self.inner.post_form(url, fields).await
    }
}
