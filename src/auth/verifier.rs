//! Deciding whether a session is authenticated.
//!
//! The portal publishes no contract for "you are logged in", so several
//! signals are combined: the URL the flow landed on, markers in the page,
//! and, when those are inconclusive, probing endpoints that only answer with
//! JSON to an authenticated session.

use url::Url;

use super::error::TransportError;
use super::page::Page;
use super::transport::Transport;
use crate::config::{strip_scheme, ResolvedAuthConfig};

/// What convinced the verifier that login succeeded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SuccessSignal {
    /// URL contains the configured success fragment.
    SuccessUrl,
    /// A regular page on the target domain, outside the login flow.
    TargetDomainPage,
    /// Page content only shown in an account context.
    AccountMarker,
    /// A post-login-only endpoint answered with JSON.
    Probe,
    /// Still on the target domain after many steps. A heuristic, not proof.
    BenefitOfDoubt,
}

impl SuccessSignal {
    pub fn as_str(&self) -> &'static str {
        match self {
            SuccessSignal::SuccessUrl => "success_url",
            SuccessSignal::TargetDomainPage => "target_domain_page",
            SuccessSignal::AccountMarker => "account_marker",
            SuccessSignal::Probe => "probe",
            SuccessSignal::BenefitOfDoubt => "benefit_of_doubt",
        }
    }
}

#[derive(Debug, Clone)]
pub struct SuccessVerifier {
    target_domain: String,
    success_fragment: String,
    login_path_markers: Vec<String>,
    landing_paths: Vec<String>,
    account_markers: Vec<String>,
    benefit_of_doubt_after: usize,
    probe_endpoints: Vec<Url>,
}

impl SuccessVerifier {
    pub fn new(config: &ResolvedAuthConfig) -> Self {
        Self {
            target_domain: config.target_domain.clone(),
            success_fragment: config.success_fragment.clone(),
            login_path_markers: config.login_path_markers.clone(),
            landing_paths: config.landing_paths.clone(),
            account_markers: config.account_markers.clone(),
            benefit_of_doubt_after: config.benefit_of_doubt_after,
            probe_endpoints: config.probe_endpoints.clone(),
        }
    }

    /// Primary check: the URL contains the success fragment, ignoring scheme.
    pub fn matches_success_url(&self, url: &Url) -> bool {
        strip_scheme(url.as_str())
            .to_lowercase()
            .contains(&self.success_fragment)
    }

    /// Host (and explicit port) contains the target domain.
    pub fn is_on_target_domain(&self, url: &Url) -> bool {
        let Some(host) = url.host_str() else {
            return false;
        };
        let authority = match url.port() {
            Some(port) => format!("{host}:{port}"),
            None => host.to_string(),
        };
        authority.to_lowercase().contains(&self.target_domain)
    }

    /// The path belongs to the login flow.
    pub fn is_login_path(&self, url: &Url) -> bool {
        let path = url.path().to_lowercase();
        self.login_path_markers
            .iter()
            .any(|marker| path.contains(marker.as_str()))
    }

    /// The path is a pre-login landing page of the portal.
    pub fn is_landing_path(&self, url: &Url) -> bool {
        self.landing_paths.iter().any(|p| url.path() == p)
    }

    /// Cheap heuristics on the current page.
    ///
    /// The benefit-of-doubt rule is a last resort and is logged as such.
    pub fn check_page(&self, page: &Page, step: usize) -> Option<SuccessSignal> {
        let on_target = self.is_on_target_domain(&page.url);

        if on_target
            && page.is_success()
            && !self.is_login_path(&page.url)
            && !self.is_landing_path(&page.url)
        {
            return Some(SuccessSignal::TargetDomainPage);
        }

        if self
            .account_markers
            .iter()
            .any(|marker| !marker.is_empty() && page.body.contains(marker.as_str()))
        {
            return Some(SuccessSignal::AccountMarker);
        }

        if on_target && step > self.benefit_of_doubt_after {
            tracing::warn!(
                step,
                threshold = self.benefit_of_doubt_after,
                url = %page.url,
                "Assuming login succeeded: still on target domain after many steps"
            );
            return Some(SuccessSignal::BenefitOfDoubt);
        }

        None
    }

    /// Secondary check: probe endpoints in order until one answers with JSON.
    ///
    /// Non-2xx or non-JSON answers mean "not yet". Transport failures are
    /// returned, not retried.
    pub async fn probe<T>(&self, transport: &T) -> Result<bool, TransportError>
    where
        T: Transport + ?Sized,
    {
        for endpoint in &self.probe_endpoints {
            let page = transport.get(endpoint).await?;
            if page.is_success() && is_json_document(&page.body) {
                tracing::debug!(endpoint = %endpoint, "Probe confirmed authentication");
                return Ok(true);
            }
            tracing::debug!(endpoint = %endpoint, status = page.status, "Probe not authenticated");
        }
        Ok(false)
    }
}

/// Body parses as a JSON object or array.
pub(crate) fn is_json_document(body: &str) -> bool {
    matches!(
        serde_json::from_str::<serde_json::Value>(body.trim()),
        Ok(serde_json::Value::Object(_) | serde_json::Value::Array(_))
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AuthConfig;

    fn verifier() -> SuccessVerifier {
        let mut config = AuthConfig::new(
            "https://portal.example/auth/login",
            "portal.example",
            "portal.example/portal",
        );
        config.benefit_of_doubt_after = 3;
        config.account_markers = vec!["profileId".into()];
        SuccessVerifier::new(&config.resolve().unwrap())
    }

    fn page(url: &str, body: &str) -> Page {
        Page::new(Url::parse(url).unwrap(), 200, body)
    }

    #[test]
    fn test_success_url_ignores_scheme_and_case() {
        let v = verifier();
        assert!(v.matches_success_url(&Url::parse("http://Portal.example/portal/home").unwrap()));
        assert!(v.matches_success_url(&Url::parse("https://portal.example/portal").unwrap()));
        assert!(!v.matches_success_url(&Url::parse("https://portal.example/auth/login").unwrap()));
        assert!(!v.matches_success_url(&Url::parse("https://idp.example/portal/home").unwrap()));
    }

    #[test]
    fn test_target_domain_and_paths() {
        let v = verifier();
        let login = Url::parse("https://portal.example/auth/login.php").unwrap();
        let idp = Url::parse("https://idp.example/saml/sso").unwrap();
        let landing = Url::parse("https://portal.example/").unwrap();

        assert!(v.is_on_target_domain(&login));
        assert!(v.is_login_path(&login));
        assert!(!v.is_on_target_domain(&idp));
        assert!(v.is_landing_path(&landing));
    }

    #[test]
    fn test_check_page_target_domain_outside_login() {
        let v = verifier();
        assert_eq!(
            v.check_page(&page("https://portal.example/overview", "<html></html>"), 2),
            Some(SuccessSignal::TargetDomainPage)
        );
        assert_eq!(v.check_page(&page("https://portal.example/", ""), 2), None);
        assert_eq!(v.check_page(&page("https://portal.example/auth/x", ""), 2), None);

        let mut error_page = page("https://portal.example/overview", "");
        error_page.status = 500;
        assert_eq!(v.check_page(&error_page, 2), None);
    }

    #[test]
    fn test_check_page_account_marker() {
        let v = verifier();
        let html = r#"<script>window.state = {"profileId": 42};</script>"#;
        assert_eq!(
            v.check_page(&page("https://idp.example/login/done", html), 0),
            Some(SuccessSignal::AccountMarker)
        );
    }

    #[test]
    fn test_check_page_benefit_of_doubt_only_on_target_domain() {
        let v = verifier();
        let on_target = page("https://portal.example/auth/callback", "");
        assert_eq!(v.check_page(&on_target, 3), None);
        assert_eq!(
            v.check_page(&on_target, 4),
            Some(SuccessSignal::BenefitOfDoubt)
        );

        let elsewhere = page("https://idp.example/login", "");
        assert_eq!(v.check_page(&elsewhere, 9), None);
    }

    #[test]
    fn test_is_json_document() {
        assert!(is_json_document(r#"{"a":1}"#));
        assert!(is_json_document(" [1, 2] "));
        assert!(!is_json_document("\"string\""));
        assert!(!is_json_document("42"));
        assert!(!is_json_document("<html></html>"));
        assert!(!is_json_document(""));
    }
}
