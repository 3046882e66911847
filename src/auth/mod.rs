//! Logging in to the portal through its identity provider.
//!
//! [`Authenticator`] is the entry point: one call runs one attempt with its
//! own transport and cookie jar, so attempts for different accounts never
//! share state and may run concurrently.

mod account;
mod driver;
mod error;
mod form;
mod navigator;
mod page;
mod picture;
mod strategy;
mod transport;
mod verifier;

pub use account::AccountIdResolver;
pub use driver::{AuthDriver, AuthenticationState, LoginOutcome};
pub use error::{AttemptContext, AuthError, LastCheck, TransportError};
pub use form::{extract_form, FieldKind, FormDescriptor, FormField, Submission};
pub use navigator::find_continue_link;
pub use page::{Page, PageDiagnostics};
pub use picture::{MappingIncomplete, PictureError, PictureMapping};
pub use strategy::{FieldOverrides, Strategy};
pub use transport::{HttpTransport, Transport};
pub use verifier::{SuccessSignal, SuccessVerifier};

use tokio_util::sync::CancellationToken;
use tracing::Instrument;
use url::Url;

use crate::config::{AuthConfig, ResolvedAuthConfig};
use crate::credentials::Credential;

/// A logged-in session. Dropping it discards the cookies.
#[derive(Debug)]
pub struct AuthenticatedSession<T = HttpTransport> {
    transport: T,
    account_id: Option<String>,
    signal: SuccessSignal,
    steps: usize,
}

impl<T: Transport> AuthenticatedSession<T> {
    pub(crate) fn new(
        transport: T,
        account_id: Option<String>,
        signal: SuccessSignal,
        steps: usize,
    ) -> Self {
        Self {
            transport,
            account_id,
            signal,
            steps,
        }
    }

    /// `None` when login succeeded but no identifier could be resolved.
    pub fn account_id(&self) -> Option<&str> {
        self.account_id.as_deref()
    }

    pub fn require_account_id(&self) -> Result<&str, AuthError> {
        self.account_id().ok_or(AuthError::IdentifierNotFound)
    }

    pub fn signal(&self) -> SuccessSignal {
        self.signal
    }

    /// Steps taken before success was recognized.
    pub fn steps(&self) -> usize {
        self.steps
    }

    pub async fn get(&self, url: &Url) -> Result<Page, TransportError> {
        self.transport.get(url).await
    }

    pub async fn post_form(
        &self,
        url: &Url,
        fields: &[(String, String)],
    ) -> Result<Page, TransportError> {
        self.transport.post_form(url, fields).await
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn into_transport(self) -> T {
        self.transport
    }
}

/// Runs login attempts against one portal.
#[derive(Debug, Clone)]
pub struct Authenticator {
    config: ResolvedAuthConfig,
}

impl Authenticator {
    pub fn new(config: &AuthConfig) -> Result<Self, AuthError> {
        Ok(Self::from_resolved(config.resolve()?))
    }

    pub fn from_resolved(config: ResolvedAuthConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ResolvedAuthConfig {
        &self.config
    }

    /// Log in as `account` over a fresh HTTP session.
    ///
    /// `account` only labels logs. Cancelling `cancel` ends the attempt with
    /// [`AuthError::Cancelled`] at the next await point.
    pub async fn authenticate(
        &self,
        account: &str,
        credential: Credential,
        cancel: &CancellationToken,
    ) -> Result<AuthenticatedSession<HttpTransport>, AuthError> {
        let transport = HttpTransport::new(&self.config).map_err(|source| AuthError::Network {
            source,
            context: AuthenticationState::start(self.config.login_url.clone())
                .context(LastCheck::Start),
        })?;
        self.authenticate_with(account, credential, transport, cancel)
            .await
    }

    /// Log in as `account` over the given transport.
    pub async fn authenticate_with<T: Transport>(
        &self,
        account: &str,
        credential: Credential,
        transport: T,
        cancel: &CancellationToken,
    ) -> Result<AuthenticatedSession<T>, AuthError> {
        let span = tracing::info_span!("login", account = %account, kind = credential.kind());
        let driver = AuthDriver::new(&self.config, credential, transport);

        let attempt = cancel.child_token();
        async {
            tracing::info!(login_url = %self.config.login_url, "Starting login");
            let run = driver.run(&attempt);
            tokio::pin!(run);

            let result = match self.config.attempt_timeout {
                Some(timeout) => tokio::select! {
                    result = &mut run => result,
                    _ = tokio::time::sleep(timeout) => {
                        tracing::warn!(timeout = ?timeout, "Login attempt timed out");
                        attempt.cancel();
                        run.await
                    }
                },
                None => run.await,
            };
            if let Err(err) = &result {
                tracing::warn!(error = %err, "Login failed");
            }
            result
        }
        .instrument(span)
        .await
    }
}
