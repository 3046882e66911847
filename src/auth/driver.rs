//! The login state machine.
//!
//! An attempt starts at the configured login URL and walks whatever pages
//! the portal and its identity provider put in the way, one page per step:
//! check for success, otherwise submit the page's form (with credentials
//! where the form asks for them), otherwise follow a continue link,
//! otherwise give up. The number of steps is bounded, so every attempt ends.

use std::future::Future;

use tokio_util::sync::CancellationToken;
use url::Url;

use super::account::AccountIdResolver;
use super::error::{AttemptContext, AuthError, LastCheck, TransportError};
use super::form::{extract_form, FieldKind, Submission};
use super::navigator::find_continue_link;
use super::page::Page;
use super::picture::PictureError;
use super::strategy::{is_identity_field, Strategy};
use super::transport::Transport;
use super::verifier::{SuccessSignal, SuccessVerifier};
use super::AuthenticatedSession;
use crate::config::ResolvedAuthConfig;
use crate::credentials::Credential;

/// Where an attempt is. Replaced, never mutated, at each step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthenticationState {
    pub current_url: Url,
    pub step: usize,
    pub credentials_submitted: bool,
}

impl AuthenticationState {
    pub fn start(url: Url) -> Self {
        Self {
            current_url: url,
            step: 0,
            credentials_submitted: false,
        }
    }

    /// Move to the next step. Once submitted, credentials stay submitted.
    pub fn advance(self, url: Url, credentials_submitted: bool) -> Self {
        Self {
            current_url: url,
            step: self.step + 1,
            credentials_submitted: self.credentials_submitted || credentials_submitted,
        }
    }

    pub fn context(&self, last_check: LastCheck) -> AttemptContext {
        AttemptContext {
            last_url: self.current_url.to_string(),
            step: self.step,
            last_check,
        }
    }
}

/// How a successful login was recognized.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoginOutcome {
    pub signal: SuccessSignal,
    pub state: AuthenticationState,
}

/// One login attempt. Owns its transport; consumed by [`AuthDriver::run`].
pub struct AuthDriver<T: Transport> {
    login_url: Url,
    max_steps: usize,
    continue_link_texts: Vec<String>,
    verifier: SuccessVerifier,
    account_resolver: AccountIdResolver,
    credential: Credential,
    transport: T,
}

impl<T: Transport> AuthDriver<T> {
    pub fn new(config: &ResolvedAuthConfig, credential: Credential, transport: T) -> Self {
        Self {
            login_url: config.login_url.clone(),
            max_steps: config.max_steps,
            continue_link_texts: config.continue_link_texts.clone(),
            verifier: SuccessVerifier::new(config),
            account_resolver: AccountIdResolver::new(&config.account),
            credential,
            transport,
        }
    }

    /// Log in, then resolve the account identifier.
    ///
    /// The transport is dropped on every failure; on success it moves into
    /// the returned session.
    pub async fn run(
        self,
        cancel: &CancellationToken,
    ) -> Result<AuthenticatedSession<T>, AuthError> {
        let outcome = self.login(cancel).await?;
        tracing::info!(
            signal = outcome.signal.as_str(),
            steps = outcome.state.step,
            "Login succeeded"
        );

        let resolved = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                return Err(AuthError::Cancelled {
                    context: outcome.state.context(LastCheck::AccountId),
                });
            }
            resolved = self.account_resolver.resolve(&self.transport) => resolved,
        };
        let account_id = match resolved {
            Ok(id) => Some(id),
            Err(err) => {
                tracing::warn!(error = %err, "Logged in, but the account identifier is unknown");
                None
            }
        };

        Ok(AuthenticatedSession::new(
            self.transport,
            account_id,
            outcome.signal,
            outcome.state.step,
        ))
    }

    /// Run the state machine until success or a typed failure.
    pub async fn login(&self, cancel: &CancellationToken) -> Result<LoginOutcome, AuthError> {
        let initial = AuthenticationState::start(self.login_url.clone());
        let mut page = self
            .network(cancel, &initial, LastCheck::InitialFetch, async {
                self.transport.get(&self.login_url).await
            })
            .await?;
        let mut state = AuthenticationState {
            current_url: page.url.clone(),
            ..initial
        };
        let mut last_check = LastCheck::InitialFetch;

        while state.step < self.max_steps {
            if cancel.is_cancelled() {
                return Err(AuthError::Cancelled {
                    context: state.context(last_check),
                });
            }
            tracing::debug!(
                step = state.step,
                url = %state.current_url,
                credentials_submitted = state.credentials_submitted,
                "Login step"
            );

            if state.credentials_submitted && self.is_back_on_portal(&page.url) {
                if self.probe(cancel, &state).await? {
                    return Ok(success(SuccessSignal::Probe, state));
                }
            }

            last_check = LastCheck::PageHeuristics;
            if let Some(signal) = self.verifier.check_page(&page, state.step) {
                return Ok(success(signal, state));
            }

            let (next, submitted) = match extract_form(&page.body, &page.url) {
                Some(form) => {
                    last_check = LastCheck::FormSubmit;
                    let credential_form = form
                        .fields
                        .iter()
                        .any(|f| f.kind != FieldKind::Submit && is_identity_field(&f.name));
                    let submitted = state.credentials_submitted || credential_form;

                    let action = form.action.clone().ok_or_else(|| AuthError::ActionMissing {
                        context: state.context(last_check),
                    })?;

                    let strategy = Strategy::select(&page.body, &self.credential);
                    let overrides = strategy
                        .overrides(&page.body, &form, &self.credential)
                        .map_err(|err| picture_failure(err, state.context(last_check)))?;

                    let submission = Submission::new(action, &form, &overrides);
                    tracing::debug!(
                        step = state.step,
                        strategy = strategy.as_str(),
                        action = %submission.action,
                        overridden = ?overrides,
                        credential_form,
                        "Submitting form"
                    );
                    let next = self
                        .network(cancel, &state, last_check, async {
                            self.transport
                                .post_form(&submission.action, submission.fields())
                                .await
                        })
                        .await?;

                    if submitted && self.verifier.is_on_target_domain(&next.url) {
                        let landed = state.clone().advance(next.url.clone(), submitted);
                        last_check = LastCheck::Probe;
                        if self.probe(cancel, &landed).await? {
                            return Ok(success(SuccessSignal::Probe, landed));
                        }
                    }
                    if self.verifier.matches_success_url(&next.url) {
                        let landed = state.advance(next.url.clone(), submitted);
                        return Ok(success(SuccessSignal::SuccessUrl, landed));
                    }

                    (next, submitted)
                }
                None => {
                    last_check = LastCheck::ContinueLink;
                    let Some(link) =
                        find_continue_link(&page.body, &page.url, &self.continue_link_texts)
                    else {
                        return Err(dead_end(&page, &state));
                    };

                    tracing::debug!(step = state.step, link = %link, "Following continue link");
                    let next = self
                        .network(cancel, &state, last_check, async {
                            self.transport.get(&link).await
                        })
                        .await?;
                    (next, false)
                }
            };

            state = state.advance(next.url.clone(), submitted);
            page = next;
        }

        tracing::warn!(
            max_steps = self.max_steps,
            url = %state.current_url,
            "Login did not complete within the step limit"
        );
        Err(AuthError::StepsExhausted {
            max_steps: self.max_steps,
            context: state.context(last_check),
        })
    }

    /// On the portal and past the login sub-paths.
    fn is_back_on_portal(&self, url: &Url) -> bool {
        self.verifier.is_on_target_domain(url) && !self.verifier.is_login_path(url)
    }

    async fn probe(
        &self,
        cancel: &CancellationToken,
        state: &AuthenticationState,
    ) -> Result<bool, AuthError> {
        self.network(cancel, state, LastCheck::Probe, async {
            self.verifier.probe(&self.transport).await
        })
        .await
    }

    /// Await a network call, racing it against cancellation.
    async fn network<F, O>(
        &self,
        cancel: &CancellationToken,
        state: &AuthenticationState,
        check: LastCheck,
        call: F,
    ) -> Result<O, AuthError>
    where
        F: Future<Output = Result<O, TransportError>>,
    {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(AuthError::Cancelled {
                context: state.context(check),
            }),
            result = call => result.map_err(|source| AuthError::Network {
                source,
                context: state.context(check),
            }),
        }
    }
}

fn picture_failure(err: PictureError, context: AttemptContext) -> AuthError {
    match err {
        PictureError::Mapping(mapping) => AuthError::MappingIncomplete {
            missing_positions: mapping.missing_positions,
            context,
        },
        PictureError::CarrierMissing => AuthError::CarrierMissing { context },
    }
}

fn success(signal: SuccessSignal, state: AuthenticationState) -> LoginOutcome {
    LoginOutcome { signal, state }
}

/// Neither a form nor a continue link: report what the page showed.
fn dead_end(page: &Page, state: &AuthenticationState) -> AuthError {
    let diagnostics = page.diagnostics();
    tracing::warn!(
        step = state.step,
        url = %page.url,
        status = page.status,
        title = diagnostics.title.as_deref().unwrap_or(""),
        errors = ?diagnostics.errors,
        form_count = diagnostics.form_count,
        "Login flow dead end: no form and no continue link"
    );
    AuthError::FormNotFound {
        context: state.context(LastCheck::ContinueLink),
        page_title: diagnostics.title,
        page_errors: diagnostics.errors,
    }
}
