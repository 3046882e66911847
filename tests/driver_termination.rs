mod support;

use anyhow::Result;
use portal_login::auth::{AuthError, Authenticator, LastCheck};
use portal_login::credentials::Credential;
use tokio_util::sync::CancellationToken;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer};

use support::{config_for, html};

const LOOPING_FORM: &str = r#"<html><body>
  <form action="/login/start" method="post">
    <input type="hidden" name="nonce" value="again">
  </form>
</body></html>"#;

#[tokio::test]
async fn endless_forms_stop_at_max_steps() -> Result<()> {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/login/start"))
        .respond_with(html(LOOPING_FORM))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/login/start"))
        .respond_with(html(LOOPING_FORM))
        .expect(4)
        .mount(&server)
        .await;

    let mut config = config_for(&server);
    config.max_steps = 4;

    let authenticator = Authenticator::new(&config)?;
    let err = authenticator
        .authenticate(
            "alice",
            Credential::fixed_secret("alice", "s3cret"),
            &CancellationToken::new(),
        )
        .await
        .unwrap_err();

    match err {
        AuthError::StepsExhausted { max_steps, context } => {
            assert_eq!(max_steps, 4);
            assert_eq!(context.step, 4);
            assert_eq!(context.last_check, LastCheck::FormSubmit);
        }
        other => panic!("expected StepsExhausted, got {other}"),
    }
    Ok(())
}

#[tokio::test]
async fn lingering_on_target_domain_eventually_counts_as_success() -> Result<()> {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/login/start"))
        .respond_with(html(LOOPING_FORM))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/login/start"))
        .respond_with(html(LOOPING_FORM))
        .mount(&server)
        .await;

    let mut config = config_for(&server);
    config.max_steps = 10;
    config.benefit_of_doubt_after = 2;

    let authenticator = Authenticator::new(&config)?;
    let session = authenticator
        .authenticate(
            "alice",
            Credential::fixed_secret("alice", "s3cret"),
            &CancellationToken::new(),
        )
        .await?;

    assert_eq!(
        session.signal(),
        portal_login::auth::SuccessSignal::BenefitOfDoubt
    );
    assert_eq!(session.steps(), 3);
    assert_eq!(session.account_id(), None);
    Ok(())
}

#[tokio::test]
async fn form_without_usable_action_is_reported() -> Result<()> {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/login/start"))
        .respond_with(html(
            r#"<form action="javascript:void(0)"><input name="username"><input type="password" name="password"></form>"#,
        ))
        .mount(&server)
        .await;

    let authenticator = Authenticator::new(&config_for(&server))?;
    let err = authenticator
        .authenticate(
            "alice",
            Credential::fixed_secret("alice", "s3cret"),
            &CancellationToken::new(),
        )
        .await
        .unwrap_err();

    assert!(matches!(err, AuthError::ActionMissing { .. }), "got {err}");
    let posts = server
        .received_requests()
        .await
        .unwrap_or_default()
        .into_iter()
        .filter(|r| r.method.as_str() == "POST")
        .count();
    assert_eq!(posts, 0);
    Ok(())
}

#[test]
fn invalid_config_is_rejected_up_front() {
    let config = portal_login::config::AuthConfig::new("not a url", "portal.example", "portal");
    let err = Authenticator::new(&config).unwrap_err();
    assert!(matches!(err, AuthError::Config(_)), "got {err}");
}
