//! Credential strategies: which form fields get which secret values.
//!
//! The set of strategies is closed. [`Strategy::select`] tries them in a
//! fixed priority order and the first one that detects the page wins, so a
//! single submission never mixes overrides from two strategies.

use std::fmt;

use secrecy::SecretString;

use super::form::{FieldKind, FormDescriptor};
use super::picture::{self, PictureError};
use crate::credentials::Credential;

/// Field names that carry the account's identity.
const IDENTITY_ALIASES: &[&str] = &["username", "user", "login", "userid", "user_id", "email"];

/// Field names that carry a typed secret.
const SECRET_ALIASES: &[&str] = &["password", "pass", "pwd", "passwd"];

pub fn is_identity_field(name: &str) -> bool {
    matches_alias(name, IDENTITY_ALIASES)
}

pub fn is_secret_field(name: &str) -> bool {
    matches_alias(name, SECRET_ALIASES)
}

fn matches_alias(name: &str, aliases: &[&str]) -> bool {
    let name = name.trim();
    aliases.iter().any(|alias| name.eq_ignore_ascii_case(alias))
}

/// Values to write into named form fields. `Debug` shows names only.
#[derive(Default)]
pub struct FieldOverrides {
    entries: Vec<(String, SecretString)>,
}

impl FieldOverrides {
    /// Set `name` to `value`, replacing an earlier value for the same name.
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        let value = SecretString::from(value.into());
        match self.entries.iter_mut().find(|(n, _)| *n == name) {
            Some(entry) => entry.1 = value,
            None => self.entries.push((name, value)),
        }
    }

    pub fn get(&self, name: &str) -> Option<&SecretString> {
        self.entries.iter().find(|(n, _)| n == name).map(|(_, v)| v)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(n, _)| n.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl fmt::Debug for FieldOverrides {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.names()).finish()
    }
}

/// Fill identity-alias fields with `username` and secret-alias fields with
/// `secret`. Submit buttons and every other field are left alone.
///
/// Without a secret only the identity is injected.
pub fn apply_fixed_secret(
    descriptor: &FormDescriptor,
    username: &str,
    secret: Option<&SecretString>,
) -> FieldOverrides {
    use secrecy::ExposeSecret;

    let mut overrides = FieldOverrides::default();
    for field in &descriptor.fields {
        if field.kind == FieldKind::Submit {
            continue;
        }
        if is_identity_field(&field.name) {
            overrides.set(field.name.clone(), username);
        } else if let Some(secret) = secret.filter(|_| is_secret_field(&field.name)) {
            overrides.set(field.name.clone(), secret.expose_secret());
        }
    }
    overrides
}

/// A rule for computing field overrides for one kind of secret entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    PictureSequence,
    FixedSecret,
}

impl Strategy {
    /// Strategies in the order they are tried.
    pub const PRIORITY: [Strategy; 2] = [Strategy::PictureSequence, Strategy::FixedSecret];

    pub fn as_str(&self) -> &'static str {
        match self {
            Strategy::PictureSequence => "picture_sequence",
            Strategy::FixedSecret => "fixed_secret",
        }
    }

    /// Whether this strategy recognizes the page and can serve `credential`.
    pub fn detects(&self, html: &str, credential: &Credential) -> bool {
        match self {
            Strategy::PictureSequence => {
                matches!(credential, Credential::PictureSequence { .. }) && picture::detect(html)
            }
            // Fallback: injects whatever aliases the form has, possibly nothing.
            Strategy::FixedSecret => true,
        }
    }

    /// The first strategy in priority order that detects the page.
    pub fn select(html: &str, credential: &Credential) -> Strategy {
        Self::PRIORITY
            .into_iter()
            .find(|strategy| strategy.detects(html, credential))
            .unwrap_or(Strategy::FixedSecret)
    }

    /// Compute the overrides this strategy wants for `descriptor`.
    pub fn overrides(
        &self,
        html: &str,
        descriptor: &FormDescriptor,
        credential: &Credential,
    ) -> Result<FieldOverrides, PictureError> {
        match (self, credential) {
            (Strategy::PictureSequence, Credential::PictureSequence { username, labels }) => {
                picture::apply(html, descriptor, username, labels)
            }
            (_, Credential::FixedSecret { username, secret }) => {
                Ok(apply_fixed_secret(descriptor, username, Some(secret)))
            }
            (_, Credential::PictureSequence { username, .. }) => {
                Ok(apply_fixed_secret(descriptor, username, None))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::form::extract_form;
    use secrecy::ExposeSecret;
    use url::Url;

    fn descriptor(html: &str) -> FormDescriptor {
        let url = Url::parse("https://idp.example/login").unwrap();
        extract_form(html, &url).unwrap()
    }

    fn value<'a>(overrides: &'a FieldOverrides, name: &str) -> Option<&'a str> {
        overrides.get(name).map(|v| v.expose_secret())
    }

    #[test]
    fn test_aliases_are_case_insensitive() {
        assert!(is_identity_field("UserName"));
        assert!(is_identity_field(" login "));
        assert!(!is_identity_field("username2"));
        assert!(is_secret_field("PWD"));
        assert!(!is_secret_field("password_confirm"));
    }

    #[test]
    fn test_fixed_secret_only_touches_alias_fields() {
        let form = descriptor(
            r#"<form action="/login">
                 <input type="hidden" name="csrf" value="t0k3n">
                 <input name="Username">
                 <input type="password" name="Password">
                 <input name="remember" value="on">
                 <input type="submit" name="login" value="Sign in">
               </form>"#,
        );
        let secret = SecretString::from("s3cret".to_string());

        let overrides = apply_fixed_secret(&form, "alice", Some(&secret));
        assert_eq!(value(&overrides, "Username"), Some("alice"));
        assert_eq!(value(&overrides, "Password"), Some("s3cret"));
        assert_eq!(overrides.len(), 2, "got {overrides:?}");
        assert!(overrides.get("csrf").is_none());
        assert!(overrides.get("remember").is_none());
        // Submit button named like an identity alias keeps its value.
        assert!(overrides.get("login").is_none());
    }

    #[test]
    fn test_fixed_secret_without_secret_injects_identity_only() {
        let form = descriptor(
            r#"<form action="/login"><input name="user"><input type="password" name="pass"></form>"#,
        );
        let overrides = apply_fixed_secret(&form, "bob", None);
        assert_eq!(value(&overrides, "user"), Some("bob"));
        assert!(overrides.get("pass").is_none());
    }

    #[test]
    fn test_overrides_debug_hides_values() {
        let mut overrides = FieldOverrides::default();
        overrides.set("password", "s3cret");
        overrides.set("password", "other");
        assert_eq!(overrides.len(), 1);
        assert_eq!(format!("{overrides:?}"), r#"{"password"}"#);
    }

    #[test]
    fn test_select_prefers_pictures_for_picture_credentials() {
        let html = r#"
            <form action="/login/pictures">
              <input type="hidden" name="username" value="bob">
              <input type="hidden" name="password" value="">
              <div class="picture-slots"><span></span></div>
              <button type="button" data-passparam-value="4" title="sun"></button>
            </form>"#;

        let pictures = Credential::picture_sequence("bob", ["sun"]);
        assert_eq!(Strategy::select(html, &pictures), Strategy::PictureSequence);

        let fixed = Credential::fixed_secret("alice", "s3cret");
        assert_eq!(Strategy::select(html, &fixed), Strategy::FixedSecret);

        let plain = r#"<form action="/login"><input name="username"></form>"#;
        assert_eq!(Strategy::select(plain, &pictures), Strategy::FixedSecret);
    }

    #[test]
    fn test_fixed_strategy_for_picture_credential_injects_identity_only() {
        let html = r#"<form action="/login"><input name="username"><input type="password" name="password"></form>"#;
        let credential = Credential::picture_sequence("bob", ["sun"]);
        let form = descriptor(html);

        let overrides = Strategy::FixedSecret
            .overrides(html, &form, &credential)
            .unwrap();
        assert_eq!(value(&overrides, "username"), Some("bob"));
        assert!(overrides.get("password").is_none());
    }
}
