//! Form discovery and submission bodies.
//!
//! [`extract_form`] picks the form a login page wants submitted and reads its
//! current field values. [`Submission`] merges strategy overrides into those
//! values to produce the POST body.

use std::fmt;
use std::sync::LazyLock;

use scraper::{ElementRef, Html, Selector};
use secrecy::ExposeSecret;
use url::Url;

use super::strategy::FieldOverrides;

static FORM: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("form").expect("valid selector"));
static FIELDS: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("input, select").expect("valid selector"));
static OPTION: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("option").expect("valid selector"));

/// Action fragments that mark a form as the login form.
const LOGIN_ACTION_KEYWORDS: &[&str] = &["login", "auth"];

/// How a field is rendered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Hidden,
    /// Any visible, user-editable input that is not a password.
    Text,
    Password,
    Submit,
    Select,
}

impl FieldKind {
    fn from_input_type(input_type: Option<&str>) -> Self {
        match input_type.map(|t| t.trim().to_ascii_lowercase()).as_deref() {
            Some("hidden") => FieldKind::Hidden,
            Some("password") => FieldKind::Password,
            Some("submit" | "button" | "image") => FieldKind::Submit,
            _ => FieldKind::Text,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormField {
    pub name: String,
    pub value: String,
    pub kind: FieldKind,
}

/// The form a page wants submitted, as found in the document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormDescriptor {
    /// Absolute submission target. `None` when the action is not an http(s) URL.
    pub action: Option<Url>,
    /// Document order. A repeated name keeps its first position and its last value.
    pub fields: Vec<FormField>,
}

impl FormDescriptor {
    pub fn field(&self, name: &str) -> Option<&FormField> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|f| f.name.as_str())
    }

    fn insert(&mut self, field: FormField) {
        match self.fields.iter_mut().find(|f| f.name == field.name) {
            Some(existing) => *existing = field,
            None => self.fields.push(field),
        }
    }
}

/// Find the login form in `html` and read its fields.
///
/// Prefers a form whose action mentions a login keyword, falling back to the
/// first form. Returns `None` when the page has no form.
pub fn extract_form(html: &str, page_url: &Url) -> Option<FormDescriptor> {
    let document = Html::parse_document(html);
    let forms: Vec<ElementRef<'_>> = document.select(&FORM).collect();

    let form = forms
        .iter()
        .find(|form| {
            form.value().attr("action").is_some_and(|action| {
                let action = action.to_ascii_lowercase();
                LOGIN_ACTION_KEYWORDS.iter().any(|k| action.contains(k))
            })
        })
        .or_else(|| forms.first())?;

    Some(describe(*form, page_url))
}

fn describe(form: ElementRef<'_>, page_url: &Url) -> FormDescriptor {
    let mut descriptor = FormDescriptor {
        action: resolve_action(form.value().attr("action"), page_url),
        fields: Vec::new(),
    };

    for element in form.select(&FIELDS) {
        let Some(name) = element.value().attr("name").map(str::trim) else {
            continue;
        };
        if name.is_empty() {
            continue;
        }

        let field = if element.value().name() == "select" {
            FormField {
                name: name.to_string(),
                value: selected_option_value(element),
                kind: FieldKind::Select,
            }
        } else {
            FormField {
                name: name.to_string(),
                value: element.value().attr("value").unwrap_or_default().to_string(),
                kind: FieldKind::from_input_type(element.value().attr("type")),
            }
        };
        descriptor.insert(field);
    }

    descriptor
}

fn resolve_action(action: Option<&str>, page_url: &Url) -> Option<Url> {
    let action = match action.map(str::trim) {
        None | Some("") => return Some(page_url.clone()),
        Some(action) => action,
    };

    let url = page_url.join(action).ok()?;
    matches!(url.scheme(), "http" | "https").then_some(url)
}

fn selected_option_value(select: ElementRef<'_>) -> String {
    let options: Vec<ElementRef<'_>> = select.select(&OPTION).collect();
    options
        .iter()
        .find(|option| option.value().attr("selected").is_some())
        .or_else(|| options.first())
        .map(|option| match option.value().attr("value") {
            Some(value) => value.to_string(),
            None => option.text().collect::<String>().trim().to_string(),
        })
        .unwrap_or_default()
}

/// A POST body ready to send: the form's fields with overrides applied.
///
/// `Debug` lists field names only.
pub struct Submission {
    pub action: Url,
    fields: Vec<(String, String)>,
}

impl Submission {
    /// Merge `overrides` into the descriptor's values. Overrides for names the
    /// form does not have are ignored.
    pub fn new(action: Url, descriptor: &FormDescriptor, overrides: &FieldOverrides) -> Self {
        let fields = descriptor
            .fields
            .iter()
            .filter(|field| !field.name.trim().is_empty())
            .map(|field| {
                let value = match overrides.get(&field.name) {
                    Some(secret) => secret.expose_secret().to_string(),
                    None => field.value.clone(),
                };
                (field.name.clone(), value)
            })
            .collect();

        Self { action, fields }
    }

    pub fn fields(&self) -> &[(String, String)] {
        &self.fields
    }
}

impl fmt::Debug for Submission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Submission")
            .field("action", &self.action.as_str())
            .field(
                "fields",
                &self.fields.iter().map(|(name, _)| name).collect::<Vec<_>>(),
            )
            .finish()
    }
}
