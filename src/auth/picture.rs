//! Picture-sequence secrets.
//!
//! Some accounts log in by clicking an ordered sequence of pictures instead
//! of typing a password. The page shows a grid of labeled pictures, each
//! carrying a code the server reassigns for every session, plus a hidden
//! field that receives the concatenated codes. The mapping read from one page
//! is only valid for that page and is never reused.

use std::collections::HashMap;
use std::sync::LazyLock;

use scraper::{ElementRef, Html, Selector};

use super::form::{FieldKind, FormDescriptor};
use super::page::collapse_whitespace;
use super::strategy::{is_identity_field, FieldOverrides};

/// Attributes holding a picture's session code, in lookup order.
const CODE_ATTRIBUTES: &[&str] = &["data-passparam-value", "data-picture-code"];

/// Attributes holding a picture's label, in lookup order.
const LABEL_ATTRIBUTES: &[&str] = &["title", "aria-label", "data-label"];

/// Field names that receive the derived picture secret.
const CARRIER_ALIASES: &[&str] = &["password", "passparam", "picture-password", "picturepassword"];

static PICTURES: LazyLock<Selector> = LazyLock::new(|| {
    Selector::parse("[data-passparam-value], [data-picture-code]").expect("valid selector")
});
static SLOTS: LazyLock<Selector> = LazyLock::new(|| {
    Selector::parse(".picture-slots, [data-picture-slots], .password-slots")
        .expect("valid selector")
});
static INPUTS: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("input[name]").expect("valid selector"));
static IMG: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("img[alt]").expect("valid selector"));

/// Some configured labels were not on the page.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("picture labels at positions {missing_positions:?} are not on the page")]
pub struct MappingIncomplete {
    /// Zero-based positions in the configured sequence.
    pub missing_positions: Vec<usize>,
}

/// Why no picture secret could be placed in the form.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PictureError {
    #[error(transparent)]
    Mapping(#[from] MappingIncomplete),

    /// The submitted form has no field to carry the derived secret.
    #[error("the submitted form has no picture secret field")]
    CarrierMissing,
}

/// Label → session code, as shown on one page.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PictureMapping {
    codes: HashMap<String, String>,
}

impl PictureMapping {
    /// Read every labeled picture with a code from `html`.
    pub fn from_html(html: &str) -> Self {
        let document = Html::parse_document(html);
        Self::from_document(&document)
    }

    fn from_document(document: &Html) -> Self {
        let mut codes = HashMap::new();
        for picture in document.select(&PICTURES) {
            let Some(code) = picture_code(picture) else {
                continue;
            };
            let Some(label) = picture_label(picture) else {
                continue;
            };
            codes.entry(normalize_label(&label)).or_insert(code);
        }
        Self { codes }
    }

    pub fn code(&self, label: &str) -> Option<&str> {
        self.codes.get(&normalize_label(label)).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.codes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.codes.is_empty()
    }

    /// Concatenate the codes for `labels` in order.
    ///
    /// Fails, listing every missing position, rather than produce a partial secret.
    pub fn derive(&self, labels: &[String]) -> Result<String, MappingIncomplete> {
        let mut secret = String::new();
        let mut missing_positions = Vec::new();

        for (position, label) in labels.iter().enumerate() {
            match self.code(label) {
                Some(code) => secret.push_str(code),
                None => missing_positions.push(position),
            }
        }

        if missing_positions.is_empty() {
            Ok(secret)
        } else {
            Err(MappingIncomplete { missing_positions })
        }
    }
}

fn normalize_label(label: &str) -> String {
    collapse_whitespace(label).to_lowercase()
}

fn picture_code(picture: ElementRef<'_>) -> Option<String> {
    CODE_ATTRIBUTES
        .iter()
        .filter_map(|attr| picture.value().attr(attr))
        .map(str::trim)
        .find(|code| !code.is_empty())
        .map(str::to_string)
}

fn picture_label(picture: ElementRef<'_>) -> Option<String> {
    let from_attributes = LABEL_ATTRIBUTES
        .iter()
        .filter_map(|attr| picture.value().attr(attr))
        .map(str::to_string);
    let from_image = picture
        .select(&IMG)
        .filter_map(|img| img.value().attr("alt"))
        .map(str::to_string);
    let from_text = std::iter::once(picture.text().collect::<String>());

    from_attributes
        .chain(from_image)
        .chain(from_text)
        .map(|label| collapse_whitespace(&label))
        .find(|label| !label.is_empty())
}

fn is_carrier_name(name: &str) -> bool {
    let name = name.trim();
    CARRIER_ALIASES
        .iter()
        .any(|alias| name.eq_ignore_ascii_case(alias))
}

/// Whether `html` is a picture-sequence entry page.
///
/// All three must be present: a picture with a session code, a carrier field
/// that is not a password input, and the slot region showing the sequence.
pub fn detect(html: &str) -> bool {
    let document = Html::parse_document(html);

    let has_picture = document
        .select(&PICTURES)
        .any(|picture| picture_code(picture).is_some());
    let has_carrier = document.select(&INPUTS).any(|input| {
        let is_password = input
            .value()
            .attr("type")
            .is_some_and(|t| t.trim().eq_ignore_ascii_case("password"));
        input.value().attr("name").is_some_and(is_carrier_name) && !is_password
    });
    let has_slots = document.select(&SLOTS).next().is_some();

    has_picture && has_carrier && has_slots
}

/// Derive the picture secret for this page and place it in the form.
///
/// The identity field gets `username` verbatim and the carrier field gets the
/// concatenated codes. Nothing else is touched. A form without a carrier
/// field is an error.
pub fn apply(
    html: &str,
    descriptor: &FormDescriptor,
    username: &str,
    labels: &[String],
) -> Result<FieldOverrides, PictureError> {
    let mapping = PictureMapping::from_html(html);
    let secret = mapping.derive(labels)?;
    let carrier = descriptor
        .fields
        .iter()
        .find(|f| f.kind != FieldKind::Password && is_carrier_name(&f.name))
        .ok_or(PictureError::CarrierMissing)?;

    let mut overrides = FieldOverrides::default();
    if let Some(identity) = descriptor
        .fields
        .iter()
        .find(|f| f.kind != FieldKind::Submit && is_identity_field(&f.name))
    {
        overrides.set(identity.name.clone(), username);
    }
    overrides.set(carrier.name.clone(), secret);

    Ok(overrides)
}
