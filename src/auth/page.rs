//! A fetched page and the diagnostics read from it when a flow dead-ends.

use std::sync::LazyLock;

use scraper::{Html, Selector};
use url::Url;

static TITLE: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("title").expect("valid selector"));
static FORM: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("form").expect("valid selector"));
static ERROR_ELEMENTS: LazyLock<Selector> = LazyLock::new(|| {
    Selector::parse(
        "[class*='error'], [class*='alert'], [class*='warning'], [role='alert'], [id*='error']",
    )
    .expect("valid selector")
});

/// Longest error text kept per element.
const MAX_ERROR_TEXT: usize = 200;

/// A response body together with the URL it was finally served from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Page {
    /// URL after any redirects the transport followed.
    pub url: Url,
    pub status: u16,
    pub body: String,
}

impl Page {
    pub fn new(url: Url, status: u16, body: impl Into<String>) -> Self {
        Self {
            url,
            status,
            body: body.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Summarize the page for a dead-end report.
    pub fn diagnostics(&self) -> PageDiagnostics {
        PageDiagnostics::from_html(&self.body)
    }
}

/// What a page looked like when the driver gave up on it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PageDiagnostics {
    pub title: Option<String>,
    /// Text of error/alert-like elements, deduplicated, in document order.
    pub errors: Vec<String>,
    pub form_count: usize,
}

impl PageDiagnostics {
    pub fn from_html(html: &str) -> Self {
        let document = Html::parse_document(html);

        let title = document
            .select(&TITLE)
            .next()
            .map(|el| collapse_whitespace(&el.text().collect::<String>()))
            .filter(|t| !t.is_empty());

        let mut errors: Vec<String> = Vec::new();
        for element in document.select(&ERROR_ELEMENTS) {
            let mut text = collapse_whitespace(&element.text().collect::<String>());
            if text.is_empty() {
                continue;
            }
            if let Some((cut, _)) = text.char_indices().nth(MAX_ERROR_TEXT) {
                text.truncate(cut);
            }
            if !errors.contains(&text) {
                errors.push(text);
            }
        }

        Self {
            title,
            errors,
            form_count: document.select(&FORM).count(),
        }
    }
}

pub(crate) fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}
