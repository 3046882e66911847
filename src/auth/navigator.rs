//! Following a "continue to identity provider" link on pages without a form.

use std::sync::LazyLock;

use scraper::{ElementRef, Html, Selector};
use url::Url;

use super::page::collapse_whitespace;

/// Anchors explicitly marked as the continue link.
static MARKED_LINKS: LazyLock<Selector> = LazyLock::new(|| {
    Selector::parse("a[data-continue-idp][href], a#continue-to-idp[href], a.continue-idp[href]")
        .expect("valid selector")
});
static LINKS: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("a[href]").expect("valid selector"));

/// Find the link that continues the flow to the identity provider.
///
/// Explicitly marked anchors win; otherwise the first anchor whose text
/// equals one of `texts` (case-insensitive, whitespace collapsed). `texts`
/// are expected lowercase.
pub fn find_continue_link(html: &str, page_url: &Url, texts: &[String]) -> Option<Url> {
    let document = Html::parse_document(html);

    if let Some(url) = document
        .select(&MARKED_LINKS)
        .find_map(|anchor| resolve_href(anchor, page_url))
    {
        return Some(url);
    }

    // Configured order: earlier phrases win.
    texts.iter().find_map(|wanted| {
        document
            .select(&LINKS)
            .filter(|anchor| {
                collapse_whitespace(&anchor.text().collect::<String>()).to_lowercase() == *wanted
            })
            .find_map(|anchor| resolve_href(anchor, page_url))
    })
}

fn resolve_href(anchor: ElementRef<'_>, page_url: &Url) -> Option<Url> {
    let href = anchor.value().attr("href")?.trim();
    if href.is_empty() || href.starts_with('#') {
        return None;
    }
    let url = page_url.join(href).ok()?;
    matches!(url.scheme(), "http" | "https").then_some(url)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn page_url() -> Url {
        Url::parse("https://portal.example/auth/select").unwrap()
    }

    fn texts() -> Vec<String> {
        vec!["continue to login".into(), "continue".into()]
    }

    #[test]
    fn test_marked_link_wins() {
        let html = r#"
            <a href="/help">Continue</a>
            <a class="continue-idp" href="../idp/start?sp=portal">Go</a>
        "#;
        let url = find_continue_link(html, &page_url(), &texts()).unwrap();
        assert_eq!(url.as_str(), "https://portal.example/idp/start?sp=portal");
    }

    #[test]
    fn test_text_match_in_phrase_order() {
        let html = r#"
            <a href="/generic">Continue</a>
            <a href="https://idp.example/login">  Continue
               to LOGIN </a>
        "#;
        let url = find_continue_link(html, &page_url(), &texts()).unwrap();
        assert_eq!(url.as_str(), "https://idp.example/login");
    }

    #[test]
    fn test_ignores_fragment_and_script_links() {
        let html = r##"
            <a id="continue-to-idp" href="#">Continue</a>
            <a href="javascript:go()">Continue to login</a>
        "##;
        assert!(find_continue_link(html, &page_url(), &texts()).is_none());
    }

    #[test]
    fn test_no_links() {
        assert!(find_continue_link("<p>Session expired</p>", &page_url(), &texts()).is_none());
    }
}
