//! Selector-driven field extraction.
//!
//! The functions here never fail: a selector that does not parse, matches
//! nothing, or matches a node without the requested attribute all come back
//! as `None`. Callers decide what an absent field means.

use scraper::{ElementRef, Html, Selector};
use tracing::debug;

/// Something a selector can be run against: a whole document or one element.
pub trait Scope {
    /// First node under this scope matching `selector`.
    fn first<'a>(&'a self, selector: &Selector) -> Option<ElementRef<'a>>;
}

impl Scope for Html {
    fn first<'a>(&'a self, selector: &Selector) -> Option<ElementRef<'a>> {
        self.select(selector).next()
    }
}

impl Scope for ElementRef<'_> {
    fn first<'a>(&'a self, selector: &Selector) -> Option<ElementRef<'a>> {
        self.select(selector).next()
    }
}

fn parse_selector(selector: &str) -> Option<Selector> {
    match Selector::parse(selector) {
        Ok(parsed) => Some(parsed),
        Err(e) => {
            debug!(selector, error = %e, "Selector does not parse; treating as no match");
            None
        }
    }
}

/// Trimmed text content of the first node matching `selector`.
pub fn extract_text<S: Scope>(scope: &S, selector: &str) -> Option<String> {
    let selector = parse_selector(selector)?;
    let node = scope.first(&selector)?;
    Some(node.text().collect::<String>().trim().to_string())
}

/// Raw value of attribute `attr` on the first node matching `selector`.
pub fn extract_attribute<S: Scope>(scope: &S, selector: &str, attr: &str) -> Option<String> {
    let selector = parse_selector(selector)?;
    let node = scope.first(&selector)?;
    node.value().attr(attr).map(str::to_string)
}

/// Whether `link` already carries an `http`/`https` scheme.
///
/// The scheme is matched case-insensitively and must be followed by `://`,
/// so `HTTP://x` is absolute while `httpfoo` is a relative path.
pub fn is_absolute(link: &str) -> bool {
    let lower = link.get(..8).unwrap_or(link).to_ascii_lowercase();
    lower.starts_with("http://") || lower.starts_with("https://")
}

/// Make `link` absolute by prefixing `base_url` when it has no scheme.
///
/// This is plain concatenation, not RFC 3986 resolution: `base_url` is
/// expected to be written so that appending a site-relative path yields the
/// right URL.
pub fn resolve_link(base_url: &str, link: &str) -> String {
    if is_absolute(link) {
        link.to_string()
    } else {
        format!("{base_url}{link}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAGE: &str = r#"
        <html><body>
            <h1>  Headline here
            </h1>
            <div class="byline"><span>By</span> <span>Jane Roe</span></div>
            <img class="lead" src="/img/lead.jpg">
            <img class="nosrc">
            <ul>
                <li class="item"><a href="/one">One</a></li>
                <li class="item"><a href="/two">Two</a></li>
            </ul>
        </body></html>
    "#;

    #[test]
    fn test_extract_text_trims_whitespace() {
        let doc = Html::parse_document(PAGE);
        assert_eq!(extract_text(&doc, "h1").as_deref(), Some("Headline here"));
        assert_eq!(extract_text(&doc, ".byline").as_deref(), Some("By Jane Roe"));
    }

    #[test]
    fn test_extract_text_takes_first_match() {
        let doc = Html::parse_document(PAGE);
        assert_eq!(extract_text(&doc, "li.item a").as_deref(), Some("One"));
    }

    #[test]
    fn test_extract_attribute() {
        let doc = Html::parse_document(PAGE);
        assert_eq!(
            extract_attribute(&doc, "img.lead", "src").as_deref(),
            Some("/img/lead.jpg")
        );
        assert_eq!(extract_attribute(&doc, "img.nosrc", "src"), None);
    }

    #[test]
    fn test_absent_values_never_error() {
        let doc = Html::parse_document(PAGE);
        let empty = Html::parse_document("");
        for scope in [&doc, &empty] {
            assert_eq!(extract_text(scope, ".missing"), None);
            assert_eq!(extract_attribute(scope, ".missing", "src"), None);
            assert_eq!(extract_text(scope, "h1[unclosed"), None);
            assert_eq!(extract_attribute(scope, ":::", "href"), None);
        }
    }

    #[test]
    fn test_extract_within_element_scope() {
        let doc = Html::parse_document(PAGE);
        let items = Selector::parse("li.item").unwrap();
        let second = doc.select(&items).nth(1).unwrap();
        assert_eq!(extract_attribute(&second, "a", "href").as_deref(), Some("/two"));
        assert_eq!(extract_text(&second, "img"), None);
    }

    #[test]
    fn test_resolve_relative_link() {
        assert_eq!(
            resolve_link("https://example.com", "/news/1"),
            "https://example.com/news/1"
        );
        assert_eq!(
            resolve_link("https://example.com/", "story.html"),
            "https://example.com/story.html"
        );
    }

    #[test]
    fn test_absolute_link_passes_through() {
        for link in [
            "https://other.example/a",
            "http://other.example/b",
            "HTTPS://Other.example/c",
        ] {
            assert_eq!(resolve_link("https://example.com", link), link);
        }
    }

    #[test]
    fn test_bare_http_prefix_is_relative() {
        assert!(!is_absolute("httpfoo/bar"));
        assert_eq!(
            resolve_link("https://example.com/", "httpfoo/bar"),
            "https://example.com/httpfoo/bar"
        );
    }
}
