//! Selector helpers shared by the scraped sources.
//!
//! `scraper` has no equivalent of jQuery-style `:contains()`, so text matching
//! is done with [`select_containing`] after a plain CSS selection.

use scraper::{ElementRef, Html, Selector};
use url::Url;

use crate::error::{Result, SourceError};

pub fn selector(css: &str) -> Selector {
    Selector::parse(css).expect("valid CSS selector")
}

pub fn parse(body: &str) -> Html {
    Html::parse_document(body)
}

pub fn select_first<'a>(root: ElementRef<'a>, css: &str) -> Option<ElementRef<'a>> {
    root.select(&selector(css)).next()
}

/// Like [`select_first`] but a missing match is a [`SourceError::NotFound`].
pub fn require<'a>(root: ElementRef<'a>, css: &str) -> Result<ElementRef<'a>> {
    select_first(root, css).ok_or_else(|| SourceError::not_found(format!("`{css}`")))
}

pub fn select_all<'a>(root: ElementRef<'a>, css: &str) -> Vec<ElementRef<'a>> {
    root.select(&selector(css)).collect()
}

/// Elements matching `css` whose text contains `needle`, ignoring case.
pub fn select_containing<'a>(root: ElementRef<'a>, css: &str, needle: &str) -> Vec<ElementRef<'a>> {
    let needle = needle.to_lowercase();
    root.select(&selector(css))
        .filter(|el| text(*el).to_lowercase().contains(&needle))
        .collect()
}

/// Text of the element and its descendants with whitespace collapsed.
pub fn text(el: ElementRef<'_>) -> String {
    normalize_ws(&el.text().collect::<String>())
}

/// Text of the element's direct text children only.
pub fn own_text(el: ElementRef<'_>) -> String {
    let raw: String = el
        .children()
        .filter_map(|node| node.value().as_text())
        .map(|t| t.to_string())
        .collect();
    normalize_ws(&raw)
}

/// Raw, unnormalized text content; use for `<script>` bodies.
pub fn data(el: ElementRef<'_>) -> String {
    el.text().collect()
}

pub fn each_text(elements: &[ElementRef<'_>]) -> Vec<String> {
    elements
        .iter()
        .map(|el| text(*el))
        .filter(|t| !t.is_empty())
        .collect()
}

pub fn attr<'a>(el: ElementRef<'a>, name: &str) -> Option<&'a str> {
    el.value()
        .attr(name)
        .map(str::trim)
        .filter(|value| !value.is_empty())
}

/// Attribute resolved against `base`, like jsoup's `abs:` prefix.
pub fn abs_attr(el: ElementRef<'_>, name: &str, base: &str) -> Option<String> {
    attr(el, name).and_then(|value| abs_url(base, value))
}

pub fn abs_url(base: &str, href: &str) -> Option<String> {
    let href = href.trim();
    if href.is_empty() {
        return None;
    }
    if href.starts_with("//") {
        return Some(format!("https:{href}"));
    }
    match Url::parse(base) {
        Ok(base) => base.join(href).ok().map(|u| u.to_string()),
        Err(_) => Some(href.to_string()),
    }
}

/// Strips scheme and host, keeping path, query and fragment.
pub fn url_without_domain(url: &str) -> String {
    match Url::parse(url.trim()) {
        Ok(parsed) => {
            let mut out = parsed.path().to_string();
            if let Some(query) = parsed.query() {
                out.push('?');
                out.push_str(query);
            }
            if let Some(fragment) = parsed.fragment() {
                out.push('#');
                out.push_str(fragment);
            }
            out
        }
        Err(_) => url.trim().to_string(),
    }
}

/// Lazy-loading aware image lookup: `data-src`, `data-lazy-src`, first
/// `srcset` candidate, then `src`.
pub fn image_url(el: ElementRef<'_>, base: &str) -> Option<String> {
    if let Some(url) = attr(el, "data-src") {
        return abs_url(base, url);
    }
    if let Some(url) = attr(el, "data-lazy-src") {
        return abs_url(base, url);
    }
    if let Some(srcset) = attr(el, "srcset") {
        let first = srcset.split_whitespace().next().unwrap_or_default();
        return abs_url(base, first);
    }
    abs_attr(el, "src", base)
}

fn normalize_ws(value: &str) -> String {
    value.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    const BASE: &str = "https://example.org/anime/";

    #[test]
    fn image_url_prefers_lazy_attributes() {
        let doc = parse(
            r#"<img id="a" data-src="/a.jpg" src="/placeholder.gif">
               <img id="b" data-lazy-src="b.jpg">
               <img id="c" srcset="//cdn.example.org/c.jpg 1x, /c2.jpg 2x" src="/x.jpg">
               <img id="d" src="/d.jpg">"#,
        );
        let root = doc.root_element();
        let url = |id: &str| image_url(select_first(root, &format!("#{id}")).unwrap(), BASE);
        assert_eq!(url("a").as_deref(), Some("https://example.org/a.jpg"));
        assert_eq!(url("b").as_deref(), Some("https://example.org/anime/b.jpg"));
        assert_eq!(url("c").as_deref(), Some("https://cdn.example.org/c.jpg"));
        assert_eq!(url("d").as_deref(), Some("https://example.org/d.jpg"));
    }

    #[test]
    fn own_text_skips_children() {
        let doc = parse(r#"<div class="tt">  Title <b>badge</b> here </div>"#);
        let el = select_first(doc.root_element(), "div.tt").unwrap();
        assert_eq!(own_text(el), "Title here");
        assert_eq!(text(el), "Title badge here");
    }

    #[test]
    fn select_containing_is_case_insensitive() {
        let doc = parse(
            r#"<ul><li><b>Status:</b> Ongoing</li><li><b>Studio:</b> Foo</li></ul>"#,
        );
        let found = select_containing(doc.root_element(), "li", "status");
        assert_eq!(found.len(), 1);
        assert_eq!(own_text(found[0]), "Ongoing");
    }

    #[test]
    fn url_without_domain_keeps_query() {
        assert_eq!(
            url_without_domain("https://tenshi.moe/anime/abc?s=srt-d"),
            "/anime/abc?s=srt-d"
        );
        assert_eq!(url_without_domain("/already/relative"), "/already/relative");
    }

    #[test]
    fn require_reports_selector() {
        let doc = parse("<p></p>");
        let err = require(doc.root_element(), "div.missing").unwrap_err();
        assert!(err.to_string().contains("div.missing"));
    }
}
