//! HTML parser for extracting links and metadata
//!
//! This module handles parsing HTML content to extract:
//! - Links with their anchor text
//! - Page title and published time (meta tags, then JSON-LD)
//! - Visible page text, used for keyword relevance
//! - `<loc>` entries of a sitemap

use crate::url::resolve_link;
use regex::Regex;
use scraper::{Html, Node, Selector};
use std::collections::HashSet;
use std::sync::OnceLock;
use url::Url;

/// Meta tags consulted for a published time, in priority order
const PUBLISHED_META: &[&str] = &[
    "meta[property='article:published_time']",
    "meta[name='pubdate']",
    "meta[name='publishdate']",
    "meta[name='date']",
    "meta[property='og:updated_time']",
    "meta[name='dc.date']",
];

/// JSON-LD keys consulted for a published time, in priority order
const JSON_LD_DATE_KEYS: &[&str] = &["datePublished", "dateCreated", "dateModified"];

/// Elements whose text never counts as page content
const HIDDEN_ELEMENTS: &[&str] = &["script", "style", "noscript", "template"];

/// A link found on a page
#[derive(Debug, Clone, PartialEq)]
pub struct PageLink {
    /// Absolute, normalized URL
    pub url: Url,
    /// Whitespace-collapsed anchor text
    pub anchor_text: String,
}

/// Extracted information from an HTML page
#[derive(Debug, Clone, Default)]
pub struct ParsedPage {
    pub title: Option<String>,
    pub published_time: Option<String>,
    /// Visible text, whitespace-collapsed
    pub text: String,
    /// Links in document order, first occurrence of each URL only
    pub links: Vec<PageLink>,
}

/// Parses HTML content and extracts links and metadata
///
/// **Excluded links:** `javascript:`, `mailto:`, `tel:`, data URIs,
/// same-page anchors and anything that is not http(s).
///
/// # Example
///
/// ```
/// use doc_harvester::crawler::parse_page;
/// use url::Url;
///
/// let html = r#"<html><head><title>Test</title></head><body><a href="/report.pdf">Annual report</a></body></html>"#;
/// let base_url = Url::parse("https://example.com/").unwrap();
/// let parsed = parse_page(html, &base_url);
/// assert_eq!(parsed.title, Some("Test".to_string()));
/// assert_eq!(parsed.links[0].anchor_text, "Annual report");
/// ```
pub fn parse_page(html: &str, base_url: &Url) -> ParsedPage {
    let document = Html::parse_document(html);

    ParsedPage {
        links: extract_links(&document, base_url),
        ..parse_document(&document)
    }
}

/// Title, published time and visible text of a document, without links
pub fn parse_text(html: &str) -> ParsedPage {
    parse_document(&Html::parse_document(html))
}

fn parse_document(document: &Html) -> ParsedPage {
    ParsedPage {
        title: extract_title(document),
        published_time: extract_published_time(document),
        text: extract_text(document),
        links: Vec::new(),
    }
}

/// Extracts `<loc>` URLs from a sitemap document
pub fn parse_sitemap(xml: &str) -> Vec<String> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    let Some(re) = RE
        .get_or_init(|| Regex::new(r"(?is)<loc>\s*(.*?)\s*</loc>").ok())
        .as_ref()
    else {
        return Vec::new();
    };

    re.captures_iter(xml)
        .filter_map(|caps| caps.get(1))
        .map(|m| m.as_str().replace("&amp;", "&"))
        .filter(|loc| !loc.is_empty())
        .collect()
}

/// Extracts the page title from the HTML document
fn extract_title(document: &Html) -> Option<String> {
    let title_selector = Selector::parse("title").ok()?;

    document
        .select(&title_selector)
        .next()
        .map(|element| collapse_whitespace(&element.text().collect::<String>()))
        .filter(|s| !s.is_empty())
}

fn extract_published_time(document: &Html) -> Option<String> {
    for selector in PUBLISHED_META {
        let Ok(selector) = Selector::parse(selector) else {
            continue;
        };
        let found = document
            .select(&selector)
            .filter_map(|el| el.value().attr("content"))
            .map(str::trim)
            .find(|v| !v.is_empty());
        if let Some(value) = found {
            return Some(value.to_string());
        }
    }

    let selector = Selector::parse("script[type='application/ld+json']").ok()?;
    for script in document.select(&selector) {
        let raw = script.text().collect::<String>();
        let Ok(data) = serde_json::from_str::<serde_json::Value>(raw.trim()) else {
            continue;
        };
        let candidates = match data {
            serde_json::Value::Array(items) => items,
            other => vec![other],
        };
        for item in &candidates {
            for key in JSON_LD_DATE_KEYS {
                if let Some(value) = item.get(key).and_then(|v| v.as_str()) {
                    if !value.trim().is_empty() {
                        return Some(value.trim().to_string());
                    }
                }
            }
        }
    }

    None
}

fn extract_text(document: &Html) -> String {
    let mut chunks = Vec::new();
    for node in document.root_element().descendants() {
        let Node::Text(text) = node.value() else {
            continue;
        };
        let hidden = node
            .parent()
            .and_then(|p| p.value().as_element().map(|e| e.name().to_string()))
            .map(|name| HIDDEN_ELEMENTS.contains(&name.as_str()))
            .unwrap_or(false);
        if !hidden {
            chunks.push(&**text);
        }
    }
    collapse_whitespace(&chunks.join(" "))
}

/// Extracts all valid links from the HTML document
fn extract_links(document: &Html, base_url: &Url) -> Vec<PageLink> {
    let mut links = Vec::new();
    let mut seen = HashSet::new();

    if let Ok(a_selector) = Selector::parse("a[href]") {
        for element in document.select(&a_selector) {
            let Some(href) = element.value().attr("href") else {
                continue;
            };
            let Some(url) = resolve_link(href, base_url) else {
                continue;
            };
            if seen.insert(url.to_string()) {
                links.push(PageLink {
                    url,
                    anchor_text: collapse_whitespace(&element.text().collect::<Vec<_>>().join(" ")),
                });
            }
        }
    }

    links
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}
