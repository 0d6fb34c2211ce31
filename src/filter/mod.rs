//! Admission filter
//!
//! Pure decisions over a URL or filename and a site's [`SiteRule`]: whether a
//! file may be stored, and whether a page may be followed. Nothing here does
//! I/O, so every rule is testable offline.
//!
//! Exclusion is evaluated against the URL path (never the host, so a site
//! called `example.com` does not trip an `exam` exclusion) and against the
//! basename. The crawler runs the file check twice: once on the link before
//! downloading and once on the final URL and resolved filename afterwards.

use crate::config::SiteRule;
use crate::url::extension_of;
use std::fmt;
use url::Url;

/// Outcome of an admission decision
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Admission {
    Accept,
    Reject(RejectReason),
}

impl Admission {
    pub fn is_accept(&self) -> bool {
        matches!(self, Self::Accept)
    }
}

/// Why a candidate was turned away
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RejectReason {
    /// An exclude-keyword occurs in the path or filename
    ExcludedKeyword(String),
    /// The basename starts with an excluded prefix
    ExcludedPrefix(String),
    /// The extension is not in the site's allowed set
    DisallowedExtension(Option<String>),
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ExcludedKeyword(k) => write!(f, "matched exclude keyword '{}'", k),
            Self::ExcludedPrefix(p) => write!(f, "matched exclude prefix '{}'", p),
            Self::DisallowedExtension(Some(ext)) => write!(f, "extension {} not allowed", ext),
            Self::DisallowedExtension(None) => write!(f, "no file extension"),
        }
    }
}

/// Decides whether a file may be stored for this site
///
/// `candidate` is either an absolute URL or a bare filename. Exclusions are
/// checked first, then the extension.
///
/// ```
/// use doc_harvester::config::{DefaultsConfig, SiteEntry, SiteRule};
/// use doc_harvester::filter::{admit, Admission, RejectReason};
///
/// let mut defaults = DefaultsConfig::default();
/// defaults.exclude_keywords = vec!["exam".to_string()];
/// let site = SiteEntry { name: "s".into(), url: "https://example.com/".into(), ..Default::default() };
/// let rule = SiteRule::resolve(&site, &defaults);
///
/// assert_eq!(admit("https://example.com/docs/report.pdf", &rule), Admission::Accept);
/// assert_eq!(
///     admit("exam_2024.pdf", &rule),
///     Admission::Reject(RejectReason::ExcludedKeyword("exam".into()))
/// );
/// ```
pub fn admit(candidate: &str, rule: &SiteRule) -> Admission {
    if let Some(reason) = check_exclusion(candidate, rule) {
        return Admission::Reject(reason);
    }

    let name = basename(candidate);
    match extension_of(&name) {
        Some(ext) if rule.file_exts.contains(&ext) => Admission::Accept,
        other => Admission::Reject(RejectReason::DisallowedExtension(other)),
    }
}

/// Checks exclude-keywords and exclude-prefixes only
///
/// Used on its own for pages, and for the post-download filename check.
pub fn check_exclusion(candidate: &str, rule: &SiteRule) -> Option<RejectReason> {
    let haystack = match Url::parse(candidate) {
        Ok(url) if url.has_host() => path_text(&url),
        _ => candidate.to_lowercase(),
    };

    if let Some(keyword) = rule
        .exclude_keywords
        .iter()
        .find(|k| haystack.contains(k.as_str()))
    {
        return Some(RejectReason::ExcludedKeyword(keyword.clone()));
    }

    let name = basename(candidate).to_lowercase();
    rule.exclude_prefixes
        .iter()
        .find(|p| name.starts_with(p.as_str()))
        .map(|p| RejectReason::ExcludedPrefix(p.clone()))
}

/// True when the URL path ends in one of the site's file extensions
pub fn is_file_candidate(url: &Url, rule: &SiteRule) -> bool {
    let path = url.path().to_lowercase();
    rule.file_exts.iter().any(|ext| path.ends_with(ext.as_str()))
}

/// Page-level relevance: any include-keyword in the page text
///
/// Always true for sites without include-keywords.
pub fn page_is_relevant(page_text: &str, rule: &SiteRule) -> bool {
    if !rule.filters_by_keyword() {
        return true;
    }
    let text = page_text.to_lowercase();
    rule.keywords.iter().any(|k| text.contains(k.as_str()))
}

/// True when the link URL, its basename or its anchor text names a keyword
pub fn link_matches_keywords(url: &Url, anchor_text: &str, rule: &SiteRule) -> bool {
    if !rule.filters_by_keyword() {
        return true;
    }
    let hay = format!(
        "{} {} {}",
        url.as_str(),
        basename(url.as_str()),
        anchor_text
    )
    .to_lowercase();
    rule.keywords.iter().any(|k| hay.contains(k.as_str()))
}

/// Keyword admission for a file link found on a page
pub fn file_link_wanted(
    url: &Url,
    anchor_text: &str,
    page_relevant: bool,
    rule: &SiteRule,
) -> bool {
    page_relevant || link_matches_keywords(url, anchor_text, rule)
}

/// Decides whether a discovered page link goes onto the frontier
///
/// Excluded pages are never followed. Otherwise the page is followed when
/// keyword filtering is off, when the linking page was relevant, or when
/// the link itself names a keyword.
pub fn follow_page(url: &Url, anchor_text: &str, page_relevant: bool, rule: &SiteRule) -> bool {
    if check_exclusion(url.as_str(), rule).is_some() {
        return false;
    }
    !rule.filters_by_keyword() || page_relevant || link_matches_keywords(url, anchor_text, rule)
}

fn path_text(url: &Url) -> String {
    let mut text = url.path().to_string();
    if let Some(query) = url.query() {
        text.push('?');
        text.push_str(query);
    }
    let escaped = text.replace('+', "%2B").replace('&', "%26");
    let decoded = url::form_urlencoded::parse(format!("p={}", escaped).as_bytes())
        .next()
        .map(|(_, v)| v.into_owned())
        .unwrap_or(text);
    decoded.to_lowercase()
}

fn basename(candidate: &str) -> String {
    match Url::parse(candidate) {
        Ok(url) if url.has_host() => crate::url::filename_from_url(&url).unwrap_or_default(),
        _ => candidate
            .rsplit(['/', '\\'])
            .next()
            .unwrap_or(candidate)
            .to_string(),
    }
}
