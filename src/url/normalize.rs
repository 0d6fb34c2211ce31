use crate::UrlError;
use url::Url;

/// Query parameters that never identify a document
const TRACKING_PARAMS: &[&str] = &["fbclid", "gclid", "mc_eid", "mc_cid", "_ga"];

/// Normalizes a URL into the key used for visited sets and file dedup
///
/// # Normalization Steps
///
/// 1. Parse the URL; reject if malformed or not http(s)
/// 2. Lowercase the host (done by the parser) and drop default ports
/// 3. Collapse repeated slashes and dot segments in the path
/// 4. Remove the fragment
/// 5. Remove tracking query parameters and sort what remains
///
/// The scheme and a trailing slash are kept: sites serve different
/// documents for `/reports` and `/reports/` often enough that folding them
/// would lose files.
///
/// # Examples
///
/// ```
/// use doc_harvester::url::normalize_url;
///
/// let url = normalize_url("https://Example.COM/docs//a.pdf?utm_source=x#p2").unwrap();
/// assert_eq!(url.as_str(), "https://example.com/docs/a.pdf");
/// ```
pub fn normalize_url(url_str: &str) -> Result<Url, UrlError> {
    let mut url = Url::parse(url_str.trim()).map_err(|e| UrlError::Parse(e.to_string()))?;

    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(UrlError::InvalidScheme(format!(
            "Only HTTP and HTTPS schemes are supported, got: {}",
            url.scheme()
        )));
    }

    if url.host_str().is_none() {
        return Err(UrlError::MissingDomain);
    }

    let path = collapse_slashes(url.path());
    url.set_path(&path);
    url.set_fragment(None);

    if url.query().is_some() {
        let params = filter_and_sort_query_params(&url);
        if params.is_empty() {
            url.set_query(None);
        } else {
            url.query_pairs_mut().clear().extend_pairs(params);
        }
    }

    Ok(url)
}

/// Resolves an href against the page it appeared on
///
/// Returns None for links that can never be fetched: script, mail, phone
/// and data links, same-page anchors and anything that is not http(s).
pub fn resolve_link(href: &str, base_url: &Url) -> Option<Url> {
    let href = href.trim();

    if href.is_empty() || href.starts_with('#') {
        return None;
    }

    let lower = href.to_ascii_lowercase();
    if ["javascript:", "mailto:", "tel:", "data:"]
        .iter()
        .any(|scheme| lower.starts_with(scheme))
    {
        return None;
    }

    let joined = base_url.join(href).ok()?;
    normalize_url(joined.as_str()).ok()
}

fn collapse_slashes(path: &str) -> String {
    if path.is_empty() {
        return "/".to_string();
    }

    let mut out = String::with_capacity(path.len());
    let mut previous_slash = false;
    for c in path.chars() {
        if c == '/' {
            if previous_slash {
                continue;
            }
            previous_slash = true;
        } else {
            previous_slash = false;
        }
        out.push(c);
    }
    out
}

fn filter_and_sort_query_params(url: &Url) -> Vec<(String, String)> {
    let mut params: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(key, _)| !is_tracking_param(key))
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();

    params.sort();
    params
}

fn is_tracking_param(key: &str) -> bool {
    key.starts_with("utm_") || TRACKING_PARAMS.contains(&key)
}
