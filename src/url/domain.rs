use url::Url;

/// Extracts the lowercase host of a URL
///
/// # Examples
///
/// ```
/// use url::Url;
/// use doc_harvester::url::extract_domain;
///
/// let url = Url::parse("https://EXAMPLE.COM/path").unwrap();
/// assert_eq!(extract_domain(&url), Some("example.com".to_string()));
/// ```
pub fn extract_domain(url: &Url) -> Option<String> {
    url.host_str().map(|h| h.to_lowercase())
}

/// Host plus explicit port, the unit a crawl is confined to
pub fn site_authority(url: &Url) -> Option<String> {
    let host = extract_domain(url)?;
    Some(match url.port() {
        Some(port) => format!("{}:{}", host, port),
        None => host,
    })
}

/// True when both URLs live on the same host and port
pub fn same_site(a: &Url, b: &Url) -> bool {
    match (site_authority(a), site_authority(b)) {
        (Some(x), Some(y)) => x == y,
        _ => false,
    }
}

/// Directory name used for a site's downloads
///
/// ```
/// use url::Url;
/// use doc_harvester::url::host_dir_name;
///
/// let url = Url::parse("http://127.0.0.1:8080/a.pdf").unwrap();
/// assert_eq!(host_dir_name(&url), "127.0.0.1_8080");
/// ```
pub fn host_dir_name(url: &Url) -> String {
    site_authority(url)
        .unwrap_or_else(|| "unknown".to_string())
        .replace(':', "_")
}
