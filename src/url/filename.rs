//! Filename resolution for downloaded documents

use regex::Regex;
use std::path::Path;
use std::sync::OnceLock;
use url::Url;

fn disposition_regex() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r#"(?i)filename\*?=(?:UTF-8'')?"?([^";]+)"?"#).ok())
        .as_ref()
}

fn unsafe_chars_regex() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r#"[<>:"/\\|?*\x00-\x1f]+"#).ok())
        .as_ref()
}

/// Last path segment of a URL, percent-decoded
pub fn filename_from_url(url: &Url) -> Option<String> {
    let segment = url.path_segments()?.filter(|s| !s.is_empty()).last()?;
    let decoded = percent_decode(segment);
    if decoded.trim().is_empty() {
        None
    } else {
        Some(decoded)
    }
}

/// Filename announced by a `Content-Disposition` header
pub fn filename_from_content_disposition(header: &str) -> Option<String> {
    disposition_regex()?
        .captures(header)
        .and_then(|caps| caps.get(1))
        .map(|m| percent_decode(m.as_str().trim()))
        .filter(|name| !name.is_empty())
}

/// Lower-cased extension with a leading dot, if the name has one
pub fn extension_of(name: &str) -> Option<String> {
    Path::new(name)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| format!(".{}", e.to_lowercase()))
}

/// Makes a server-provided name safe to use as a local filename
///
/// Path separators and reserved characters become `_`, whitespace runs
/// collapse to one space, and `fallback_ext` is appended when the name has
/// no extension of its own.
pub fn sanitize_filename(name: &str, fallback_ext: Option<&str>) -> String {
    let base = name.rsplit(['/', '\\']).next().unwrap_or(name);
    let replaced = match unsafe_chars_regex() {
        Some(re) => re.replace_all(base, "_").into_owned(),
        None => base.to_string(),
    };
    let mut clean = replaced.split_whitespace().collect::<Vec<_>>().join(" ");
    clean = clean.trim_matches(|c| c == '.' || c == ' ').to_string();

    if clean.is_empty() {
        clean = "download".to_string();
    }

    if extension_of(&clean).is_none() {
        if let Some(ext) = fallback_ext {
            clean.push_str(ext);
        }
    }

    clean
}

/// Picks a path inside `dir` that does not exist yet, adding `_N` suffixes
pub fn unique_path(dir: &Path, filename: &str) -> std::path::PathBuf {
    let candidate = dir.join(filename);
    if !candidate.exists() {
        return candidate;
    }

    let path = Path::new(filename);
    let stem = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or(filename);
    let ext = path.extension().and_then(|e| e.to_str());

    let mut n = 1;
    loop {
        let name = match ext {
            Some(ext) => format!("{}_{}.{}", stem, n, ext),
            None => format!("{}_{}", stem, n),
        };
        let candidate = dir.join(name);
        if !candidate.exists() {
            return candidate;
        }
        n += 1;
    }
}

fn percent_decode(s: &str) -> String {
    let escaped = s.replace('+', "%2B").replace('&', "%26");
    url::form_urlencoded::parse(format!("x={}", escaped).as_bytes())
        .next()
        .map(|(_, v)| v.into_owned())
        .unwrap_or_else(|| s.to_string())
}
