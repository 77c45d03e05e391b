//! URL canonicalization and origin helpers for request classification.

use url::Url;

/// Error type for URL canonicalization failures.
#[derive(Debug, Clone, thiserror::Error)]
pub enum UrlError {
    #[error("empty URL")]
    Empty,

    #[error("unsupported scheme: {0}")]
    UnsupportedScheme(String),

    #[error("invalid URL: {0}")]
    InvalidUrl(String),

    #[error("cannot resolve {path} against {base}: {reason}")]
    Unresolvable { base: String, path: String, reason: String },
}

/// Canonicalize a URL string so equal requests produce equal cache keys.
///
/// Whitespace is trimmed, a missing scheme defaults to https, the host is
/// lowercased and the fragment dropped. The query string is kept as given.
pub fn canonicalize(input: &str) -> Result<Url, UrlError> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(UrlError::Empty);
    }

    let raw = if trimmed.contains("://") { trimmed.to_string() } else { format!("https://{trimmed}") };
    let mut parsed = Url::parse(&raw).map_err(|e| UrlError::InvalidUrl(e.to_string()))?;
    check_scheme(&parsed)?;

    if let Some(host) = parsed.host_str().map(str::to_lowercase) {
        parsed
            .set_host(Some(&host))
            .map_err(|e| UrlError::InvalidUrl(e.to_string()))?;
    }
    parsed.set_fragment(None);

    Ok(parsed)
}

fn check_scheme(url: &Url) -> Result<(), UrlError> {
    match url.scheme() {
        "http" | "https" => Ok(()),
        scheme => Err(UrlError::UnsupportedScheme(scheme.to_string())),
    }
}

/// Whether `a` and `b` share scheme, host and port.
pub fn same_origin(a: &Url, b: &Url) -> bool {
    a.origin() == b.origin()
}

/// Resolve pre-cache manifest entries (`./`, `./index.html`, ...) against the
/// application base URL.
pub fn resolve_manifest(base: &str, entries: &[String]) -> Result<Vec<Url>, UrlError> {
    let base_url = canonicalize(base)?;

    entries
        .iter()
        .map(|entry| {
            let mut resolved = base_url.join(entry.trim()).map_err(|e| UrlError::Unresolvable {
                base: base.to_string(),
                path: entry.clone(),
                reason: e.to_string(),
            })?;
            check_scheme(&resolved)?;
            resolved.set_fragment(None);
            Ok(resolved)
        })
        .collect()
}
