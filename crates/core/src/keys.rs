//! Scope resolution and cache-key normalization.
//!
//! Every place that compares cache keys goes through [`cache_key`], so a
//! resource is stored and matched under a single key no matter how the
//! manifest or the request spelled it.
//!
//! ### Key form
//! - Same-origin URLs inside the scope: `./<path relative to scope>[?query]`
//! - Anything else: the absolute URL
//! - Fragments are always dropped

use url::{ParseError, Url};

/// Error type for scope and key resolution failures.
#[derive(Debug, Clone, thiserror::Error)]
pub enum KeyError {
    #[error("empty URL")]
    Empty,

    #[error("unsupported scheme: {0}")]
    UnsupportedScheme(String),

    #[error("invalid URL: {0}")]
    InvalidUrl(String),
}

impl From<KeyError> for crate::Error {
    fn from(err: KeyError) -> Self {
        crate::Error::InvalidUrl(err.to_string())
    }
}

/// Canonicalize the worker scope URL.
///
/// Normalization steps:
/// 1. Trim leading/trailing whitespace
/// 2. Require an http(s) scheme
/// 3. Lowercase the host
/// 4. Remove query and fragment
/// 5. Ensure the path ends with `/`
pub fn canonicalize_scope(input: &str) -> Result<Url, KeyError> {
    let trimmed = input.trim();

    if trimmed.is_empty() {
        return Err(KeyError::Empty);
    }

    let mut parsed = Url::parse(trimmed).map_err(|e| KeyError::InvalidUrl(e.to_string()))?;

    match parsed.scheme() {
        "http" | "https" => {}
        scheme => return Err(KeyError::UnsupportedScheme(scheme.to_string())),
    }

    if let Some(host) = parsed.host_str() {
        let host = host.to_lowercase();
        parsed.set_host(Some(&host)).map_err(|e| KeyError::InvalidUrl(e.to_string()))?;
    }

    parsed.set_query(None);
    parsed.set_fragment(None);

    if !parsed.path().ends_with('/') {
        let path = format!("{}/", parsed.path());
        parsed.set_path(&path);
    }

    Ok(parsed)
}

/// Resolve a manifest path or absolute URL against the scope.
///
/// Root-relative paths (`/foo`) are treated as scope-relative, so a manifest
/// written for an origin root keeps working when the app is served from a
/// sub-path. Protocol-relative inputs (`//host/path`) keep their host.
pub fn resolve(scope: &Url, input: &str) -> Result<Url, KeyError> {
    let trimmed = input.trim();

    if trimmed.is_empty() {
        return Err(KeyError::Empty);
    }

    let mut resolved = match Url::parse(trimmed) {
        Ok(url) => url,
        Err(ParseError::RelativeUrlWithoutBase) => {
            let relative = if trimmed.starts_with("//") {
                trimmed
            } else {
                trimmed.strip_prefix("./").or_else(|| trimmed.strip_prefix('/')).unwrap_or(trimmed)
            };
            scope.join(relative).map_err(|e| KeyError::InvalidUrl(e.to_string()))?
        }
        Err(e) => return Err(KeyError::InvalidUrl(e.to_string())),
    };

    match resolved.scheme() {
        "http" | "https" => {}
        scheme => return Err(KeyError::UnsupportedScheme(scheme.to_string())),
    }

    resolved.set_fragment(None);

    Ok(resolved)
}

/// Compute the cache key for an already-resolved URL.
pub fn cache_key(scope: &Url, url: &Url) -> String {
    if same_origin(scope, url)
        && let Some(rest) = url.path().strip_prefix(scope.path())
    {
        return match url.query() {
            Some(query) => format!("./{rest}?{query}"),
            None => format!("./{rest}"),
        };
    }

    let mut absolute = url.clone();
    absolute.set_fragment(None);
    absolute.to_string()
}

/// Resolve and normalize in one step.
pub fn normalize_key(scope: &Url, input: &str) -> Result<String, KeyError> {
    let url = resolve(scope, input)?;
    Ok(cache_key(scope, &url))
}

/// The key with any query string removed, used for query-insensitive matching.
pub fn base_key(key: &str) -> &str {
    key.split_once('?').map_or(key, |(base, _)| base)
}

/// Whether `url` shares the scope's origin (scheme, host and port).
pub fn same_origin(scope: &Url, url: &Url) -> bool {
    scope.origin() == url.origin()
}

/// Whether `url` is same-origin and under the scope path.
pub fn in_scope(scope: &Url, url: &Url) -> bool {
    same_origin(scope, url) && url.path().starts_with(scope.path())
}
