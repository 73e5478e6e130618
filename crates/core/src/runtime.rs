//! Runtime-cache qualification.
//!
//! Decides whether a live response may be written into the open generation.
//! Cross-origin and non-GET requests never qualify.

use regex::Regex;
use url::Url;

use crate::Error;
use crate::keys;
use crate::manifest::Manifest;
use crate::network::Request;

/// File extensions treated as static assets.
pub const STATIC_EXTENSIONS: &[&str] = &[
    "css", "js", "mjs", "json", "png", "jpg", "jpeg", "gif", "svg", "webp", "avif", "ico", "woff", "woff2", "ttf",
    "otf",
];

/// Whether the last path segment carries a static-asset extension.
pub fn has_static_extension(path: &str) -> bool {
    let segment = path.rsplit('/').next().unwrap_or(path);
    match segment.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() => STATIC_EXTENSIONS.iter().any(|e| e.eq_ignore_ascii_case(ext)),
        _ => false,
    }
}

/// Whether a normalized key falls under one of the normalized prefixes.
pub fn matches_prefix(prefixes: &[String], key: &str) -> bool {
    prefixes.iter().any(|prefix| key.starts_with(prefix.as_str()))
}

/// Runtime-cache rules compiled from a manifest.
#[derive(Debug, Clone)]
pub struct RuntimeRules {
    scope: Url,
    prefixes: Vec<String>,
    patterns: Vec<Regex>,
}

impl RuntimeRules {
    /// Normalize prefixes and compile patterns.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidManifest` if a runtime-cache pattern is invalid.
    pub fn from_manifest(manifest: &Manifest, scope: &Url) -> Result<Self, Error> {
        let prefixes = manifest
            .dynamic_prefixes
            .iter()
            .filter_map(|prefix| match keys::normalize_key(scope, prefix) {
                Ok(key) => Some(key),
                Err(e) => {
                    tracing::debug!(prefix = %prefix, error = %e, "ignoring unresolvable dynamic prefix");
                    None
                }
            })
            .collect();

        Ok(Self { scope: scope.clone(), prefixes, patterns: manifest.runtime_patterns()? })
    }

    /// Same-origin GET. Anything stored by the engine must pass this.
    pub fn is_storable(&self, request: &Request) -> bool {
        request.is_get() && keys::same_origin(&self.scope, &request.url)
    }

    /// Full qualification for opportunistic caching.
    pub fn qualifies(&self, request: &Request) -> bool {
        if !self.is_storable(request) {
            return false;
        }

        let key = keys::cache_key(&self.scope, &request.url);
        matches_prefix(&self.prefixes, &key)
            || has_static_extension(request.url.path())
            || self.patterns.iter().any(|p| p.is_match(request.url.as_str()))
    }

    pub fn prefixes(&self) -> &[String] {
        &self.prefixes
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scope() -> Url {
        keys::canonicalize_scope("https://example.com/").unwrap()
    }

    fn rules(json: &str) -> RuntimeRules {
        RuntimeRules::from_manifest(&Manifest::from_slice(json.as_bytes()).unwrap(), &scope()).unwrap()
    }

    fn get(url: &str) -> Request {
        Request::get(Url::parse(url).unwrap())
    }

    #[test]
    fn test_static_extensions() {
        assert!(has_static_extension("/style.css"));
        assert!(has_static_extension("/img/logo.PNG"));
        assert!(has_static_extension("/fonts/inter.woff2"));
        assert!(!has_static_extension("/index.html"));
        assert!(!has_static_extension("/api/readings"));
        assert!(!has_static_extension("/.css"));
        assert!(!has_static_extension("/dir.js/page"));
    }

    #[test]
    fn test_prefix_predicate() {
        let prefixes = vec!["./data/".to_string()];
        assert!(matches_prefix(&prefixes, "./data/today.txt"));
        assert!(!matches_prefix(&prefixes, "./database"));
        assert!(!matches_prefix(&[], "./data/today.txt"));
    }

    #[test]
    fn test_dynamic_prefixes_are_normalized() {
        let rules = rules(r#"{"cacheVersion":"v1","dynamicPrefixes":["/data/","./reports/","logs/"]}"#);
        assert_eq!(rules.prefixes(), &["./data/", "./reports/", "./logs/"]);
        assert!(rules.qualifies(&get("https://example.com/data/today?x=1")));
        assert!(rules.qualifies(&get("https://example.com/logs/bp")));
        assert!(!rules.qualifies(&get("https://example.com/other/today")));
    }

    #[test]
    fn test_static_asset_qualifies_without_prefix() {
        let rules = rules(r#"{"cacheVersion":"v1"}"#);
        assert!(rules.qualifies(&get("https://example.com/uv.js")));
        assert!(!rules.qualifies(&get("https://example.com/meal.html")));
    }

    #[test]
    fn test_runtime_pattern_qualifies() {
        let rules = rules(r#"{"cacheVersion":"v1","runtimeCache":[{"pattern":"/icons/.*\\.ico$|manifest\\.webmanifest$"}]}"#);
        assert!(rules.qualifies(&get("https://example.com/manifest.webmanifest")));
    }

    #[test]
    fn test_cross_origin_never_qualifies() {
        let rules = rules(r#"{"cacheVersion":"v1","dynamicPrefixes":["/"],"runtimeCache":[{"pattern":".*"}]}"#);
        let request = get("https://api.open-meteo.test/v1/forecast.json");
        assert!(!rules.is_storable(&request));
        assert!(!rules.qualifies(&request));
    }

    #[test]
    fn test_non_get_never_qualifies() {
        let rules = rules(r#"{"cacheVersion":"v1"}"#);
        let request = get("https://example.com/app.js").with_method("POST");
        assert!(!rules.is_storable(&request));
        assert!(!rules.qualifies(&request));
    }
}
