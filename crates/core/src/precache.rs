//! Precache set computation.

use std::collections::HashSet;

use url::Url;

use crate::keys;
use crate::manifest::Manifest;

/// One asset to fetch and store at install time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrecacheAsset {
    /// Normalized cache key.
    pub key: String,
    /// Absolute URL to fetch.
    pub url: Url,
}

/// Derive the assets to precache from a manifest.
///
/// Pure function of its inputs. The result is the union of `core`, the
/// `path` and `assets` of every enabled module, every route target, the
/// offline fallback page and the manifest URL, deduplicated by normalized
/// key. Order is stable: core first, then modules and routes in key order,
/// then fallback and manifest. Entries that cannot be resolved are skipped.
pub fn compute_asset_set(manifest: &Manifest, manifest_url: &Url, scope: &Url) -> Vec<PrecacheAsset> {
    let modules = manifest
        .enabled_modules()
        .flat_map(|(_, module)| module.path.iter().chain(module.assets.iter()));

    let candidates = manifest
        .core
        .iter()
        .chain(modules)
        .chain(manifest.routes.values())
        .chain(manifest.offline_fallback_path.iter())
        .map(String::as_str)
        .chain(std::iter::once(manifest_url.as_str()));

    let mut seen = HashSet::new();
    let mut assets = Vec::new();

    for candidate in candidates {
        let url = match keys::resolve(scope, candidate) {
            Ok(url) => url,
            Err(e) => {
                tracing::debug!(entry = candidate, error = %e, "skipping unresolvable precache entry");
                continue;
            }
        };
        let key = keys::cache_key(scope, &url);
        if seen.insert(key.clone()) {
            assets.push(PrecacheAsset { key, url });
        }
    }

    assets
}
