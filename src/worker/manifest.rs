//! App-shell manifest: the assets that must be available offline.

use crate::shared::config::{EngineConfig, DEFAULT_CACHE_GENERATION};
use reqwest::Url;
use serde::{Deserialize, Serialize};

/// Fixed asset list of the app shell
pub const SHELL_ASSETS: &[&str] = &[
    "/",
    "/dashboard",
    "/records",
    "/static/css/app.css",
    "/static/js/app.js",
    "/static/js/offline-queue.js",
    "/static/manifest.webmanifest",
    "/static/icons/icon-192.png",
    "/static/icons/icon-512.png",
];

/// Document served to navigations when neither network nor cache has the page
pub const OFFLINE_DOCUMENT: &str = "/dashboard";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheManifest {
    /// Cache generation name; bump to replace the whole shell
    pub generation: String,
    /// Origin-relative asset paths
    pub assets: Vec<String>,
    /// Origin-relative fallback document
    pub offline_document: String,
}

impl Default for CacheManifest {
    fn default() -> Self {
        Self {
            generation: DEFAULT_CACHE_GENERATION.to_string(),
            assets: SHELL_ASSETS.iter().map(|s| s.to_string()).collect(),
            offline_document: OFFLINE_DOCUMENT.to_string(),
        }
    }
}

impl CacheManifest {
    pub fn from_config(config: &EngineConfig) -> Self {
        Self {
            generation: config.cache_generation.clone(),
            ..Self::default()
        }
    }

    /// Whether an origin-relative path is part of the shell
    pub fn contains(&self, path: &str) -> bool {
        self.assets.iter().any(|asset| asset == path)
    }

    /// Absolute URLs of all assets
    pub fn asset_urls(&self, origin: &Url) -> Vec<(String, Url)> {
        self.assets
            .iter()
            .filter_map(|asset| origin.join(asset).ok().map(|url| (asset.clone(), url)))
            .collect()
    }
}
