//! On-disk TOML configuration.
//!
//! A partial config in the working directory (`.citecheck.toml`) cascades
//! over the platform config file, which cascades over built-in defaults.
//! Every field is optional so a two-line config is valid.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::markers::SourceMarkers;
use crate::Config;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConfigFile {
    pub api: Option<ApiConfig>,
    pub sources: Option<SourcesConfig>,
    pub concurrency: Option<ConcurrencyConfig>,
    pub cache: Option<CacheConfig>,
    /// Marker keyword overrides; when a list is present it *replaces* the
    /// built-in list rather than extending it.
    pub markers: Option<MarkersConfig>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ApiConfig {
    /// Email for the CrossRef polite pool.
    pub crossref_mailto: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SourcesConfig {
    /// Registry names to skip entirely.
    pub disabled: Option<Vec<String>>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConcurrencyConfig {
    pub num_workers: Option<usize>,
    pub source_timeout_secs: Option<u64>,
    pub max_retries: Option<u32>,
    pub per_source_concurrency: Option<usize>,
    pub document_timeout_secs: Option<u64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CacheConfig {
    pub path: Option<String>,
    pub positive_ttl_secs: Option<u64>,
    pub negative_ttl_secs: Option<u64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MarkersConfig {
    pub grey_literature: Option<Vec<String>>,
    pub book_or_software: Option<Vec<String>>,
    pub low_quality: Option<Vec<String>>,
}

/// Platform config path: `<config_dir>/citecheck/config.toml`.
pub fn config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("citecheck").join("config.toml"))
}

/// Load config by cascading CWD `.citecheck.toml` over the platform file.
pub fn load_config() -> ConfigFile {
    let platform = config_path().and_then(|p| load_from_path(&p));
    let cwd = load_from_path(Path::new(".citecheck.toml"));

    match (platform, cwd) {
        (None, None) => ConfigFile::default(),
        (Some(p), None) => p,
        (None, Some(c)) => c,
        (Some(p), Some(c)) => merge(p, c),
    }
}

/// Load from a specific path. `None` when the file is absent or unparseable.
pub fn load_from_path(path: &Path) -> Option<ConfigFile> {
    let content = std::fs::read_to_string(path).ok()?;
    match toml::from_str(&content) {
        Ok(parsed) => Some(parsed),
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "ignoring malformed config file");
            None
        }
    }
}

/// Merge two configs; `overlay` values win field by field.
pub fn merge(base: ConfigFile, overlay: ConfigFile) -> ConfigFile {
    fn pick<T: Clone, S>(
        overlay: &Option<S>,
        base: &Option<S>,
        get: impl Fn(&S) -> Option<T>,
    ) -> Option<T> {
        overlay
            .as_ref()
            .and_then(&get)
            .or_else(|| base.as_ref().and_then(&get))
    }

    ConfigFile {
        api: Some(ApiConfig {
            crossref_mailto: pick(&overlay.api, &base.api, |a| a.crossref_mailto.clone()),
        }),
        sources: Some(SourcesConfig {
            disabled: pick(&overlay.sources, &base.sources, |s| s.disabled.clone()),
        }),
        concurrency: Some(ConcurrencyConfig {
            num_workers: pick(&overlay.concurrency, &base.concurrency, |c| c.num_workers),
            source_timeout_secs: pick(&overlay.concurrency, &base.concurrency, |c| {
                c.source_timeout_secs
            }),
            max_retries: pick(&overlay.concurrency, &base.concurrency, |c| c.max_retries),
            per_source_concurrency: pick(&overlay.concurrency, &base.concurrency, |c| {
                c.per_source_concurrency
            }),
            document_timeout_secs: pick(&overlay.concurrency, &base.concurrency, |c| {
                c.document_timeout_secs
            }),
        }),
        cache: Some(CacheConfig {
            path: pick(&overlay.cache, &base.cache, |c| c.path.clone()),
            positive_ttl_secs: pick(&overlay.cache, &base.cache, |c| c.positive_ttl_secs),
            negative_ttl_secs: pick(&overlay.cache, &base.cache, |c| c.negative_ttl_secs),
        }),
        markers: Some(MarkersConfig {
            grey_literature: pick(&overlay.markers, &base.markers, |m| {
                m.grey_literature.clone()
            }),
            book_or_software: pick(&overlay.markers, &base.markers, |m| {
                m.book_or_software.clone()
            }),
            low_quality: pick(&overlay.markers, &base.markers, |m| m.low_quality.clone()),
        }),
    }
}

impl ConfigFile {
    /// Apply file values over a base runtime [`Config`].
    pub fn apply_to(&self, mut config: Config) -> Config {
        if let Some(ref api) = self.api
            && api.crossref_mailto.is_some()
        {
            config.crossref_mailto = api.crossref_mailto.clone();
        }
        if let Some(ref sources) = self.sources
            && let Some(ref disabled) = sources.disabled
        {
            config.disabled_sources = disabled.clone();
        }
        if let Some(ref c) = self.concurrency {
            if let Some(n) = c.num_workers {
                config.num_workers = n;
            }
            if let Some(t) = c.source_timeout_secs {
                config.source_timeout_secs = t;
            }
            if let Some(r) = c.max_retries {
                config.max_retries = r;
            }
            if let Some(p) = c.per_source_concurrency {
                config.per_source_concurrency = p;
            }
            if c.document_timeout_secs.is_some() {
                config.document_timeout_secs = c.document_timeout_secs;
            }
        }
        if let Some(ref cache) = self.cache {
            if let Some(ref path) = cache.path {
                config.cache_path = Some(PathBuf::from(path));
            }
            if let Some(ttl) = cache.positive_ttl_secs {
                config.cache_positive_ttl_secs = ttl;
            }
            if let Some(ttl) = cache.negative_ttl_secs {
                config.cache_negative_ttl_secs = ttl;
            }
        }
        if let Some(ref markers) = self.markers {
            let defaults = SourceMarkers::default();
            config.markers = Arc::new(SourceMarkers {
                grey_literature: markers
                    .grey_literature
                    .clone()
                    .unwrap_or(defaults.grey_literature),
                book_or_software: markers
                    .book_or_software
                    .clone()
                    .unwrap_or(defaults.book_or_software),
                low_quality: markers.low_quality.clone().unwrap_or(defaults.low_quality),
            });
        }
        config
    }
}
