//! Layered configuration: CLI flag > env var > `motif.toml` > built-in default.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::error::{Result, ScanError};

/// Scan quality tier, resolved into a [`QualityPlan`] by [`QualityPlan::for_quality`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Quality {
    /// Static fetch only, no layout profiling, no enrichment.
    Fast,
    /// Static fetch, layout profiling enabled, no enrichment.
    Standard,
    /// Computed-style fetch, layout profiling, enrichment enabled.
    Premium,
}

impl Default for Quality {
    fn default() -> Self {
        Quality::Standard
    }
}

/// Which phases a given [`Quality`] tier enables. Resolves the "quality
/// modes differ in which phases they enable" open question (SPEC_FULL.md §6).
#[derive(Debug, Clone, Copy)]
pub struct QualityPlan {
    /// Whether to use the computed-style fetch mode rather than static.
    pub computed_fetch: bool,
    /// Whether to run the layout profiler.
    pub profile_layout: bool,
    /// Whether to run the enrichment plugin after consensus.
    pub enrich: bool,
}

impl QualityPlan {
    /// Resolves the phase plan for a quality tier.
    pub fn for_quality(quality: Quality) -> Self {
        match quality {
            Quality::Fast => QualityPlan {
                computed_fetch: false,
                profile_layout: false,
                enrich: false,
            },
            Quality::Standard => QualityPlan {
                computed_fetch: false,
                profile_layout: true,
                enrich: false,
            },
            Quality::Premium => QualityPlan {
                computed_fetch: true,
                profile_layout: true,
                enrich: true,
            },
        }
    }
}

/// Process-wide configuration, assembled from environment variables with a
/// `motif.toml` fallback file.
#[derive(Debug, Clone)]
pub struct Config {
    /// Path (or `sqlite::memory:`-style marker) to the relational store.
    pub database_url: String,
    /// Days a `CssContent` row may go unreferenced before [`sweep`](crate::store) may delete it.
    pub css_ttl_days: u32,
    /// Global cap on concurrently running scans.
    pub max_concurrent_scans: usize,
    /// Global cap on concurrently in-flight fetches across all scans.
    pub max_concurrent_fetches: usize,
    /// Per-scan fan-out cap for concurrent stylesheet fetches.
    pub scan_slot_fetch_fanout: usize,
    /// User-Agent header sent with every fetch.
    pub fetch_user_agent: String,
    /// A prior completed scan younger than this is served without reprocessing.
    pub revalidate_after: Duration,
    /// A prior completed scan older than this forces a fresh scan regardless.
    pub hard_expiry: Duration,
    /// Per-scan memory ceiling for decompressed CSS, in bytes.
    pub memory_ceiling_bytes: usize,
    /// Address the HTTP API binds to.
    pub http_bind: String,
}

#[derive(Debug, Default, Deserialize)]
struct FileConfig {
    database_url: Option<String>,
    css_ttl_days: Option<u32>,
    max_concurrent_scans: Option<usize>,
    max_concurrent_fetches: Option<usize>,
    scan_slot_fetch_fanout: Option<usize>,
    fetch_user_agent: Option<String>,
    revalidate_after_ms: Option<u64>,
    hard_expiry_ms: Option<u64>,
    memory_ceiling_mb: Option<usize>,
    http_bind: Option<String>,
}

impl Config {
    /// Builds configuration from `motif.toml` (if present at `config_path`)
    /// layered under environment variables, which always win.
    pub fn load(config_path: Option<&Path>) -> Result<Self> {
        let file = match config_path {
            Some(path) if path.exists() => {
                let text = std::fs::read_to_string(path)?;
                toml::from_str(&text)
                    .map_err(|e| ScanError::Internal(format!("invalid {}: {e}", path.display())))?
            }
            _ => FileConfig::default(),
        };

        let database_url = std::env::var("DATABASE_URL")
            .ok()
            .or(file.database_url)
            .ok_or_else(|| ScanError::BadRequest("DATABASE_URL is required".into()))?;

        let fetch_user_agent = std::env::var("FETCH_USER_AGENT")
            .ok()
            .or(file.fetch_user_agent)
            .ok_or_else(|| ScanError::BadRequest("FETCH_USER_AGENT is required".into()))?;

        Ok(Config {
            database_url,
            css_ttl_days: env_or("CSS_TTL_DAYS", file.css_ttl_days, 30),
            max_concurrent_scans: env_or("MAX_CONCURRENT_SCANS", file.max_concurrent_scans, 16),
            max_concurrent_fetches: file.max_concurrent_fetches.unwrap_or(64),
            scan_slot_fetch_fanout: file.scan_slot_fetch_fanout.unwrap_or(8),
            fetch_user_agent,
            revalidate_after: Duration::from_millis(env_or(
                "REVALIDATE_AFTER_MS",
                file.revalidate_after_ms,
                900_000,
            )),
            hard_expiry: Duration::from_millis(env_or("HARD_EXPIRY_MS", file.hard_expiry_ms, 86_400_000)),
            memory_ceiling_bytes: file.memory_ceiling_mb.unwrap_or(256) * 1024 * 1024,
            http_bind: file.http_bind.unwrap_or_else(|| "127.0.0.1:4180".to_string()),
        })
    }

    /// Default `motif.toml` location under the platform config directory.
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("motif").join("motif.toml"))
    }
}

fn env_or<T: std::str::FromStr>(key: &str, file_value: Option<T>, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .or(file_value)
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quality_plan_monotonically_increases_work() {
        let fast = QualityPlan::for_quality(Quality::Fast);
        let standard = QualityPlan::for_quality(Quality::Standard);
        let premium = QualityPlan::for_quality(Quality::Premium);
        assert!(!fast.profile_layout && standard.profile_layout);
        assert!(!standard.enrich && premium.enrich);
        assert!(!standard.computed_fetch && premium.computed_fetch);
    }

    #[test]
    fn load_requires_database_url() {
        std::env::remove_var("DATABASE_URL");
        std::env::remove_var("FETCH_USER_AGENT");
        let result = Config::load(None);
        assert!(result.is_err());
    }
}
