//! Run configuration for a cleanup pass

use crate::error::{Error, Result};
use std::path::PathBuf;

/// Default number of retention units to keep per image
pub const DEFAULT_KEEP_COUNT: usize = 3;

/// Default base cache expiry window in days
pub const DEFAULT_CACHE_EXPIRY_DAYS: i64 = 14;

/// Default jitter added to the expiry window, in days (inclusive range)
pub const DEFAULT_JITTER_DAYS: (i64, i64) = (1, 5);

/// Default number of freshly resolved tags between periodic cache saves
pub const DEFAULT_SAVE_INTERVAL: usize = 20;

/// Cache file name under the regprune data directory
const CACHE_FILE_NAME: &str = "tag_cache.json";

/// Configuration for one cleanup run
#[derive(Debug, Clone)]
pub struct RunConfig {
    /// Registry base URL (e.g., "https://registry.example.com")
    pub registry_url: String,
    /// HTTP basic auth username
    pub username: Option<String>,
    /// HTTP basic auth password
    pub password: Option<String>,
    /// Number of retention units (tags or build groups) to keep per image
    pub keep_count: usize,
    /// Group tags sharing a creation minute into one retention unit
    pub group_by_build_time: bool,
    /// Compute and report the plan without deleting anything
    pub dry_run: bool,
    /// Location of the persisted tag-metadata cache
    pub cache_path: PathBuf,
    /// Base cache expiry window in days
    pub cache_expiry_days: i64,
    /// Inclusive range of per-run random days added to the expiry window
    pub jitter_days: (i64, i64),
    /// Save the cache after this many freshly resolved tags
    pub save_interval: usize,
}

impl RunConfig {
    /// Build a config, applying defaults and validating required values.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        registry_url: Option<String>,
        username: Option<String>,
        password: Option<String>,
        keep_count: usize,
        group_by_build_time: bool,
        dry_run: bool,
        cache_path: Option<PathBuf>,
        cache_expiry_days: i64,
        jitter_days: (i64, i64),
        save_interval: usize,
    ) -> Result<Self> {
        let registry_url = registry_url
            .filter(|u| !u.trim().is_empty())
            .ok_or_else(|| Error::missing_config("REGISTRY_URL"))?;

        if cache_expiry_days < 0 {
            return Err(Error::invalid_config(format!(
                "cache expiry days must be non-negative, got {}",
                cache_expiry_days
            )));
        }
        if jitter_days.0 > jitter_days.1 || jitter_days.0 < 0 {
            return Err(Error::invalid_config(format!(
                "jitter range must be a non-negative min..max, got {}..{}",
                jitter_days.0, jitter_days.1
            )));
        }
        if save_interval == 0 {
            return Err(Error::invalid_config(
                "save interval must be at least 1 tag",
            ));
        }

        Ok(Self {
            registry_url: registry_url.trim_end_matches('/').to_string(),
            username,
            password,
            keep_count,
            group_by_build_time,
            dry_run,
            cache_path: cache_path.unwrap_or_else(default_cache_path),
            cache_expiry_days,
            jitter_days,
            save_interval,
        })
    }

    /// Whether basic auth credentials are usable (both parts present)
    pub fn auth(&self) -> Option<(&str, &str)> {
        match (self.username.as_deref(), self.password.as_deref()) {
            (Some(u), Some(p)) => Some((u, p)),
            _ => None,
        }
    }
}

/// Default cache location: `~/.regprune/tag_cache.json`, falling back to the
/// system temp directory when no home directory is available.
pub fn default_cache_path() -> PathBuf {
    match dirs::home_dir() {
        Some(home) => home.join(".regprune").join(CACHE_FILE_NAME),
        None => std::env::temp_dir().join(format!("regprune_{}", CACHE_FILE_NAME)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn minimal(url: Option<&str>) -> Result<RunConfig> {
        RunConfig::new(
            url.map(String::from),
            None,
            None,
            DEFAULT_KEEP_COUNT,
            true,
            false,
            None,
            DEFAULT_CACHE_EXPIRY_DAYS,
            DEFAULT_JITTER_DAYS,
            DEFAULT_SAVE_INTERVAL,
        )
    }

    #[test]
    fn test_missing_registry_url_is_fatal() {
        assert!(matches!(
            minimal(None),
            Err(Error::MissingConfig { ref name }) if name == "REGISTRY_URL"
        ));
        assert!(matches!(minimal(Some("  ")), Err(Error::MissingConfig { .. })));
    }

    #[test]
    fn test_defaults_applied() {
        let config = minimal(Some("https://registry.example.com/")).unwrap();
        assert_eq!(config.registry_url, "https://registry.example.com");
        assert_eq!(config.keep_count, 3);
        assert_eq!(config.cache_expiry_days, 14);
        assert_eq!(config.jitter_days, (1, 5));
        assert_eq!(config.save_interval, 20);
        assert!(config.cache_path.ends_with("tag_cache.json"));
    }

    #[test]
    fn test_auth_requires_both_parts() {
        let mut config = minimal(Some("https://r.example.com")).unwrap();
        assert!(config.auth().is_none());

        config.username = Some("user".into());
        assert!(config.auth().is_none());

        config.password = Some("secret".into());
        assert_eq!(config.auth(), Some(("user", "secret")));
    }

    #[test]
    fn test_invalid_ranges_rejected() {
        let bad_jitter = RunConfig::new(
            Some("https://r".into()),
            None,
            None,
            3,
            true,
            false,
            None,
            14,
            (5, 1),
            20,
        );
        assert!(matches!(bad_jitter, Err(Error::InvalidConfig { .. })));

        let bad_interval = RunConfig::new(
            Some("https://r".into()),
            None,
            None,
            3,
            true,
            false,
            None,
            14,
            (1, 5),
            0,
        );
        assert!(matches!(bad_interval, Err(Error::InvalidConfig { .. })));
    }
}
