//! CLI argument parsing with clap

use clap::Parser;
use regprune_core::config::{
    DEFAULT_CACHE_EXPIRY_DAYS, DEFAULT_JITTER_DAYS, DEFAULT_KEEP_COUNT, DEFAULT_SAVE_INTERVAL,
};
use regprune_core::{Result, RunConfig};
use std::path::PathBuf;

/// regprune - keep the newest N builds per image, delete the rest
#[derive(Parser, Debug)]
#[command(name = "regprune")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Registry base URL (e.g., https://registry.example.com)
    #[arg(long, env = "REGISTRY_URL")]
    pub registry_url: Option<String>,

    /// HTTP basic auth username
    #[arg(long, env = "DOCKER_USERNAME")]
    pub username: Option<String>,

    /// HTTP basic auth password
    #[arg(long, env = "DOCKER_PASSWORD", hide_env_values = true)]
    pub password: Option<String>,

    /// Number of retention units (tags, or build groups with --group) to
    /// keep per image
    #[arg(long = "keep", env = "NOF_TAGS_TO_KEEP", default_value_t = DEFAULT_KEEP_COUNT)]
    pub keep_count: usize,

    /// Group tags sharing a creation minute into one retention unit
    /// (pass `--group false` to rank tags individually)
    #[arg(long, env = "GROUP_TAGS", default_value_t = true, action = clap::ArgAction::Set)]
    pub group: bool,

    /// Compute and report the plan without deleting anything
    #[arg(long, env = "DRY_RUN")]
    pub dry_run: bool,

    /// Location of the tag metadata cache (default: ~/.regprune/tag_cache.json)
    #[arg(long)]
    pub cache_path: Option<PathBuf>,

    /// Base cache expiry window in days
    #[arg(long, default_value_t = DEFAULT_CACHE_EXPIRY_DAYS)]
    pub cache_expiry_days: i64,

    /// Minimum random days added to the expiry window each run
    #[arg(long, default_value_t = DEFAULT_JITTER_DAYS.0)]
    pub cache_jitter_min: i64,

    /// Maximum random days added to the expiry window each run
    #[arg(long, default_value_t = DEFAULT_JITTER_DAYS.1)]
    pub cache_jitter_max: i64,

    /// Save the cache after this many freshly resolved tags
    #[arg(long, default_value_t = DEFAULT_SAVE_INTERVAL)]
    pub save_interval: usize,

    /// Increase verbosity (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress output
    #[arg(short, long, global = true)]
    pub quiet: bool,
}

impl Cli {
    /// Validate and convert the parsed arguments into a run configuration
    pub fn into_config(self) -> Result<RunConfig> {
        RunConfig::new(
            self.registry_url,
            self.username,
            self.password,
            self.keep_count,
            self.group,
            self.dry_run,
            self.cache_path,
            self.cache_expiry_days,
            (self.cache_jitter_min, self.cache_jitter_max),
            self.save_interval,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("regprune").chain(args.iter().copied())).unwrap()
    }

    #[test]
    #[serial]
    fn test_defaults() {
        std::env::remove_var("REGISTRY_URL");
        std::env::remove_var("NOF_TAGS_TO_KEEP");
        std::env::remove_var("GROUP_TAGS");
        std::env::remove_var("DRY_RUN");

        let cli = parse(&["--registry-url", "https://r.example.com"]);
        assert_eq!(cli.keep_count, 3);
        assert!(cli.group);
        assert!(!cli.dry_run);
        assert_eq!(cli.cache_expiry_days, 14);
        assert_eq!((cli.cache_jitter_min, cli.cache_jitter_max), (1, 5));
        assert_eq!(cli.save_interval, 20);

        let config = cli.into_config().unwrap();
        assert_eq!(config.registry_url, "https://r.example.com");
    }

    #[test]
    #[serial]
    fn test_missing_registry_url_fails_config() {
        std::env::remove_var("REGISTRY_URL");
        let cli = parse(&[]);
        assert!(cli.into_config().is_err());
    }

    #[test]
    #[serial]
    fn test_env_fallbacks() {
        std::env::set_var("REGISTRY_URL", "https://env.example.com");
        std::env::set_var("NOF_TAGS_TO_KEEP", "5");
        std::env::set_var("GROUP_TAGS", "false");
        std::env::set_var("DRY_RUN", "true");

        let cli = parse(&[]);
        assert_eq!(cli.registry_url.as_deref(), Some("https://env.example.com"));
        assert_eq!(cli.keep_count, 5);
        assert!(!cli.group);
        assert!(cli.dry_run);

        std::env::remove_var("REGISTRY_URL");
        std::env::remove_var("NOF_TAGS_TO_KEEP");
        std::env::remove_var("GROUP_TAGS");
        std::env::remove_var("DRY_RUN");
    }

    #[test]
    #[serial]
    fn test_flags_override_env() {
        std::env::set_var("NOF_TAGS_TO_KEEP", "5");

        let cli = parse(&[
            "--registry-url",
            "https://r.example.com",
            "--keep",
            "7",
            "--group",
            "false",
            "--dry-run",
        ]);
        assert_eq!(cli.keep_count, 7);
        assert!(!cli.group);
        assert!(cli.dry_run);

        std::env::remove_var("NOF_TAGS_TO_KEEP");
    }
}
