//! Persisted tag-metadata cache
//!
//! One JSON snapshot file maps `"<image>:<tag>"` keys to cached creation
//! metadata. The cache is loaded once at process start, pruned with a
//! jittered cutoff, mutated during resolution, and saved periodically plus
//! once at run end. Load and save are best-effort: a broken or unwritable
//! cache degrades the run, it never fails it.

use crate::types::{TagKey, TagMetadata};
use anyhow::{Context, Result};
use chrono::{DateTime, Duration, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// On-disk form of one cache entry. `cached_at` is optional here so that a
/// hand-edited or partially written file does not poison the whole load;
/// entries without it are treated as already expired and dropped.
#[derive(Debug, Serialize, Deserialize)]
struct PersistedEntry {
    #[serde(default)]
    digest: Option<String>,
    #[serde(default)]
    created: Option<DateTime<Utc>>,
    #[serde(default)]
    cached_at: Option<DateTime<Utc>>,
}

/// In-memory tag-metadata cache bound to its snapshot file
#[derive(Debug)]
pub struct TagCache {
    path: PathBuf,
    entries: HashMap<TagKey, TagMetadata>,
}

impl TagCache {
    /// Load the cache from `path`. A missing file yields an empty cache;
    /// a corrupt one logs a warning and also yields an empty cache.
    pub fn load(path: impl Into<PathBuf>) -> Self {
        let path = path.into();

        if !path.exists() {
            debug!("No tag cache at {}, starting empty", path.display());
            return Self {
                path,
                entries: HashMap::new(),
            };
        }

        let entries = match Self::read_snapshot(&path) {
            Ok(entries) => {
                debug!("Loaded tag cache with {} entries", entries.len());
                entries
            }
            Err(e) => {
                warn!("Failed to load tag cache from {}: {e}", path.display());
                HashMap::new()
            }
        };

        Self { path, entries }
    }

    fn read_snapshot(path: &Path) -> Result<HashMap<TagKey, TagMetadata>> {
        let content = fs::read_to_string(path).context("Failed to read cache file")?;
        let raw: BTreeMap<String, PersistedEntry> =
            serde_json::from_str(&content).context("Failed to parse cache file")?;

        let mut entries = HashMap::with_capacity(raw.len());
        for (key, entry) in raw {
            let Some(key) = TagKey::from_cache_key(&key) else {
                warn!("Dropping cache entry with malformed key {key:?}");
                continue;
            };
            // No cached_at means we cannot age the entry: treat as expired.
            let Some(cached_at) = entry.cached_at else {
                continue;
            };
            entries.insert(
                key,
                TagMetadata {
                    digest: entry.digest,
                    created: entry.created,
                    cached_at,
                },
            );
        }
        Ok(entries)
    }

    /// Drop entries older than `now - (base_expiry_days + jitter_days)`.
    /// Returns the number of entries removed.
    ///
    /// The jitter is drawn once per run (see [`draw_jitter`]) and passed in,
    /// so a fleet of scheduled runs does not invalidate in lockstep and tests
    /// can pin the cutoff exactly.
    pub fn prune(&mut self, now: DateTime<Utc>, base_expiry_days: i64, jitter_days: i64) -> usize {
        let cutoff = now - Duration::days(base_expiry_days + jitter_days);
        let before = self.entries.len();
        self.entries.retain(|_, meta| meta.cached_at >= cutoff);
        let removed = before - self.entries.len();
        debug!(
            "Pruned tag cache: {removed} expired, {} remain",
            self.entries.len()
        );
        removed
    }

    pub fn get(&self, key: &TagKey) -> Option<&TagMetadata> {
        self.entries.get(key)
    }

    pub fn insert(&mut self, key: TagKey, metadata: TagMetadata) {
        self.entries.insert(key, metadata);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Write the full snapshot, replacing the previous one atomically
    /// (temp file + rename). Callers treat failure as a warning.
    pub fn save(&self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).context("Failed to create cache directory")?;
        }

        let snapshot: BTreeMap<String, PersistedEntry> = self
            .entries
            .iter()
            .map(|(key, meta)| {
                (
                    key.to_string(),
                    PersistedEntry {
                        digest: meta.digest.clone(),
                        created: meta.created,
                        cached_at: Some(meta.cached_at),
                    },
                )
            })
            .collect();

        let json =
            serde_json::to_string_pretty(&snapshot).context("Failed to serialize tag cache")?;

        let temp_path = self.path.with_extension("json.tmp");
        fs::write(&temp_path, json).context("Failed to write temp cache file")?;
        fs::rename(&temp_path, &self.path).context("Failed to replace cache file")?;

        debug!(
            "Saved tag cache ({} entries) to {}",
            self.entries.len(),
            self.path.display()
        );
        Ok(())
    }
}

/// Draw the per-run expiry jitter from an inclusive day range.
///
/// A reversed range is a caller bug; [`RunConfig::new`](crate::RunConfig::new)
/// rejects one before it can reach this point.
pub fn draw_jitter(range: (i64, i64)) -> i64 {
    debug_assert!(range.0 <= range.1, "jitter range is reversed: {range:?}");
    rand::rng().random_range(range.0..=range.1)
}

/// Counts freshly resolved tags between periodic cache saves.
///
/// A resolution served from the cache does not count toward the interval;
/// only fresh registry round-trips do.
#[derive(Debug)]
pub struct SaveScheduler {
    interval: usize,
    fresh: usize,
}

impl SaveScheduler {
    pub fn new(interval: usize) -> Self {
        Self { interval, fresh: 0 }
    }

    /// Record one fresh resolution. Returns `true` when a save is due,
    /// resetting the counter for the next interval.
    pub fn record_fresh(&mut self) -> bool {
        self.fresh += 1;
        if self.fresh >= self.interval {
            self.fresh = 0;
            true
        } else {
            false
        }
    }

    /// Fresh resolutions recorded since the last due save.
    pub fn pending(&self) -> usize {
        self.fresh
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use tempfile::TempDir;

    fn cache_in(dir: &TempDir) -> TagCache {
        TagCache::load(dir.path().join("tag_cache.json"))
    }

    fn ts(day: u32, hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, day, hour, 0, 0).unwrap()
    }

    #[test]
    fn test_load_missing_file_is_empty() {
        let dir = TempDir::new().unwrap();
        let cache = cache_in(&dir);
        assert!(cache.is_empty());
    }

    #[test]
    fn test_load_corrupt_file_is_empty() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("tag_cache.json");
        fs::write(&path, "{not json").unwrap();

        let cache = TagCache::load(&path);
        assert!(cache.is_empty());
    }

    #[test]
    fn test_save_load_round_trip() {
        let dir = TempDir::new().unwrap();
        let now = ts(10, 12);
        let created = ts(1, 9);

        let mut cache = cache_in(&dir);
        cache.insert(
            TagKey::new("team/app", "v1"),
            TagMetadata::resolved("sha256:abc", created, now),
        );
        cache.insert(
            TagKey::new("team/app", "broken"),
            TagMetadata::unresolvable(now),
        );
        cache.save().unwrap();

        let reloaded = TagCache::load(cache.path());
        assert_eq!(reloaded.len(), 2);

        let ok = reloaded.get(&TagKey::new("team/app", "v1")).unwrap();
        assert_eq!(ok.digest.as_deref(), Some("sha256:abc"));
        assert_eq!(ok.created, Some(created));
        assert_eq!(ok.cached_at, now);

        let bad = reloaded.get(&TagKey::new("team/app", "broken")).unwrap();
        assert!(bad.digest.is_none());
        assert!(bad.created.is_none());
    }

    #[test]
    fn test_load_drops_entries_without_cached_at() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("tag_cache.json");
        fs::write(
            &path,
            r#"{
                "team/app:v1": {"digest": "sha256:abc", "created": "2024-05-01T09:00:00Z", "cached_at": "2024-05-10T12:00:00Z"},
                "team/app:v2": {"digest": "sha256:def", "created": "2024-05-02T09:00:00Z"}
            }"#,
        )
        .unwrap();

        let cache = TagCache::load(&path);
        assert_eq!(cache.len(), 1);
        assert!(cache.get(&TagKey::new("team/app", "v1")).is_some());
        assert!(cache.get(&TagKey::new("team/app", "v2")).is_none());
    }

    #[test]
    fn test_prune_cutoff_exact_with_pinned_jitter() {
        let dir = TempDir::new().unwrap();
        let now = Utc.with_ymd_and_hms(2024, 5, 20, 0, 0, 0).unwrap();

        let mut cache = cache_in(&dir);
        // 14 + 2 days of window: cutoff is 2024-05-04T00:00:00Z.
        cache.insert(
            TagKey::new("app", "at-cutoff"),
            TagMetadata::resolved("sha256:a", ts(1, 0), Utc.with_ymd_and_hms(2024, 5, 4, 0, 0, 0).unwrap()),
        );
        cache.insert(
            TagKey::new("app", "stale"),
            TagMetadata::resolved("sha256:b", ts(1, 0), Utc.with_ymd_and_hms(2024, 5, 3, 23, 59, 59).unwrap()),
        );
        cache.insert(
            TagKey::new("app", "fresh"),
            TagMetadata::resolved("sha256:c", ts(1, 0), ts(19, 0)),
        );

        let removed = cache.prune(now, 14, 2);
        assert_eq!(removed, 1);
        assert!(cache.get(&TagKey::new("app", "at-cutoff")).is_some());
        assert!(cache.get(&TagKey::new("app", "stale")).is_none());
        assert!(cache.get(&TagKey::new("app", "fresh")).is_some());
    }

    #[test]
    fn test_prune_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let now = Utc.with_ymd_and_hms(2024, 5, 20, 0, 0, 0).unwrap();

        let mut cache = cache_in(&dir);
        for i in 1..=10 {
            cache.insert(
                TagKey::new("app", format!("v{i}")),
                TagMetadata::resolved(format!("sha256:{i}"), ts(1, 0), ts(i as u32, 0)),
            );
        }

        let removed_first = cache.prune(now, 14, 2);
        let after_first = cache.len();
        let removed_second = cache.prune(now, 14, 2);

        assert!(removed_first > 0);
        assert_eq!(removed_second, 0);
        assert_eq!(cache.len(), after_first);
    }

    #[test]
    fn test_prune_keeps_everything_fresh() {
        let dir = TempDir::new().unwrap();
        let now = ts(20, 0);

        let mut cache = cache_in(&dir);
        cache.insert(
            TagKey::new("app", "v1"),
            TagMetadata::resolved("sha256:a", ts(1, 0), ts(19, 0)),
        );
        assert_eq!(cache.prune(now, 14, 1), 0);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_draw_jitter_within_range() {
        for _ in 0..100 {
            let jitter = draw_jitter((1, 5));
            assert!((1..=5).contains(&jitter));
        }
        assert_eq!(draw_jitter((3, 3)), 3);
    }

    #[test]
    #[should_panic(expected = "jitter range is reversed")]
    fn test_draw_jitter_rejects_reversed_range() {
        draw_jitter((5, 1));
    }

    #[test]
    fn test_save_scheduler_due_every_interval() {
        let mut scheduler = SaveScheduler::new(3);
        let due: Vec<bool> = (0..7).map(|_| scheduler.record_fresh()).collect();
        assert_eq!(due, [false, false, true, false, false, true, false]);
        assert_eq!(scheduler.pending(), 1);
    }

    #[test]
    fn test_save_scheduler_interval_one_is_always_due() {
        let mut scheduler = SaveScheduler::new(1);
        assert!(scheduler.record_fresh());
        assert!(scheduler.record_fresh());
        assert_eq!(scheduler.pending(), 0);
    }

    #[test]
    fn test_save_creates_parent_directory() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("tag_cache.json");

        let mut cache = TagCache::load(&path);
        cache.insert(
            TagKey::new("app", "v1"),
            TagMetadata::resolved("sha256:a", ts(1, 0), ts(2, 0)),
        );
        cache.save().unwrap();
        assert!(path.exists());
    }
}
