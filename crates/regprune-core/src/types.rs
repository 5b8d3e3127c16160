use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Identity of one tag within the registry snapshot
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TagKey {
    /// Repository path (e.g., "team/app")
    pub image: String,
    /// Tag name (e.g., "v1.2.3")
    pub tag: String,
}

impl TagKey {
    pub fn new(image: impl Into<String>, tag: impl Into<String>) -> Self {
        Self {
            image: image.into(),
            tag: tag.into(),
        }
    }

    /// Parse a persisted cache key back into its parts.
    ///
    /// Repository paths may contain `/` but never `:`, and tag names may not
    /// contain `:` either, so splitting on the last `:` is unambiguous.
    pub fn from_cache_key(s: &str) -> Option<Self> {
        let (image, tag) = s.rsplit_once(':')?;
        if image.is_empty() || tag.is_empty() {
            return None;
        }
        Some(Self::new(image, tag))
    }
}

impl fmt::Display for TagKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.image, self.tag)
    }
}

/// Cached creation metadata for one tag.
///
/// `created == None` marks a permanently unresolvable tag (missing config
/// digest, invalid JSON, missing creation date). Such entries are cached so
/// a broken tag is not re-queried on every run; they age out through the
/// normal prune window.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TagMetadata {
    /// Manifest digest, the stable deletion target
    pub digest: Option<String>,
    /// Image creation timestamp from the config blob
    pub created: Option<DateTime<Utc>>,
    /// When this entry was written (not when the image was built)
    pub cached_at: DateTime<Utc>,
}

impl TagMetadata {
    /// Entry for a successfully resolved tag
    pub fn resolved(digest: impl Into<String>, created: DateTime<Utc>, now: DateTime<Utc>) -> Self {
        Self {
            digest: Some(digest.into()),
            created: Some(created),
            cached_at: now,
        }
    }

    /// Permanent negative entry for an unresolvable tag
    pub fn unresolvable(now: DateTime<Utc>) -> Self {
        Self {
            digest: None,
            created: None,
            cached_at: now,
        }
    }
}

/// A tag whose creation metadata resolved successfully
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedTag {
    pub tag: String,
    pub digest: String,
    pub created: DateTime<Utc>,
}

/// The planner's output for one image
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RetentionPlan {
    pub keep: Vec<ResolvedTag>,
    pub delete: Vec<ResolvedTag>,
}

/// Why a tag was left out of retention planning
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// Cached negative entry from an earlier run
    PreviouslyUnresolvable,
    /// Tag is listed but its manifest returned 404 (retried next run)
    ManifestMissing,
    /// Network or registry failure (retried next run)
    Transient,
    /// Manifest or config blob is permanently broken (cached negative)
    Unresolvable,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SkipReason::PreviouslyUnresolvable => "previously unresolvable",
            SkipReason::ManifestMissing => "manifest missing",
            SkipReason::Transient => "transient failure",
            SkipReason::Unresolvable => "unresolvable",
        };
        f.write_str(s)
    }
}
