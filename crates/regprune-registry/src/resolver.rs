//! Cache-first tag metadata resolution
//!
//! Maps an (image, tag) pair to its creation timestamp and digest. The
//! cache is consulted first; on a miss the external metadata source is
//! queried and the result — including a permanent negative result for a
//! broken tag — is written back. Transient failures and manifest 404s are
//! never cached, so they are retried on the next run.

use crate::source::{CreatedOutcome, ManifestOutcome, TagMetadataSource};
use chrono::{DateTime, Utc};
use regprune_core::{ResolvedTag, SaveScheduler, SkipReason, TagCache, TagKey, TagMetadata};
use tracing::{debug, info, warn};

/// Outcome of resolving one tag
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    Resolved {
        tag: ResolvedTag,
        /// True if the metadata came from the cache without a source call;
        /// fresh resolutions count toward the periodic cache save.
        from_cache: bool,
    },
    Skipped(SkipReason),
}

/// Resolve creation metadata for `image:tag`, using `cache` first and the
/// external `source` on a miss. Cache writes carry `cached_at = now`.
pub async fn resolve(
    cache: &mut TagCache,
    source: &dyn TagMetadataSource,
    image: &str,
    tag: &str,
    now: DateTime<Utc>,
) -> Resolution {
    let key = TagKey::new(image, tag);

    if let Some(entry) = cache.get(&key) {
        return match (&entry.created, &entry.digest) {
            (Some(created), Some(digest)) => {
                info!("Cache hit for {key}, created {}", created.to_rfc3339());
                Resolution::Resolved {
                    tag: ResolvedTag {
                        tag: tag.to_string(),
                        digest: digest.clone(),
                        created: *created,
                    },
                    from_cache: true,
                }
            }
            _ => {
                info!("Skipping {key} (previously unresolvable)");
                Resolution::Skipped(SkipReason::PreviouslyUnresolvable)
            }
        };
    }

    let (digest, config_digest) = match source.fetch_manifest(image, tag).await {
        ManifestOutcome::Found {
            digest,
            config_digest,
        } => (digest, config_digest),
        ManifestOutcome::NotFound => {
            return Resolution::Skipped(SkipReason::ManifestMissing);
        }
        ManifestOutcome::Transient => {
            return Resolution::Skipped(SkipReason::Transient);
        }
        ManifestOutcome::Unresolvable => {
            cache.insert(key, TagMetadata::unresolvable(now));
            return Resolution::Skipped(SkipReason::Unresolvable);
        }
    };

    match source.fetch_config_created(image, &config_digest).await {
        CreatedOutcome::Created(created) => {
            info!("Tag {key} created at {}", created.to_rfc3339());
            cache.insert(key, TagMetadata::resolved(digest.clone(), created, now));
            Resolution::Resolved {
                tag: ResolvedTag {
                    tag: tag.to_string(),
                    digest,
                    created,
                },
                from_cache: false,
            }
        }
        CreatedOutcome::Transient => Resolution::Skipped(SkipReason::Transient),
        CreatedOutcome::Unresolvable => {
            debug!("Caching negative entry for {key}");
            cache.insert(key, TagMetadata::unresolvable(now));
            Resolution::Skipped(SkipReason::Unresolvable)
        }
    }
}

/// Resolve every listed tag of one image.
///
/// An image with no more tags than `keep_count` is skipped outright and
/// yields `None`; no tag of it is resolved. In per-tag mode (grouping off)
/// a tag literally named `latest` is excluded before resolution, since a
/// floating alias has no place in a per-tag ranking; when grouping, it
/// travels with whichever build minute it points at.
///
/// Fresh resolutions are reported to `scheduler`, and the cache is saved
/// whenever an interval of them completes. A failed mid-run save only
/// warns; the final save at run end retries.
#[allow(clippy::too_many_arguments)]
pub async fn resolve_image(
    cache: &mut TagCache,
    source: &dyn TagMetadataSource,
    image: &str,
    tags: &[String],
    keep_count: usize,
    group_by_build_time: bool,
    scheduler: &mut SaveScheduler,
    now: DateTime<Utc>,
) -> Option<Vec<ResolvedTag>> {
    if tags.len() <= keep_count {
        info!("Skipping {image}, it has only {} tags", tags.len());
        return None;
    }

    let mut resolved = Vec::new();
    for tag in tags {
        if !group_by_build_time && tag == "latest" {
            info!("Skipping {image}:{tag} (latest tag)");
            continue;
        }

        match resolve(cache, source, image, tag, now).await {
            Resolution::Resolved { tag, from_cache } => {
                resolved.push(tag);
                if !from_cache && scheduler.record_fresh() {
                    if let Err(e) = cache.save() {
                        warn!("Failed to save tag cache during run: {e}");
                    }
                }
            }
            Resolution::Skipped(reason) => {
                debug!("Skipping {image}:{tag} ({reason})");
            }
        }
    }
    Some(resolved)
}
