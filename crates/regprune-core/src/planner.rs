//! Retention planning
//!
//! Partitions an image's resolved tags into keep and delete sets under a
//! count-based policy. Two modes:
//!
//! - grouped: tags sharing a creation minute count as one retention unit,
//!   so a CI push of `v1.2.3` + `v1.2.3-abc123` is kept or dropped whole
//! - ungrouped: plain per-tag sort by creation time, keep the newest N
//!
//! Planning is pure: all fallibility lives in resolution, which degrades to
//! skipping a tag rather than reaching this point.

use crate::types::{ResolvedTag, RetentionPlan};
use chrono::{DateTime, Timelike, Utc};
use std::collections::BTreeMap;
use tracing::info;

/// Partition `resolved` into keep/delete sets.
///
/// With `group_by_build_time` set, tags are grouped by their creation
/// timestamp truncated to the minute and the newest `keep_count` groups are
/// kept whole. Otherwise tags are sorted ascending by creation time (stable,
/// so equal timestamps preserve input order) and the newest `keep_count`
/// individual tags are kept.
pub fn plan(
    resolved: Vec<ResolvedTag>,
    keep_count: usize,
    group_by_build_time: bool,
) -> RetentionPlan {
    if group_by_build_time {
        plan_grouped(resolved, keep_count)
    } else {
        plan_ungrouped(resolved, keep_count)
    }
}

fn plan_grouped(resolved: Vec<ResolvedTag>, keep_count: usize) -> RetentionPlan {
    let mut groups: BTreeMap<DateTime<Utc>, Vec<ResolvedTag>> = BTreeMap::new();
    for tag in resolved {
        groups.entry(minute_key(tag.created)).or_default().push(tag);
    }

    let mut plan = RetentionPlan::default();
    // BTreeMap iterates ascending; reverse for most-recent-first.
    for (index, (minute, tags)) in groups.into_iter().rev().enumerate() {
        let names: Vec<&str> = tags.iter().map(|t| t.tag.as_str()).collect();
        if index < keep_count {
            info!("KEEP   {}: {:?}", minute.to_rfc3339(), names);
            plan.keep.extend(tags);
        } else {
            info!("DELETE {}: {:?}", minute.to_rfc3339(), names);
            plan.delete.extend(tags);
        }
    }
    plan
}

fn plan_ungrouped(mut resolved: Vec<ResolvedTag>, keep_count: usize) -> RetentionPlan {
    resolved.sort_by_key(|t| t.created);
    let cut = resolved.len().saturating_sub(keep_count);
    let keep = resolved.split_off(cut);
    RetentionPlan {
        keep,
        delete: resolved,
    }
}

/// Creation timestamp truncated to whole-minute resolution.
fn minute_key(ts: DateTime<Utc>) -> DateTime<Utc> {
    ts.with_second(0)
        .and_then(|t| t.with_nanosecond(0))
        .unwrap_or(ts)
}
