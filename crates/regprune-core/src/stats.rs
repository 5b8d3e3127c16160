//! Per-image deletion statistics for the final report

use serde::Serialize;
use std::collections::BTreeMap;

/// Counts of tags deleted (or planned for deletion, in dry-run mode) per
/// image. Every catalog image is seeded with 0 at run start so images with
/// nothing to delete still appear in the report.
#[derive(Debug, Default, Clone, Serialize)]
#[serde(transparent)]
pub struct RunStats {
    deleted: BTreeMap<String, usize>,
}

impl RunStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed an image with a zero count
    pub fn init_image(&mut self, image: &str) {
        self.deleted.entry(image.to_string()).or_insert(0);
    }

    /// Add `count` deletions for an image
    pub fn record(&mut self, image: &str, count: usize) {
        *self.deleted.entry(image.to_string()).or_insert(0) += count;
    }

    /// Add a single deletion for an image
    pub fn record_deleted(&mut self, image: &str) {
        self.record(image, 1);
    }

    pub fn get(&self, image: &str) -> usize {
        self.deleted.get(image).copied().unwrap_or(0)
    }

    pub fn total(&self) -> usize {
        self.deleted.values().sum()
    }
}
