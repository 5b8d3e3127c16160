//! The metadata-fetch seam between the resolver and the registry

use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// Outcome of fetching a tag's manifest.
///
/// Errors are folded into the variants rather than surfaced as `Result`:
/// the resolver's contract is built on which failures are retried next run
/// and which are cached as permanently broken, so the distinction has to be
/// explicit at this boundary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ManifestOutcome {
    /// Manifest fetched; carries the deletion digest and the config digest
    Found {
        digest: String,
        config_digest: String,
    },
    /// Tag is listed but the manifest 404s (listing race; retried next run)
    NotFound,
    /// Manifest body is permanently broken: invalid JSON or no config digest
    Unresolvable,
    /// Network failure or unexpected status (retried next run)
    Transient,
}

/// Outcome of fetching a creation timestamp from a config blob
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CreatedOutcome {
    Created(DateTime<Utc>),
    /// Config blob has no creation date (cached as permanently broken)
    Unresolvable,
    /// Network or parse failure (retried next run)
    Transient,
}

/// External capability providing per-tag creation metadata.
///
/// Implemented by [`crate::RegistryClient`]; tests provide mocks that count
/// calls to assert the resolver's caching behavior.
#[async_trait]
pub trait TagMetadataSource: Send + Sync {
    /// Fetch the manifest digest and config digest for `image:tag`
    async fn fetch_manifest(&self, image: &str, tag: &str) -> ManifestOutcome;

    /// Fetch the creation timestamp from a config blob
    async fn fetch_config_created(&self, image: &str, config_digest: &str) -> CreatedOutcome;
}
