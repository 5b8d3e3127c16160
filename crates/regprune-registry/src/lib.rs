//! Registry access for the regprune CLI
//!
//! This crate provides:
//! - A Docker Registry HTTP v2 client (catalog, tag listing, manifest and
//!   config-blob fetches, manifest deletion) with optional basic auth
//! - The [`TagMetadataSource`] trait that abstracts metadata fetches so the
//!   resolver can be exercised without a live registry
//! - The cache-first metadata resolver mapping (image, tag) to its creation
//!   timestamp and digest

pub mod client;
pub mod resolver;
pub mod source;

pub use client::{DeleteOutcome, RegistryClient};
pub use resolver::{resolve, resolve_image, Resolution};
pub use source::{CreatedOutcome, ManifestOutcome, TagMetadataSource};
