//! # regprune-core
//!
//! Core library for the regprune CLI providing:
//! - Shared types for tag metadata and retention plans
//! - The persisted tag-metadata cache with jittered expiry
//! - The retention planner (per-tag sort or per-build grouping)
//! - Run configuration and per-image deletion statistics

pub mod cache;
pub mod config;
pub mod error;
pub mod planner;
pub mod stats;
pub mod types;

pub use cache::{SaveScheduler, TagCache};
pub use config::RunConfig;
pub use error::{Error, Result};
pub use planner::plan;
pub use stats::RunStats;
pub use types::{ResolvedTag, RetentionPlan, SkipReason, TagKey, TagMetadata};
