//! The cleanup run: one pass over the current catalog snapshot

use anyhow::{Context, Result};
use chrono::Utc;
use regprune_core::cache::draw_jitter;
use regprune_core::{plan, RunConfig, RunStats, SaveScheduler, TagCache};
use regprune_registry::{resolve_image, DeleteOutcome, RegistryClient};
use tracing::{debug, error, info, warn};

use crate::output;

pub async fn run(config: RunConfig) -> Result<()> {
    let mut cache = TagCache::load(&config.cache_path);
    let jitter = draw_jitter(config.jitter_days);
    cache.prune(Utc::now(), config.cache_expiry_days, jitter);

    let mut client = RegistryClient::new(&config.registry_url)?;
    if let Some((user, pass)) = config.auth() {
        client = client.with_basic_auth(user, pass);
    }

    if config.dry_run {
        output::info("Dry run - no tags will be deleted");
    }

    // Catalog failure is fatal; everything below degrades per image or tag.
    let catalog = client
        .list_catalog()
        .await
        .context("Failed to fetch registry catalog")?;

    let mut stats = RunStats::new();
    for image in &catalog {
        stats.init_image(image);
    }

    let mut scheduler = SaveScheduler::new(config.save_interval);

    for image in &catalog {
        let tags = match client.list_tags(image).await {
            Ok(tags) => tags,
            Err(e) => {
                error!("Failed to fetch tags for {image}: {e}");
                continue;
            }
        };
        debug!("Fetched {} tags for image {image}", tags.len());

        let Some(resolved) = resolve_image(
            &mut cache,
            &client,
            image,
            &tags,
            config.keep_count,
            config.group_by_build_time,
            &mut scheduler,
            Utc::now(),
        )
        .await
        else {
            continue;
        };

        let plan = plan(resolved, config.keep_count, config.group_by_build_time);

        if config.dry_run {
            info!("[DRY RUN] Image: {image}");
            info!("  Tags to keep:");
            for tag in &plan.keep {
                info!("    {} (created {})", tag.tag, tag.created.to_rfc3339());
            }
            info!("  Tags to delete:");
            for tag in &plan.delete {
                info!("    {} (created {})", tag.tag, tag.created.to_rfc3339());
            }
            stats.record(image, plan.delete.len());
            continue;
        }

        for tag in &plan.delete {
            match client.delete_manifest(image, &tag.digest).await {
                Ok(DeleteOutcome::Accepted) => {
                    stats.record_deleted(image);
                    info!("Deleted {image}:{}", tag.tag);
                }
                Ok(DeleteOutcome::Rejected(status)) => {
                    error!("Failed to delete {image}:{}, status {status}", tag.tag);
                }
                Err(e) => {
                    error!("Error deleting {image}:{}: {e}", tag.tag);
                }
            }
        }
    }

    if let Err(e) = cache.save() {
        warn!("Failed to save final tag cache: {e}");
        output::warning("Tag cache could not be saved; the next run will re-fetch metadata");
    }

    output::header("Image cleanup completed. Number of tags deleted:");
    println!("{}", serde_json::to_string_pretty(&stats)?);
    if config.dry_run {
        output::info(&format!(
            "{} tags would be deleted across {} images",
            stats.total(),
            catalog.len()
        ));
    } else {
        output::success(&format!("{} tags deleted", stats.total()));
    }

    Ok(())
}
