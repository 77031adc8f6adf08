//! `loofinder recent` command handlers.

use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{DateTime, Local, Utc};

use loofinder::config::Config;
use loofinder::recent::{PoiRecord, RecentCache, RecentEntry, RecentStats};
use loofinder::storage::FileStore;

use super::RecentAction;

/// Manage recently viewed toilets.
pub(crate) async fn cmd_recent(action: RecentAction, config: &Config) -> Result<()> {
    let store = FileStore::new(config.storage_dir());
    let cache = RecentCache::open(Arc::new(store), config.recent.clone())
        .await
        .with_context(|| "Failed to open recent-entries cache")?;

    match action {
        RecentAction::View {
            id,
            name,
            address,
            rating,
            image,
        } => {
            let poi = PoiRecord {
                id: Some(id.clone()),
                name,
                address,
                rating,
                image_ref: image,
            };
            let Some(entry) = cache.record_view(poi) else {
                anyhow::bail!("'{}' is not a usable toilet id", id);
            };
            cache.flush().await;
            println!(
                "Recorded view of {} ({} view{})",
                entry.id,
                entry.view_count,
                plural(entry.view_count as usize)
            );
        }
        RecentAction::List { limit, json } => {
            let entries = match limit {
                Some(limit) => cache.recent_limited(limit),
                None => cache.recent().to_vec(),
            };
            print_entries(&entries, json, "No recently viewed toilets.")?;
        }
        RecentAction::Top { json } => {
            let entries = cache.most_viewed();
            print_entries(&entries, json, "No toilets viewed yet.")?;
        }
        RecentAction::Show { id, json } => {
            let Some(entry) = cache.get(&id) else {
                anyhow::bail!("No recent entry for '{}'", id);
            };
            if json {
                println!("{}", serde_json::to_string_pretty(&entry)?);
            } else {
                print_entry_detail(&entry);
            }
        }
        RecentAction::Remove { id } => {
            if cache.remove(&id) {
                cache.flush().await;
                println!("Removed {}.", id);
            } else {
                println!("{} was not in the recent list.", id);
            }
        }
        RecentAction::Clear => {
            let count = cache.len();
            cache.clear();
            cache.flush().await;
            println!("Cleared {} recent entr{}.", count, if count == 1 { "y" } else { "ies" });
        }
        RecentAction::Stats { json } => {
            let stats = cache.stats();
            if json {
                println!("{}", serde_json::to_string_pretty(&stats)?);
            } else {
                print_stats(&stats);
            }
        }
    }

    Ok(())
}

fn print_entries(entries: &[RecentEntry], json: bool, empty_message: &str) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(entries)?);
        return Ok(());
    }
    if entries.is_empty() {
        println!("{}", empty_message);
        return Ok(());
    }
    for entry in entries {
        println!("{}", summary_line(entry));
    }
    Ok(())
}

fn summary_line(entry: &RecentEntry) -> String {
    format!(
        "- {} | {} | {} | {} view{} | {}",
        entry.id,
        entry.name,
        entry.address,
        entry.view_count,
        plural(entry.view_count as usize),
        format_millis(entry.last_viewed_at)
    )
}

fn print_entry_detail(entry: &RecentEntry) {
    println!("Id:          {}", entry.id);
    println!("Name:        {}", entry.name);
    println!("Address:     {}", entry.address);
    if let Some(rating) = entry.rating {
        println!("Rating:      {:.1}", rating);
    }
    if let Some(image) = &entry.image_ref {
        println!("Image:       {}", image);
    }
    println!("Views:       {}", entry.view_count);
    println!("Last viewed: {}", format_millis(entry.last_viewed_at));
}

fn print_stats(stats: &RecentStats) {
    println!("Entries:     {}", stats.total_entries);
    println!("Total views: {}", stats.total_views);
    match (stats.oldest_viewed_at, stats.newest_viewed_at) {
        (Some(oldest), Some(newest)) => {
            println!("Oldest view: {}", format_millis(oldest));
            println!("Newest view: {}", format_millis(newest));
        }
        _ => println!("No views recorded."),
    }
}

fn format_millis(millis: i64) -> String {
    DateTime::<Utc>::from_timestamp_millis(millis)
        .map(|utc| {
            utc.with_timezone(&Local)
                .format("%Y-%m-%d %H:%M:%S")
                .to_string()
        })
        .unwrap_or_else(|| format!("{millis} ms"))
}

fn plural(count: usize) -> &'static str {
    if count == 1 {
        ""
    } else {
        "s"
    }
}
