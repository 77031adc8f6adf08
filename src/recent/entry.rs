//! Recent-entry records, the view event input, and query orderings.

use std::cmp::Ordering;
use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Display name used when a viewed record carries none.
pub const DEFAULT_NAME: &str = "Unnamed toilet";
/// Display address used when a viewed record carries none.
pub const DEFAULT_ADDRESS: &str = "Address unavailable";

/// One distinct point of interest the user has opened.
///
/// Serialized in camelCase (`lastViewedAt`, `viewCount`, `imageRef`), which is
/// also the durable record format. Unknown fields are ignored on decode.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecentEntry {
    /// Stable identifier, unique within the index.
    #[serde(default)]
    pub id: String,
    #[serde(default = "default_name")]
    pub name: String,
    #[serde(default = "default_address")]
    pub address: String,
    /// Optional score; not validated.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rating: Option<f64>,
    /// Opaque reference to a display image.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_ref: Option<String>,
    /// Milliseconds since the Unix epoch of the most recent view.
    pub last_viewed_at: i64,
    /// Number of views, at least 1.
    #[serde(default = "default_view_count")]
    pub view_count: u32,
}

fn default_name() -> String {
    DEFAULT_NAME.to_string()
}

fn default_address() -> String {
    DEFAULT_ADDRESS.to_string()
}

fn default_view_count() -> u32 {
    1
}

impl RecentEntry {
    /// Entry for the first view of `id`.
    pub(crate) fn first_view(id: &str, poi: &PoiRecord, now: i64) -> Self {
        Self {
            id: id.to_string(),
            name: non_blank(poi.name.as_deref()).unwrap_or(DEFAULT_NAME).to_string(),
            address: non_blank(poi.address.as_deref())
                .unwrap_or(DEFAULT_ADDRESS)
                .to_string(),
            rating: poi.rating,
            image_ref: poi.image_ref.clone(),
            last_viewed_at: now,
            view_count: 1,
        }
    }

    /// Apply a repeat view.
    ///
    /// Display fields present in `poi` replace the stored ones; absent fields
    /// keep their previous value. `last_viewed_at` never moves backwards.
    pub(crate) fn record_repeat_view(&mut self, poi: &PoiRecord, now: i64) {
        if let Some(name) = non_blank(poi.name.as_deref()) {
            self.name = name.to_string();
        }
        if let Some(address) = non_blank(poi.address.as_deref()) {
            self.address = address.to_string();
        }
        if poi.rating.is_some() {
            self.rating = poi.rating;
        }
        if poi.image_ref.is_some() {
            self.image_ref = poi.image_ref.clone();
        }
        self.last_viewed_at = self.last_viewed_at.max(now);
        self.view_count = self.view_count.saturating_add(1);
    }

    /// Fold a stored entry for the same id into this (newer, in-memory) one.
    pub(crate) fn absorb_stored(&mut self, stored: &RecentEntry) {
        self.view_count = self.view_count.saturating_add(stored.view_count);
        self.last_viewed_at = self.last_viewed_at.max(stored.last_viewed_at);
        if self.rating.is_none() {
            self.rating = stored.rating;
        }
        if self.image_ref.is_none() {
            self.image_ref = stored.image_ref.clone();
        }
    }
}

/// A "viewed" event from the UI layer.
///
/// Only `id` is required; a record without one is rejected by the cache.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct PoiRecord {
    pub id: Option<String>,
    pub name: Option<String>,
    pub address: Option<String>,
    pub rating: Option<f64>,
    pub image_ref: Option<String>,
}

impl PoiRecord {
    /// Record carrying only an id.
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: Some(id.into()),
            ..Self::default()
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_address(mut self, address: impl Into<String>) -> Self {
        self.address = Some(address.into());
        self
    }

    pub fn with_rating(mut self, rating: f64) -> Self {
        self.rating = Some(rating);
        self
    }

    pub fn with_image_ref(mut self, image_ref: impl Into<String>) -> Self {
        self.image_ref = Some(image_ref.into());
        self
    }

    /// The trimmed id, if it is present and not blank.
    pub fn key(&self) -> Option<&str> {
        non_blank(self.id.as_deref())
    }
}

/// Aggregate figures over the index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecentStats {
    pub total_entries: usize,
    /// Sum of every entry's `view_count`.
    pub total_views: u64,
    /// Smallest `last_viewed_at`, `None` when the index is empty.
    pub oldest_viewed_at: Option<i64>,
    /// Largest `last_viewed_at`, `None` when the index is empty.
    pub newest_viewed_at: Option<i64>,
}

impl RecentStats {
    pub(crate) fn collect<'a>(entries: impl Iterator<Item = &'a RecentEntry>) -> Self {
        let mut stats = Self {
            total_entries: 0,
            total_views: 0,
            oldest_viewed_at: None,
            newest_viewed_at: None,
        };
        for entry in entries {
            stats.total_entries += 1;
            stats.total_views += u64::from(entry.view_count);
            let at = entry.last_viewed_at;
            stats.oldest_viewed_at = Some(stats.oldest_viewed_at.map_or(at, |o| o.min(at)));
            stats.newest_viewed_at = Some(stats.newest_viewed_at.map_or(at, |n| n.max(at)));
        }
        stats
    }
}

/// Most recently viewed first; ties by id ascending.
pub fn by_recency(a: &RecentEntry, b: &RecentEntry) -> Ordering {
    b.last_viewed_at
        .cmp(&a.last_viewed_at)
        .then_with(|| a.id.cmp(&b.id))
}

/// Highest view count first; ties by recency, then id.
pub fn by_popularity(a: &RecentEntry, b: &RecentEntry) -> Ordering {
    b.view_count
        .cmp(&a.view_count)
        .then_with(|| by_recency(a, b))
}

/// Drop least-recently-viewed entries until `index` holds at most `max`.
///
/// Returns the evicted ids, oldest first.
pub(crate) fn evict_overflow(index: &mut HashMap<String, RecentEntry>, max: usize) -> Vec<String> {
    let mut evicted = Vec::new();
    while index.len() > max {
        // The "largest" entry under by_recency is the one listed last.
        let Some(victim) = index
            .values()
            .max_by(|a, b| by_recency(a, b))
            .map(|e| e.id.clone())
        else {
            break;
        };
        index.remove(&victim);
        evicted.push(victim);
    }
    evicted
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}
