//! Catalog document model: view modes, tag filters and lenient release parsing.
//!
//! The registry is an externally scraped JSON document, so every field is
//! optional here. Missing or mistyped fields read as empty strings, empty lists
//! or absent ranks rather than errors.

use std::collections::HashSet;

use serde_json::Value;

/// Which projection of the registry a view shows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Deserialize, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ViewMode {
    Latest,
    WeeklyChart,
    MonthlyChart,
    Likes,
}

impl ViewMode {
    pub fn display_name(self) -> &'static str {
        match self {
            Self::Latest => "Latest",
            Self::WeeklyChart => "Weekly Chart",
            Self::MonthlyChart => "Monthly Chart",
            Self::Likes => "Likes",
        }
    }

    /// Registry field carrying this mode's rank, if the mode is ranked.
    pub fn rank_field(self) -> Option<&'static str> {
        match self {
            Self::Latest => Some("new_releases"),
            Self::WeeklyChart => Some("weekly_chart"),
            Self::MonthlyChart => Some("monthly_chart"),
            Self::Likes => None,
        }
    }
}

bitflags::bitflags! {
    /// Genre filter applied on top of a view mode.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct TagFilter: u32 {
        const TECHNO = 1 << 0;
        const ELECTRO = 1 << 1;
        const HOUSE = 1 << 2;
        const DISCO = 1 << 3;
        const ALL = u32::MAX;
    }
}

const TAG_NAMES: [(&str, TagFilter); 4] = [
    ("techno", TagFilter::TECHNO),
    ("electro", TagFilter::ELECTRO),
    ("house", TagFilter::HOUSE),
    ("disco", TagFilter::DISCO),
];

impl Default for TagFilter {
    fn default() -> Self {
        Self::ALL
    }
}

bitflags::bitflags! {
    /// Shop status badges scraped alongside each release.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct StoreTags: u32 {
        const PREORDER = 1 << 0;
        const OUT_OF_STOCK = 1 << 1;
        const HAS_CHARTED = 1 << 2;
        const HAS_BEEN_OUT_OF_STOCK = 1 << 3;
    }
}

const STORE_TAG_NAMES: [(&str, StoreTags); 4] = [
    ("preorder", StoreTags::PREORDER),
    ("out_of_stock", StoreTags::OUT_OF_STOCK),
    ("has_charted", StoreTags::HAS_CHARTED),
    ("has_been_out_of_stock", StoreTags::HAS_BEEN_OUT_OF_STOCK),
];

/// Owned, fully-defaulted copy of one registry release.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReleaseRecord {
    pub id: String,
    pub artist: String,
    pub title: String,
    pub label: String,
    pub cat: String,
    pub link: String,
    pub artwork_url: String,
    pub track_names: Vec<String>,
    pub track_urls: Vec<String>,
    pub store_tags: StoreTags,
}

fn string_field(release: &Value, key: &str) -> String {
    match release.get(key) {
        Some(Value::String(text)) => text.clone(),
        Some(Value::Number(number)) => number.to_string(),
        _ => String::new(),
    }
}

fn string_list_field(release: &Value, key: &str) -> Vec<String> {
    release
        .get(key)
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .map(|item| match item {
                    Value::String(text) => text.clone(),
                    Value::Null => String::new(),
                    other => other.to_string(),
                })
                .collect()
        })
        .unwrap_or_default()
}

/// The first artwork is a thumbnail; the display image is the second one.
pub fn select_artwork_url(release: &Value) -> String {
    match release.get("artworks").and_then(Value::as_array) {
        Some(artworks) if artworks.len() > 1 => artworks[1].as_str().unwrap_or_default().to_string(),
        _ => String::new(),
    }
}

pub fn parse_store_tags(release: &Value) -> StoreTags {
    let Some(tags) = release.get("store_tags").and_then(Value::as_object) else {
        return StoreTags::empty();
    };
    STORE_TAG_NAMES
        .iter()
        .filter(|(name, _)| tags.get(*name).and_then(Value::as_bool).unwrap_or(false))
        .fold(StoreTags::empty(), |acc, (_, flag)| acc | *flag)
}

pub fn parse_release_tags(release: &Value) -> TagFilter {
    let Some(tags) = release.get("tags").and_then(Value::as_object) else {
        return TagFilter::empty();
    };
    TAG_NAMES
        .iter()
        .filter(|(name, _)| tags.get(*name).and_then(Value::as_bool).unwrap_or(false))
        .fold(TagFilter::empty(), |acc, (_, flag)| acc | *flag)
}

pub fn release_matches_filter(release: &Value, filter: TagFilter) -> bool {
    filter == TagFilter::ALL || parse_release_tags(release).intersects(filter)
}

fn rank_of(release: &Value, field: &str) -> Option<f64> {
    release.get(field).and_then(Value::as_f64)
}

pub fn parse_release(release: &Value, fallback_id: &str) -> ReleaseRecord {
    let mut id = string_field(release, "id");
    if id.is_empty() {
        id = fallback_id.to_string();
    }
    ReleaseRecord {
        id,
        artist: string_field(release, "artist"),
        title: string_field(release, "title"),
        label: string_field(release, "label"),
        cat: string_field(release, "cat"),
        link: string_field(release, "link"),
        artwork_url: select_artwork_url(release),
        track_names: string_list_field(release, "track_names"),
        track_urls: string_list_field(release, "track_urls"),
        store_tags: parse_store_tags(release),
    }
}

/// Releases in document order, paired with the key used as a fallback id.
pub fn ordered_releases(document: &Value) -> Vec<(String, &Value)> {
    match document {
        Value::Array(items) => items
            .iter()
            .enumerate()
            .map(|(index, item)| (index.to_string(), item))
            .collect(),
        Value::Object(map) => map.iter().map(|(key, item)| (key.clone(), item)).collect(),
        _ => Vec::new(),
    }
}

/// Applies a view's filter and ordering to the registry document.
///
/// Ranked modes keep releases carrying the mode's rank field and sort them
/// ascending; equal ranks keep document order. `Likes` keeps document order and
/// selects by liked id.
pub fn select_releases(
    document: &Value,
    mode: ViewMode,
    filter: TagFilter,
    liked_ids: &HashSet<String>,
) -> Vec<ReleaseRecord> {
    let releases = ordered_releases(document);
    match mode.rank_field() {
        Some(field) => {
            let mut ranked: Vec<(f64, ReleaseRecord)> = releases
                .into_iter()
                .filter(|(_, release)| release_matches_filter(release, filter))
                .filter_map(|(key, release)| {
                    rank_of(release, field).map(|rank| (rank, parse_release(release, &key)))
                })
                .collect();
            ranked.sort_by(|(left, _), (right, _)| left.total_cmp(right));
            ranked.into_iter().map(|(_, record)| record).collect()
        }
        None => releases
            .into_iter()
            .filter(|(_, release)| release_matches_filter(release, filter))
            .map(|(key, release)| parse_release(release, &key))
            .filter(|record| liked_ids.contains(&record.id))
            .collect(),
    }
}
