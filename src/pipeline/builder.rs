//! Single-shot worker that projects the registry into a view's entry store.

use std::collections::HashSet;
use std::thread;
use std::time::Duration;

use log::{debug, info};
use serde_json::Value;

use crate::app_context::AppContext;
use crate::catalog::{select_releases, TagFilter, ViewMode};
use crate::entry_store::EntryStore;
use crate::protocol::{notify, PipelineMessage};
use crate::view::View;

pub fn run(view: &View, context: &AppContext) {
    let Some(document) = context
        .registry
        .wait_for_document(view.freshness(), view.terminate_flag())
    else {
        debug!(
            "View[{}]: builder stopped before the registry was ready",
            view.id()
        );
        return;
    };

    let liked_ids = context.user_data.liked_ids();
    let published = populate(
        view.store(),
        &document,
        view.mode(),
        view.filter(),
        &liked_ids,
        context.builder_entry_sleep(),
    );
    view.mark_populated();
    info!(
        "View[{}]: built {} {} entries",
        view.id(),
        published,
        view.mode().display_name()
    );
    notify(
        &context.bus,
        PipelineMessage::ViewPopulated {
            view_id: view.id(),
            entries: published,
        },
    );
}

/// Grows the store by the selected releases and publishes them one by one.
pub fn populate(
    store: &EntryStore,
    document: &Value,
    mode: ViewMode,
    filter: TagFilter,
    liked_ids: &HashSet<String>,
    entry_sleep: Duration,
) -> usize {
    let records = select_releases(document, mode, filter, liked_ids);
    let base = store.soa_size();
    store.resize(records.len());

    for (offset, record) in records.into_iter().enumerate() {
        let index = base + offset;
        let liked = liked_ids.contains(&record.id);
        let written = store.write_entry(index, record, liked);
        debug_assert!(written, "row {index} was allocated by the resize above");
        store.publish(index);
        if !entry_sleep.is_zero() {
            thread::sleep(entry_sleep);
        }
    }
    store.available_entries()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::StoreTags;
    use crate::entry_store::EntryFlags;
    use serde_json::json;

    fn three_releases() -> Value {
        json!([
            {
                "id": "r1", "artist": "A1", "title": "T1", "new_releases": 2,
                "track_names": ["a"], "track_urls": ["https://x/a.mp3"]
            },
            {
                "id": "r2", "artist": "A2", "title": "T2", "label": "L2", "cat": "C2",
                "link": "https://shop/r2", "new_releases": 0, "weekly_chart": 5,
                "artworks": ["https://img/thumb.jpg", "https://img/r2.jpg"],
                "track_names": ["x", "y"], "track_urls": ["https://x/x.mp3"],
                "store_tags": {"preorder": true, "has_charted": true}
            },
            {"id": "r3", "artist": "A3", "title": "T3", "new_releases": 1}
        ])
    }

    #[test]
    fn test_likes_view_contains_only_liked_release() {
        let store = EntryStore::new();
        let liked: HashSet<String> = HashSet::from(["r2".to_string()]);
        let published = populate(
            &store,
            &three_releases(),
            ViewMode::Likes,
            TagFilter::ALL,
            &liked,
            Duration::ZERO,
        );

        assert_eq!(published, 1);
        let entry = store.snapshot(0).expect("entry published");
        assert_eq!(entry.id, "r2");
        assert_eq!(entry.artist, "A2");
        assert_eq!(entry.title, "T2");
        assert_eq!(entry.label, "L2");
        assert_eq!(entry.cat, "C2");
        assert_eq!(entry.link, "https://shop/r2");
        assert_eq!(entry.artwork_url, "https://img/r2.jpg");
        assert_eq!(
            entry.store_tags,
            StoreTags::PREORDER | StoreTags::HAS_CHARTED
        );
        assert!(entry.flags.contains(EntryFlags::LIKED));
        assert_eq!(store.track_name_count(0), 2);
        assert_eq!(store.track_url_count(0), 1);
    }

    #[test]
    fn test_latest_view_sorts_by_rank_and_marks_likes() {
        let store = EntryStore::new();
        let liked: HashSet<String> = HashSet::from(["r3".to_string()]);
        populate(
            &store,
            &three_releases(),
            ViewMode::Latest,
            TagFilter::ALL,
            &liked,
            Duration::ZERO,
        );

        let ids: Vec<String> = (0..store.available_entries()).map(|i| store.id(i)).collect();
        assert_eq!(ids, vec!["r2", "r3", "r1"]);
        assert!(store.flags(1).contains(EntryFlags::LIKED));
        assert!(!store.flags(0).contains(EntryFlags::LIKED));
        assert_eq!(store.soa_size(), 3);
    }

    #[test]
    fn test_chart_view_skips_unranked_releases() {
        let store = EntryStore::new();
        let published = populate(
            &store,
            &three_releases(),
            ViewMode::WeeklyChart,
            TagFilter::ALL,
            &HashSet::new(),
            Duration::ZERO,
        );
        assert_eq!(published, 1);
        assert_eq!(store.id(0), "r2");
    }

    #[test]
    fn test_empty_selection_publishes_nothing() {
        let store = EntryStore::new();
        let published = populate(
            &store,
            &three_releases(),
            ViewMode::Likes,
            TagFilter::ALL,
            &HashSet::new(),
            Duration::ZERO,
        );
        assert_eq!(published, 0);
        assert_eq!(store.soa_size(), 0);
    }
}
