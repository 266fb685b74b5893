//! Downloads artwork and tracks for entries inside the cache window.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;

use log::warn;

use crate::app_context::AppContext;
use crate::cache::MediaCache;
use crate::entry_store::{EntryFlags, EntryStore};
use crate::protocol::{notify, Bus, PipelineMessage, ViewId};
use crate::view::View;

pub fn run(view: &View, context: &AppContext) {
    while !view.is_terminating() {
        cache_pass(
            view.store(),
            &context.cache,
            view.id(),
            &context.bus,
            view.terminate_flag(),
        );
        thread::sleep(context.worker_pass_sleep());
    }
}

/// One sweep over the published entries. Returns how many artwork or track
/// sets became cached.
pub fn cache_pass(
    store: &EntryStore,
    cache: &MediaCache,
    view_id: ViewId,
    bus: &Bus,
    cancel: &AtomicBool,
) -> usize {
    let mut cached = 0usize;
    for index in 0..store.available_entries() {
        if cancel.load(Ordering::Acquire) {
            break;
        }
        let flags = store.flags(index);
        if !flags.contains(EntryFlags::CACHE_URL_REQUESTED)
            || flags.contains(EntryFlags::ARTWORK_CACHED | EntryFlags::TRACKS_CACHED)
        {
            continue;
        }
        let owner_id = store.id(index);

        if !flags.contains(EntryFlags::ARTWORK_CACHED) {
            let url = store.artwork_url(index);
            if !url.is_empty() && store.artwork_filepath(index).is_none() {
                match cache.fetch_and_cache(&url, &owner_id) {
                    Ok(path) => {
                        store.publish_artwork_filepath(index, path);
                        notify(bus, PipelineMessage::ArtworkCached { view_id, index });
                        cached += 1;
                    }
                    Err(error) => warn!(
                        "View[{}]: artwork for release {} not cached: {}",
                        view_id, owner_id, error
                    ),
                }
            }
        }

        if !flags.contains(EntryFlags::TRACKS_CACHED) && cache_tracks(store, cache, index, &owner_id)
        {
            notify(bus, PipelineMessage::TracksCached { view_id, index });
            cached += 1;
        }
    }
    cached
}

/// Caches every track of the entry. The paths are published only when all of
/// them succeeded, so a partial set is retried on the next pass.
fn cache_tracks(store: &EntryStore, cache: &MediaCache, index: usize, owner_id: &str) -> bool {
    let urls = store.track_urls(index);
    if urls.is_empty() {
        store.insert_flags(index, EntryFlags::TRACKS_CACHED);
        return false;
    }

    let mut paths: Vec<PathBuf> = Vec::with_capacity(urls.len());
    for url in &urls {
        if url.is_empty() {
            paths.push(PathBuf::new());
            continue;
        }
        match cache.fetch_and_cache(url, owner_id) {
            Ok(path) => paths.push(path),
            Err(error) => {
                warn!("Cache: track for release {} not cached: {}", owner_id, error);
                return false;
            }
        }
    }
    store.publish_track_filepaths(index, paths)
}
