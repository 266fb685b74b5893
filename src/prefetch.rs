//! Visibility windows around the topmost visible entry.
//!
//! The decode window is tight and the cache window wide, so media is on disk
//! well before it needs decoding. Both are recomputed from scratch each frame.

use std::ops::Range;

use crate::config::PrefetchConfig;
use crate::entry_store::{EntryFlags, EntryStore};
use crate::render::RenderDevice;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PrefetchController {
    decode_radius: usize,
    cache_radius: usize,
}

/// What one pass changed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PrefetchPass {
    pub decode_window: (usize, usize),
    pub newly_requested: usize,
    pub unloaded: usize,
}

fn window(top: usize, radius: usize, len: usize) -> Range<usize> {
    let start = top.saturating_sub(radius).min(len);
    let end = top.saturating_add(radius).saturating_add(1).min(len);
    start..end.max(start)
}

impl PrefetchController {
    pub fn new(config: &PrefetchConfig) -> Self {
        let decode_radius = config.decode_radius;
        Self {
            decode_radius,
            cache_radius: config.cache_radius.max(decode_radius),
        }
    }

    pub fn decode_window(&self, top: usize, len: usize) -> Range<usize> {
        window(top, self.decode_radius, len)
    }

    pub fn cache_window(&self, top: usize, len: usize) -> Range<usize> {
        window(top, self.cache_radius, len)
    }

    /// Flips request bits for every published entry and unloads artwork that
    /// left the decode window. Main thread only: it may release textures.
    pub fn update(
        &self,
        store: &EntryStore,
        top: usize,
        device: &mut dyn RenderDevice,
    ) -> PrefetchPass {
        let len = store.available_entries();
        let decode = self.decode_window(top, len);
        let cache = self.cache_window(top, len);
        let mut pass = PrefetchPass {
            decode_window: (decode.start, decode.end),
            ..PrefetchPass::default()
        };

        for index in 0..len {
            let flags = store.flags(index);

            if decode.contains(&index) {
                if !flags.contains(EntryFlags::ARTWORK_REQUESTED)
                    && store.artwork_texture(index) == 0
                {
                    store.insert_flags(index, EntryFlags::ARTWORK_REQUESTED);
                    pass.newly_requested += 1;
                }
            } else if flags.intersects(EntryFlags::ARTWORK_LOADED | EntryFlags::ARTWORK_REQUESTED)
                || store.artwork_texture(index) != 0
            {
                store.unload_artwork(index, device);
                pass.unloaded += 1;
            }

            let cache_requested = flags.contains(EntryFlags::CACHE_URL_REQUESTED);
            if cache.contains(&index) {
                if !cache_requested {
                    store.insert_flags(index, EntryFlags::CACHE_URL_REQUESTED);
                }
            } else if cache_requested {
                store.remove_flags(index, EntryFlags::CACHE_URL_REQUESTED);
            }
        }
        pass
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::ReleaseRecord;
    use crate::image_pipeline::DecodedImage;
    use crate::render::upload_loaded_artwork;
    use crate::test_support::RecordingDevice;

    fn published_store(len: usize) -> EntryStore {
        let store = EntryStore::new();
        store.resize(len);
        for index in 0..len {
            store.write_entry(
                index,
                ReleaseRecord {
                    id: index.to_string(),
                    ..ReleaseRecord::default()
                },
                false,
            );
            store.publish(index);
        }
        store
    }

    fn controller() -> PrefetchController {
        PrefetchController::new(&PrefetchConfig {
            decode_radius: 10,
            cache_radius: 100,
        })
    }

    fn count_with(store: &EntryStore, flag: EntryFlags) -> Vec<usize> {
        (0..store.available_entries())
            .filter(|index| store.flags(*index).contains(flag))
            .collect()
    }

    #[test]
    fn test_windows_clamp_to_published_range() {
        let prefetch = controller();
        assert_eq!(prefetch.decode_window(0, 500), 0..11);
        assert_eq!(prefetch.decode_window(250, 500), 240..261);
        assert_eq!(prefetch.decode_window(495, 500), 485..500);
        assert_eq!(prefetch.cache_window(50, 500), 0..151);
        assert_eq!(prefetch.decode_window(3, 0), 0..0);
    }

    #[test]
    fn test_update_requests_exactly_the_windows() {
        let store = published_store(300);
        let mut device = RecordingDevice::default();
        let pass = controller().update(&store, 150, &mut device);

        assert_eq!(pass.newly_requested, 21);
        assert_eq!(
            count_with(&store, EntryFlags::ARTWORK_REQUESTED),
            (140..=160).collect::<Vec<_>>()
        );
        assert_eq!(
            count_with(&store, EntryFlags::CACHE_URL_REQUESTED),
            (50..=250).collect::<Vec<_>>()
        );
    }

    #[test]
    fn test_small_store_requests_everything() {
        let store = published_store(5);
        let mut device = RecordingDevice::default();
        controller().update(&store, 0, &mut device);
        assert_eq!(count_with(&store, EntryFlags::ARTWORK_REQUESTED).len(), 5);
        assert_eq!(count_with(&store, EntryFlags::CACHE_URL_REQUESTED).len(), 5);
    }

    #[test]
    fn test_scrolling_away_releases_textures_and_clears_requests() {
        let store = published_store(300);
        let mut device = RecordingDevice::default();
        let prefetch = controller();
        prefetch.update(&store, 0, &mut device);

        for index in 0..=10 {
            store.publish_artwork_pixels(
                index,
                DecodedImage {
                    width: 1,
                    height: 1,
                    pixels: vec![0, 0, 0, 255],
                },
            );
        }
        assert_eq!(upload_loaded_artwork(&store, &mut device), 11);
        assert_eq!(device.live.len(), 11);

        let pass = prefetch.update(&store, 200, &mut device);
        assert_eq!(pass.unloaded, 11);
        assert!(device.live.is_empty());
        assert_eq!(store.live_texture_count(), 0);
        assert!(count_with(&store, EntryFlags::ARTWORK_LOADED).is_empty());
        assert_eq!(
            count_with(&store, EntryFlags::ARTWORK_REQUESTED),
            (190..=210).collect::<Vec<_>>()
        );
        assert!(!store.flags(0).contains(EntryFlags::CACHE_URL_REQUESTED));
        assert!(store.flags(100).contains(EntryFlags::CACHE_URL_REQUESTED));
    }

    #[test]
    fn test_textured_entries_inside_window_are_left_alone() {
        let store = published_store(3);
        let mut device = RecordingDevice::default();
        let prefetch = controller();
        prefetch.update(&store, 0, &mut device);
        store.publish_artwork_pixels(
            1,
            DecodedImage {
                width: 1,
                height: 1,
                pixels: vec![1, 2, 3, 4],
            },
        );
        upload_loaded_artwork(&store, &mut device);

        let pass = prefetch.update(&store, 0, &mut device);
        assert_eq!(pass.newly_requested, 0);
        assert_eq!(pass.unloaded, 0);
        assert_eq!(device.live.len(), 1);
    }
}
