//! Columnar (struct-of-arrays) release table shared by one view's workers and the UI.
//!
//! Every column is its own growable sequence indexed by entry position. The
//! table lock is taken for writing only while growing; all per-entry writes go
//! through write-once cells or atomics under a read lock, so the single writer
//! of each field never blocks readers of other fields.
//!
//! Publication order:
//! - the builder fills an entry's fixed columns, then calls [`EntryStore::publish`];
//!   readers only touch indices below [`EntryStore::available_entries`].
//! - variable-length track columns are filled first and their count raised
//!   afterwards with release ordering; readers acquire the count before indexing.
//! - flag bits are raised with release ordering after the data they gate.

use std::path::PathBuf;
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::OnceLock;

use parking_lot::{Mutex, RwLock};

use crate::catalog::{ReleaseRecord, StoreTags};
use crate::image_pipeline::DecodedImage;
use crate::render::{RenderDevice, TextureHandle};

bitflags::bitflags! {
    /// Per-entry state bits. Not mutually exclusive.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct EntryFlags: u32 {
        const ALLOCATED = 1 << 0;
        const ARTWORK_CACHED = 1 << 1;
        const TRACKS_CACHED = 1 << 2;
        const ARTWORK_LOADED = 1 << 3;
        const TRACKS_LOADED = 1 << 4;
        const TRANSITIONING = 1 << 5;
        const DRAGGING = 1 << 6;
        const ARTWORK_REQUESTED = 1 << 7;
        const LIKED = 1 << 8;
        const HOVERED = 1 << 9;
        const CACHE_URL_REQUESTED = 1 << 10;
    }
}

/// A single growable column of the table.
trait Column {
    fn grow_by(&mut self, additional: usize);
    fn rows(&self) -> usize;
}

impl<T: Default> Column for Vec<T> {
    fn grow_by(&mut self, additional: usize) {
        let target = self.len() + additional;
        self.resize_with(target, T::default);
    }

    fn rows(&self) -> usize {
        self.len()
    }
}

#[derive(Default)]
struct Columns {
    id: Vec<OnceLock<String>>,
    flags: Vec<AtomicU32>,
    artist: Vec<OnceLock<String>>,
    title: Vec<OnceLock<String>>,
    label: Vec<OnceLock<String>>,
    cat: Vec<OnceLock<String>>,
    link: Vec<OnceLock<String>>,
    artwork_url: Vec<OnceLock<String>>,
    artwork_filepath: Vec<OnceLock<PathBuf>>,
    artwork_texture: Vec<AtomicU32>,
    artwork_pixels: Vec<Mutex<Option<DecodedImage>>>,
    track_name_count: Vec<AtomicU32>,
    track_names: Vec<OnceLock<Box<[String]>>>,
    track_url_count: Vec<AtomicU32>,
    track_urls: Vec<OnceLock<Box<[String]>>>,
    track_filepath_count: Vec<AtomicU32>,
    track_filepaths: Vec<OnceLock<Box<[PathBuf]>>>,
    select_track: Vec<AtomicU32>,
    scrollx: Vec<AtomicU32>,
    store_tags: Vec<AtomicU32>,
}

impl Columns {
    fn columns_mut(&mut self) -> [&mut dyn Column; 20] {
        [
            &mut self.id,
            &mut self.flags,
            &mut self.artist,
            &mut self.title,
            &mut self.label,
            &mut self.cat,
            &mut self.link,
            &mut self.artwork_url,
            &mut self.artwork_filepath,
            &mut self.artwork_texture,
            &mut self.artwork_pixels,
            &mut self.track_name_count,
            &mut self.track_names,
            &mut self.track_url_count,
            &mut self.track_urls,
            &mut self.track_filepath_count,
            &mut self.track_filepaths,
            &mut self.select_track,
            &mut self.scrollx,
            &mut self.store_tags,
        ]
    }
}

/// Read-only copy of an entry's fixed columns.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EntrySnapshot {
    pub id: String,
    pub artist: String,
    pub title: String,
    pub label: String,
    pub cat: String,
    pub link: String,
    pub artwork_url: String,
    pub store_tags: StoreTags,
    pub flags: EntryFlags,
}

fn cell_text(cells: &[OnceLock<String>], index: usize) -> String {
    cells
        .get(index)
        .and_then(OnceLock::get)
        .cloned()
        .unwrap_or_default()
}

fn published_list<T: Clone>(
    counts: &[AtomicU32],
    lists: &[OnceLock<Box<[T]>>],
    index: usize,
) -> Vec<T> {
    let Some(count) = counts.get(index) else {
        return Vec::new();
    };
    let count = count.load(Ordering::Acquire) as usize;
    if count == 0 {
        return Vec::new();
    }
    lists
        .get(index)
        .and_then(OnceLock::get)
        .map(|items| items.iter().take(count).cloned().collect())
        .unwrap_or_default()
}

fn publish_list<T>(
    counts: &[AtomicU32],
    lists: &[OnceLock<Box<[T]>>],
    index: usize,
    items: Vec<T>,
) -> bool {
    let (Some(count), Some(list)) = (counts.get(index), lists.get(index)) else {
        return false;
    };
    let len = items.len() as u32;
    if len == 0 || list.set(items.into_boxed_slice()).is_err() {
        return false;
    }
    count.store(len, Ordering::Release);
    true
}

/// Growable columnar table of release entries.
#[derive(Default)]
pub struct EntryStore {
    columns: RwLock<Columns>,
    available_entries: AtomicUsize,
    soa_size: AtomicUsize,
}

impl EntryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Grows every column by `additional` zeroed rows. Existing rows are kept.
    pub fn resize(&self, additional: usize) {
        let mut columns = self.columns.write();
        for column in columns.columns_mut() {
            column.grow_by(additional);
        }
        let new_size = columns.id.rows();
        debug_assert!(columns.columns_mut().iter().all(|c| c.rows() == new_size));
        self.soa_size.store(new_size, Ordering::Release);
    }

    /// Number of rows allocated in every column.
    pub fn soa_size(&self) -> usize {
        self.soa_size.load(Ordering::Acquire)
    }

    /// Number of leading entries that are fully populated and safe to read.
    pub fn available_entries(&self) -> usize {
        self.available_entries.load(Ordering::Acquire)
    }

    /// Writes every fixed column of `index` plus the track name/url lists.
    /// Must happen before [`EntryStore::publish`] for the same index.
    pub fn write_entry(&self, index: usize, record: ReleaseRecord, liked: bool) -> bool {
        let columns = self.columns.read();
        if index >= columns.id.rows() {
            return false;
        }

        let ReleaseRecord {
            id,
            artist,
            title,
            label,
            cat,
            link,
            artwork_url,
            track_names,
            track_urls,
            store_tags,
        } = record;
        let _ = columns.id[index].set(id);
        let _ = columns.artist[index].set(artist);
        let _ = columns.title[index].set(title);
        let _ = columns.label[index].set(label);
        let _ = columns.cat[index].set(cat);
        let _ = columns.link[index].set(link);
        let _ = columns.artwork_url[index].set(artwork_url);
        columns.store_tags[index].store(store_tags.bits(), Ordering::Relaxed);
        columns.select_track[index].store(0, Ordering::Relaxed);
        columns.scrollx[index].store(0f32.to_bits(), Ordering::Relaxed);

        publish_list(
            &columns.track_name_count,
            &columns.track_names,
            index,
            track_names,
        );
        publish_list(&columns.track_url_count, &columns.track_urls, index, track_urls);

        let mut flags = EntryFlags::ALLOCATED;
        if liked {
            flags |= EntryFlags::LIKED;
        }
        columns.flags[index].fetch_or(flags.bits(), Ordering::Release);
        true
    }

    /// Makes entries `0..=index` visible to readers.
    pub fn publish(&self, index: usize) {
        debug_assert!(index < self.soa_size());
        self.available_entries.fetch_max(index + 1, Ordering::Release);
    }

    pub fn snapshot(&self, index: usize) -> Option<EntrySnapshot> {
        let columns = self.columns.read();
        if index >= columns.id.rows() {
            return None;
        }
        Some(EntrySnapshot {
            id: cell_text(&columns.id, index),
            artist: cell_text(&columns.artist, index),
            title: cell_text(&columns.title, index),
            label: cell_text(&columns.label, index),
            cat: cell_text(&columns.cat, index),
            link: cell_text(&columns.link, index),
            artwork_url: cell_text(&columns.artwork_url, index),
            store_tags: StoreTags::from_bits_truncate(
                columns.store_tags[index].load(Ordering::Relaxed),
            ),
            flags: EntryFlags::from_bits_truncate(columns.flags[index].load(Ordering::Acquire)),
        })
    }

    pub fn id(&self, index: usize) -> String {
        cell_text(&self.columns.read().id, index)
    }

    pub fn artwork_url(&self, index: usize) -> String {
        cell_text(&self.columns.read().artwork_url, index)
    }

    pub fn flags(&self, index: usize) -> EntryFlags {
        self.columns
            .read()
            .flags
            .get(index)
            .map(|bits| EntryFlags::from_bits_truncate(bits.load(Ordering::Acquire)))
            .unwrap_or_default()
    }

    pub fn insert_flags(&self, index: usize, flags: EntryFlags) {
        if let Some(bits) = self.columns.read().flags.get(index) {
            bits.fetch_or(flags.bits(), Ordering::Release);
        }
    }

    pub fn remove_flags(&self, index: usize, flags: EntryFlags) {
        if let Some(bits) = self.columns.read().flags.get(index) {
            bits.fetch_and(!flags.bits(), Ordering::Release);
        }
    }

    pub fn artwork_filepath(&self, index: usize) -> Option<PathBuf> {
        self.columns
            .read()
            .artwork_filepath
            .get(index)
            .and_then(OnceLock::get)
            .cloned()
    }

    /// Records the cached artwork location and raises `ARTWORK_CACHED`.
    pub fn publish_artwork_filepath(&self, index: usize, path: PathBuf) {
        let columns = self.columns.read();
        let Some(cell) = columns.artwork_filepath.get(index) else {
            return;
        };
        let _ = cell.set(path);
        columns.flags[index].fetch_or(EntryFlags::ARTWORK_CACHED.bits(), Ordering::Release);
    }

    pub fn track_name_count(&self, index: usize) -> usize {
        let columns = self.columns.read();
        columns
            .track_name_count
            .get(index)
            .map(|count| count.load(Ordering::Acquire) as usize)
            .unwrap_or(0)
    }

    pub fn track_url_count(&self, index: usize) -> usize {
        let columns = self.columns.read();
        columns
            .track_url_count
            .get(index)
            .map(|count| count.load(Ordering::Acquire) as usize)
            .unwrap_or(0)
    }

    pub fn track_filepath_count(&self, index: usize) -> usize {
        let columns = self.columns.read();
        columns
            .track_filepath_count
            .get(index)
            .map(|count| count.load(Ordering::Acquire) as usize)
            .unwrap_or(0)
    }

    pub fn track_names(&self, index: usize) -> Vec<String> {
        let columns = self.columns.read();
        published_list(&columns.track_name_count, &columns.track_names, index)
    }

    pub fn track_urls(&self, index: usize) -> Vec<String> {
        let columns = self.columns.read();
        published_list(&columns.track_url_count, &columns.track_urls, index)
    }

    pub fn track_filepaths(&self, index: usize) -> Vec<PathBuf> {
        let columns = self.columns.read();
        published_list(&columns.track_filepath_count, &columns.track_filepaths, index)
    }

    /// Publishes the cached track files, then raises `TRACKS_CACHED`.
    pub fn publish_track_filepaths(&self, index: usize, paths: Vec<PathBuf>) -> bool {
        let columns = self.columns.read();
        if !publish_list(
            &columns.track_filepath_count,
            &columns.track_filepaths,
            index,
            paths,
        ) {
            return false;
        }
        columns.flags[index].fetch_or(EntryFlags::TRACKS_CACHED.bits(), Ordering::Release);
        true
    }

    /// Hands decoded pixels to the entry and raises `ARTWORK_LOADED`.
    pub fn publish_artwork_pixels(&self, index: usize, image: DecodedImage) {
        let columns = self.columns.read();
        let Some(slot) = columns.artwork_pixels.get(index) else {
            return;
        };
        *slot.lock() = Some(image);
        columns.flags[index].fetch_or(EntryFlags::ARTWORK_LOADED.bits(), Ordering::Release);
    }

    pub fn has_artwork_pixels(&self, index: usize) -> bool {
        self.columns
            .read()
            .artwork_pixels
            .get(index)
            .is_some_and(|slot| slot.lock().is_some())
    }

    pub fn take_artwork_pixels(&self, index: usize) -> Option<DecodedImage> {
        self.columns
            .read()
            .artwork_pixels
            .get(index)
            .and_then(|slot| slot.lock().take())
    }

    pub fn artwork_texture(&self, index: usize) -> TextureHandle {
        self.columns
            .read()
            .artwork_texture
            .get(index)
            .map(|handle| handle.load(Ordering::Acquire))
            .unwrap_or(0)
    }

    pub fn set_artwork_texture(&self, index: usize, handle: TextureHandle) {
        if let Some(slot) = self.columns.read().artwork_texture.get(index) {
            slot.store(handle, Ordering::Release);
        }
    }

    /// Releases the entry's texture and pending pixels and returns it to
    /// "cached but not loaded".
    pub fn unload_artwork(&self, index: usize, device: &mut dyn RenderDevice) {
        let columns = self.columns.read();
        let Some(texture) = columns.artwork_texture.get(index) else {
            return;
        };
        let handle = texture.swap(0, Ordering::AcqRel);
        if handle != 0 {
            device.release_texture(handle);
        }
        columns.artwork_pixels[index].lock().take();
        columns.flags[index].fetch_and(
            !(EntryFlags::ARTWORK_LOADED | EntryFlags::ARTWORK_REQUESTED).bits(),
            Ordering::Release,
        );
    }

    /// Releases every live texture. Returns how many were released.
    pub fn release_all_textures(&self, device: &mut dyn RenderDevice) -> usize {
        let columns = self.columns.read();
        let mut released = 0usize;
        for texture in &columns.artwork_texture {
            let handle = texture.swap(0, Ordering::AcqRel);
            if handle != 0 {
                device.release_texture(handle);
                released += 1;
            }
        }
        released
    }

    pub fn live_texture_count(&self) -> usize {
        self.columns
            .read()
            .artwork_texture
            .iter()
            .filter(|handle| handle.load(Ordering::Acquire) != 0)
            .count()
    }

    pub fn select_track(&self, index: usize) -> u32 {
        self.columns
            .read()
            .select_track
            .get(index)
            .map(|value| value.load(Ordering::Relaxed))
            .unwrap_or(0)
    }

    pub fn set_select_track(&self, index: usize, track: u32) {
        if let Some(value) = self.columns.read().select_track.get(index) {
            value.store(track, Ordering::Relaxed);
        }
    }

    pub fn scrollx(&self, index: usize) -> f32 {
        self.columns
            .read()
            .scrollx
            .get(index)
            .map(|bits| f32::from_bits(bits.load(Ordering::Relaxed)))
            .unwrap_or(0.0)
    }

    pub fn set_scrollx(&self, index: usize, value: f32) {
        if let Some(bits) = self.columns.read().scrollx.get(index) {
            bits.store(value.to_bits(), Ordering::Relaxed);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::RecordingDevice;

    fn record(id: &str, tracks: usize) -> ReleaseRecord {
        ReleaseRecord {
            id: id.to_string(),
            artist: format!("artist-{id}"),
            title: format!("title-{id}"),
            artwork_url: format!("https://img.example/{id}.jpg"),
            track_names: (0..tracks).map(|t| format!("track {t}")).collect(),
            track_urls: (0..tracks)
                .map(|t| format!("https://audio.example/{id}/{t}.mp3"))
                .collect(),
            ..ReleaseRecord::default()
        }
    }

    #[test]
    fn test_resize_preserves_rows_and_zero_fills_new_region() {
        let store = EntryStore::new();
        store.resize(2);
        assert!(store.write_entry(0, record("a", 2), false));
        assert!(store.write_entry(1, record("b", 0), true));
        store.publish(0);
        store.publish(1);
        store.set_scrollx(1, 12.5);
        store.set_select_track(0, 1);
        store.set_select_track(7, 3);
        store.insert_flags(0, EntryFlags::ARTWORK_REQUESTED);

        store.resize(3);
        assert_eq!(store.soa_size(), 5);
        assert_eq!(store.available_entries(), 2);

        let first = store.snapshot(0).expect("row 0 exists");
        assert_eq!(first.id, "a");
        assert_eq!(first.artist, "artist-a");
        assert!(first.flags.contains(EntryFlags::ARTWORK_REQUESTED));
        assert_eq!(store.track_urls(0).len(), 2);
        assert_eq!(store.scrollx(1), 12.5);
        assert_eq!(store.select_track(0), 1);
        assert_eq!(store.select_track(7), 0);
        assert!(store.flags(1).contains(EntryFlags::LIKED));

        for index in 2..5 {
            let fresh = store.snapshot(index).expect("new rows exist");
            assert_eq!(fresh, EntrySnapshot::default());
            assert_eq!(store.track_url_count(index), 0);
            assert!(store.track_urls(index).is_empty());
            assert_eq!(store.artwork_texture(index), 0);
            assert!(store.artwork_filepath(index).is_none());
        }
        assert!(store.snapshot(5).is_none());
    }

    #[test]
    fn test_write_entry_rejects_unallocated_row() {
        let store = EntryStore::new();
        assert!(!store.write_entry(0, record("x", 1), false));
        store.resize(1);
        assert!(store.write_entry(0, record("x", 1), false));
    }

    #[test]
    fn test_track_counts_match_published_lists() {
        let store = EntryStore::new();
        store.resize(2);
        store.write_entry(0, record("a", 3), false);
        store.write_entry(1, record("b", 0), false);
        assert_eq!(store.track_url_count(0), 3);
        assert_eq!(store.track_urls(0).len(), 3);
        assert_eq!(store.track_names(0)[2], "track 2");
        assert_eq!(store.track_url_count(1), 0);
        assert!(store.track_urls(1).is_empty());

        assert!(!store.publish_track_filepaths(1, Vec::new()));
        assert!(!store.flags(1).contains(EntryFlags::TRACKS_CACHED));

        let paths = vec![PathBuf::from("/c/a/0"), PathBuf::from("/c/a/1")];
        assert!(store.publish_track_filepaths(0, paths.clone()));
        assert_eq!(store.track_filepath_count(0), 2);
        assert_eq!(store.track_filepaths(0), paths);
        assert!(store.flags(0).contains(EntryFlags::TRACKS_CACHED));
        assert!(!store.publish_track_filepaths(0, paths));
    }

    #[test]
    fn test_publish_is_monotonic() {
        let store = EntryStore::new();
        store.resize(3);
        store.publish(1);
        store.publish(0);
        assert_eq!(store.available_entries(), 2);
    }

    #[test]
    fn test_unload_artwork_releases_texture_and_clears_bits() {
        let store = EntryStore::new();
        store.resize(1);
        store.write_entry(0, record("a", 0), false);
        store.publish(0);
        store.publish_artwork_filepath(0, PathBuf::from("/c/a/img"));
        store.insert_flags(0, EntryFlags::ARTWORK_REQUESTED);
        store.publish_artwork_pixels(
            0,
            DecodedImage {
                width: 1,
                height: 1,
                pixels: vec![0, 0, 0, 255],
            },
        );
        let mut device = RecordingDevice::default();
        let pixels = store.take_artwork_pixels(0).expect("pixels were published");
        let handle = device.upload_texture(&pixels);
        store.set_artwork_texture(0, handle);

        store.unload_artwork(0, &mut device);
        let flags = store.flags(0);
        assert!(flags.contains(EntryFlags::ARTWORK_CACHED));
        assert!(!flags.intersects(EntryFlags::ARTWORK_LOADED | EntryFlags::ARTWORK_REQUESTED));
        assert_eq!(store.artwork_texture(0), 0);
        assert_eq!(device.released, vec![handle]);
        assert!(device.live.is_empty());
    }

    #[test]
    fn test_concurrent_reader_never_sees_unpopulated_entry() {
        use std::sync::Arc;
        use std::thread;

        let store = Arc::new(EntryStore::new());
        let writer_store = Arc::clone(&store);
        let writer = thread::spawn(move || {
            for chunk in 0..20 {
                writer_store.resize(5);
                for offset in 0..5 {
                    let index = chunk * 5 + offset;
                    writer_store.write_entry(index, record(&index.to_string(), 2), false);
                    writer_store.publish(index);
                }
            }
        });

        let mut observed = 0;
        while observed < 100 {
            let available = store.available_entries();
            for index in 0..available {
                assert_eq!(store.id(index), index.to_string());
                assert_eq!(store.track_urls(index).len(), 2);
                assert!(store.flags(index).contains(EntryFlags::ALLOCATED));
            }
            observed = available;
        }
        writer.join().expect("writer thread should finish");
    }
}
