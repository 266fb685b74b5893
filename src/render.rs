//! Render-device boundary. Textures are created and released on the main thread only.

use log::debug;

use crate::entry_store::{EntryFlags, EntryStore};
use crate::image_pipeline::DecodedImage;

/// Device texture id; 0 means "not realized".
pub type TextureHandle = u32;

pub trait RenderDevice {
    /// Uploads RGBA8 pixels and returns a non-zero handle.
    fn upload_texture(&mut self, image: &DecodedImage) -> TextureHandle;
    fn release_texture(&mut self, handle: TextureHandle);
}

/// Uploads decoded artwork for published entries that have no texture yet.
/// Pixels are consumed by the upload and dropped afterwards.
pub fn upload_loaded_artwork(store: &EntryStore, device: &mut dyn RenderDevice) -> usize {
    let mut uploaded = 0usize;
    for index in 0..store.available_entries() {
        if !store.flags(index).contains(EntryFlags::ARTWORK_LOADED) {
            continue;
        }
        if store.artwork_texture(index) != 0 {
            continue;
        }
        let Some(image) = store.take_artwork_pixels(index) else {
            continue;
        };
        let handle = device.upload_texture(&image);
        if handle == 0 {
            continue;
        }
        store.set_artwork_texture(index, handle);
        uploaded += 1;
    }
    if uploaded > 0 {
        debug!("Render: uploaded {} artwork textures", uploaded);
    }
    uploaded
}

/// Device without a GPU that only tracks handle lifetimes.
#[derive(Debug, Default)]
pub struct HeadlessDevice {
    next_handle: TextureHandle,
    live: usize,
    uploaded_bytes: u64,
}

impl HeadlessDevice {
    pub fn live_textures(&self) -> usize {
        self.live
    }

    pub fn uploaded_bytes(&self) -> u64 {
        self.uploaded_bytes
    }
}

impl RenderDevice for HeadlessDevice {
    fn upload_texture(&mut self, image: &DecodedImage) -> TextureHandle {
        self.next_handle = self.next_handle.wrapping_add(1).max(1);
        self.live += 1;
        self.uploaded_bytes += image.pixels.len() as u64;
        self.next_handle
    }

    fn release_texture(&mut self, _handle: TextureHandle) {
        self.live = self.live.saturating_sub(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::ReleaseRecord;
    use crate::test_support::RecordingDevice;

    fn pixels() -> DecodedImage {
        DecodedImage {
            width: 2,
            height: 1,
            pixels: vec![255; 8],
        }
    }

    #[test]
    fn test_upload_consumes_pixels_once() {
        let store = EntryStore::new();
        store.resize(2);
        for index in 0..2 {
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
        store.publish_artwork_pixels(1, pixels());

        let mut device = RecordingDevice::default();
        assert_eq!(upload_loaded_artwork(&store, &mut device), 1);
        assert_ne!(store.artwork_texture(1), 0);
        assert_eq!(store.artwork_texture(0), 0);
        assert!(!store.has_artwork_pixels(1));

        assert_eq!(upload_loaded_artwork(&store, &mut device), 0);
        assert_eq!(device.live.len(), 1);
    }

    #[test]
    fn test_headless_device_tracks_live_handles() {
        let mut device = HeadlessDevice::default();
        let first = device.upload_texture(&pixels());
        let second = device.upload_texture(&pixels());
        assert_ne!(first, 0);
        assert_ne!(first, second);
        device.release_texture(first);
        assert_eq!(device.live_textures(), 1);
        assert_eq!(device.uploaded_bytes(), 16);
    }
}
