//! Artwork decoding into display-ready RGBA8 pixel buffers.

use std::fs;
use std::path::Path;

use image::{imageops::FilterType, DynamicImage, GenericImageView};
use zune_core::{colorspace::ColorSpace, options::DecoderOptions};
use zune_jpeg::JpegDecoder;

/// Tightly packed RGBA8 pixels.
#[derive(Clone, PartialEq, Eq)]
pub struct DecodedImage {
    pub width: u32,
    pub height: u32,
    pub pixels: Vec<u8>,
}

impl std::fmt::Debug for DecodedImage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DecodedImage")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("bytes", &self.pixels.len())
            .finish()
    }
}

/// Turns a cached image file into pixels. `None` means the file is not decodable.
pub trait ImageDecoder: Send + Sync {
    fn decode_file(&self, path: &Path) -> Option<DecodedImage>;
}

/// Decoder backed by `image`, with a lenient JPEG fallback for malformed shop scans.
#[derive(Debug, Clone, Copy, Default)]
pub struct StandardImageDecoder {
    /// Longest edge of the output; 0 keeps the source size.
    pub max_edge_px: u32,
}

impl StandardImageDecoder {
    pub fn new(max_edge_px: u32) -> Self {
        Self { max_edge_px }
    }
}

impl ImageDecoder for StandardImageDecoder {
    fn decode_file(&self, path: &Path) -> Option<DecodedImage> {
        let decoded = decode_image_from_path_with_fallback(path)?;
        let decoded = if self.max_edge_px == 0 {
            decoded
        } else {
            let (width, height) = decoded.dimensions();
            let (target_width, target_height) = fit_to_max_edge(width, height, self.max_edge_px);
            if (target_width, target_height) == (width, height) {
                decoded
            } else {
                decoded.resize(target_width, target_height, FilterType::Lanczos3)
            }
        };
        Some(to_rgba_pixels(decoded))
    }
}

fn to_rgba_pixels(image: DynamicImage) -> DecodedImage {
    let rgba = image.into_rgba8();
    let (width, height) = rgba.dimensions();
    DecodedImage {
        width,
        height,
        pixels: rgba.into_raw(),
    }
}

fn looks_like_jpeg(bytes: &[u8]) -> bool {
    bytes.len() >= 2 && bytes[0] == 0xff && bytes[1] == 0xd8
}

fn decode_jpeg_non_strict(bytes: &[u8]) -> Option<DynamicImage> {
    if !looks_like_jpeg(bytes) {
        return None;
    }

    let options = DecoderOptions::new_cmd()
        .set_strict_mode(false)
        .jpeg_set_out_colorspace(ColorSpace::RGBA);
    let mut decoder = JpegDecoder::new_with_options(bytes, options);
    let pixels = decoder.decode().ok()?;
    let (width, height) = decoder.dimensions()?;
    let image = image::RgbaImage::from_raw(width as u32, height as u32, pixels)?;
    Some(DynamicImage::ImageRgba8(image))
}

fn decode_image_from_memory_with_fallback(bytes: &[u8]) -> Option<DynamicImage> {
    image::load_from_memory(bytes)
        .ok()
        .or_else(|| decode_jpeg_non_strict(bytes))
}

fn decode_image_from_path_with_fallback(path: &Path) -> Option<DynamicImage> {
    let bytes = fs::read(path).ok()?;
    if bytes.is_empty() {
        return None;
    }
    decode_image_from_memory_with_fallback(&bytes)
}

fn fit_to_max_edge(width: u32, height: u32, max_edge: u32) -> (u32, u32) {
    if width == 0 || height == 0 {
        return (1, 1);
    }
    let clamped = max_edge.max(1);
    if width.max(height) <= clamped {
        return (width, height);
    }
    if width >= height {
        let scaled_height =
            ((u64::from(height) * u64::from(clamped)) + (u64::from(width) / 2)) / u64::from(width);
        (clamped, scaled_height.max(1) as u32)
    } else {
        let scaled_width =
            ((u64::from(width) * u64::from(clamped)) + (u64::from(height) / 2)) / u64::from(height);
        (scaled_width.max(1) as u32, clamped)
    }
}
