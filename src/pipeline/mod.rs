//! Per-view worker threads (build, cache, decode).
//!
//! Each worker writes only its own columns and flag bits of the view's entry
//! store: the builder the fixed columns before publish, the cacher the cached
//! paths, the decoder the pixel slots.

pub mod builder;
pub mod cacher;
pub mod decoder;
