//! Catalog pipeline: registry refresh, media cache, per-view build/cache/decode
//! workers and the view lifecycle that a UI drives every frame.

pub mod app_context;
pub mod cache;
pub mod catalog;
pub mod config;
pub mod config_persistence;
pub mod entry_store;
pub mod error;
pub mod http_client;
pub mod image_pipeline;
pub mod pipeline;
pub mod prefetch;
pub mod protocol;
pub mod registry;
pub mod render;
pub mod user_data;
pub mod view;
pub mod view_manager;

#[cfg(test)]
mod test_support;
