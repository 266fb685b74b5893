//! Headless driver: runs the pipeline against the live registry and scrolls
//! through the latest releases with a texture-counting render device.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use log::{debug, info, warn};
use tokio::sync::broadcast::error::TryRecvError;

use dig::app_context::AppContext;
use dig::cache::MediaCache;
use dig::catalog::{TagFilter, ViewMode};
use dig::config::{config_file_path, load_or_create_config, Config};
use dig::config_persistence::persist_config_file;
use dig::http_client::{Fetcher, UreqFetcher};
use dig::image_pipeline::StandardImageDecoder;
use dig::protocol::{new_bus, PipelineMessage};
use dig::registry::{spawn_refresh_loop, RefreshLoop, RegistryStore};
use dig::render::HeadlessDevice;
use dig::user_data::{spawn_persist_loop, UserDataStore};
use dig::view_manager::{ViewManager, ViewStatus};

const FRAME_INTERVAL: Duration = Duration::from_millis(16);
const FRAMES_PER_STEP: u32 = 30;
const RUN_FOR: Duration = Duration::from_secs(60);

fn log_message(message: &PipelineMessage) {
    match message {
        PipelineMessage::RegistryRefreshed { releases } => {
            info!("Bus: registry refreshed ({} releases)", releases)
        }
        PipelineMessage::RegistryRefreshFailed { reason } => {
            warn!("Bus: registry refresh failed: {}", reason)
        }
        PipelineMessage::ViewPopulated { view_id, entries } => {
            info!("Bus: view {} populated with {} entries", view_id, entries)
        }
        other => debug!("Bus: {:?}", other),
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config_file = config_file_path();
    let config = match load_or_create_config(&config_file) {
        Ok(config) => config,
        Err(error) => {
            eprintln!(
                "Failed to load {}: {}. Using defaults.",
                config_file.display(),
                error
            );
            Config::default()
        }
    };

    let mut clog = colog::default_builder();
    clog.filter(None, config.log_level_filter());
    clog.init();

    std::panic::set_hook(Box::new(|panic_info| {
        let current_thread = std::thread::current();
        let thread_name = current_thread.name().unwrap_or("unnamed");
        log::error!("panic in thread '{}': {}", thread_name, panic_info);
    }));

    // Adds keys introduced since the file was written, keeping user comments.
    persist_config_file(&config, &config_file);

    let bus = new_bus();
    let mut bus_receiver = bus.subscribe();
    let shutdown = Arc::new(AtomicBool::new(false));

    let fetcher: Arc<dyn Fetcher> = Arc::new(UreqFetcher::new(
        &config.registry,
        config.cache.min_download_chunk_bytes,
    ));

    let registry = Arc::new(RegistryStore::new(config.registry_snapshot_path()));
    if let Err(error) = registry.load_persisted() {
        info!("Registry: no usable snapshot yet: {}", error);
    }
    let registry_thread = spawn_refresh_loop(
        Arc::clone(&registry),
        RefreshLoop {
            fetcher: Arc::clone(&fetcher),
            url: config.registry.url.clone(),
            poll_interval: Duration::from_secs(config.registry.poll_interval_secs),
            bus: bus.clone(),
            shutdown: Arc::clone(&shutdown),
        },
    );

    let user_data = Arc::new(UserDataStore::new(config.likes_path()));
    if let Err(error) = user_data.load() {
        warn!("UserData: ignoring unreadable likes file: {}", error);
    }
    let user_data_thread = spawn_persist_loop(
        Arc::clone(&user_data),
        Duration::from_millis(config.user_data.persist_interval_ms),
        Arc::clone(&shutdown),
    );

    let cache = Arc::new(MediaCache::new(config.cache_root(), fetcher));
    info!("Cache: root {}", cache.root().display());
    let context = Arc::new(AppContext::new(
        &config,
        registry,
        user_data,
        Arc::clone(&cache),
        Arc::new(StandardImageDecoder::new(config.pipeline.artwork_max_edge_px)),
        bus,
    ));

    let mut device = HeadlessDevice::default();
    let mut views = ViewManager::new(context);
    views.change_view(ViewMode::Latest, TagFilter::ALL);

    let started = Instant::now();
    let mut top = 0usize;
    let mut frame = 0u32;
    while started.elapsed() < RUN_FOR {
        let report = views.frame(top, &mut device);
        if report.swapped {
            top = 0;
        }

        loop {
            match bus_receiver.try_recv() {
                Ok(message) => log_message(&message),
                Err(TryRecvError::Lagged(skipped)) => {
                    debug!("Bus: skipped {} notifications", skipped)
                }
                Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => break,
            }
        }

        frame += 1;
        if views.status() == ViewStatus::Ready && frame % FRAMES_PER_STEP == 0 {
            let available = views
                .active()
                .map(|view| view.store().available_entries())
                .unwrap_or(0);
            top = (top + 1) % available.max(1);
            debug!(
                "Frame {}: top={} textures={} uploaded_bytes={}",
                frame,
                top,
                device.live_textures(),
                device.uploaded_bytes()
            );
        }
        thread::sleep(FRAME_INTERVAL);
    }

    views.shutdown(&mut device);
    shutdown.store(true, Ordering::Release);
    let _ = registry_thread.join();
    let _ = user_data_thread.join();
    info!(
        "Done: cached {} bytes across {} new release folders",
        cache.cached_bytes(),
        cache.cached_release_folders()
    );
    Ok(())
}
